//! # Bit Fields
//!
//! CPUID packs most of its information into small bit fields of the
//! four result registers. [BitRange] names such a field and extracts
//! it.

/// An inclusive range of bit positions `low..=high` in a 32-bit word.
///
/// Construct ranges in `const` context where possible. An invalid
/// range then fails to compile instead of panicking at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitRange {
    high: u32,
    low: u32,
}

impl BitRange {
    /// Create a new bit range.
    ///
    /// Panics if `low > high` or `high > 31`.
    pub const fn new(high: u32, low: u32) -> Self {
        assert!(low <= high, "bit range must not be reversed");
        assert!(high < u32::BITS, "bit range must fit into 32 bits");

        Self { high, low }
    }

    /// A range covering a single bit.
    pub const fn bit(position: u32) -> Self {
        Self::new(position, position)
    }

    /// The number of bits covered by this range.
    pub const fn width(&self) -> u32 {
        self.high - self.low + 1
    }

    /// The mask of this range before shifting, i.e. at its original
    /// position in the word.
    pub const fn mask(&self) -> u32 {
        (u32::MAX >> (u32::BITS - self.width())) << self.low
    }

    /// Extract the bits of this range from `value` and right-align
    /// them.
    pub const fn extract(&self, value: u32) -> u32 {
        (value & self.mask()) >> self.low
    }
}

/// Return bits `low..=high` of `value`, shifted down to bit 0.
///
/// Passing `low > high` or `high > 31` is a programming error and
/// panics.
pub fn extract_bits(value: u32, high: u32, low: u32) -> u32 {
    BitRange::new(high, low).extract(value)
}
