use std::fmt;

use serde::{Serialize, Serializer};

/// The input to a `cpuid` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CpuidQuery {
    pub leaf: u32,
    pub subleaf: u32,
}

/// Simple queries do not require a subleaf.
impl From<u32> for CpuidQuery {
    fn from(leaf: u32) -> Self {
        Self { leaf, subleaf: 0 }
    }
}

impl CpuidQuery {
    pub const fn new(leaf: u32, subleaf: u32) -> Self {
        Self { leaf, subleaf }
    }

    /// Extended leaves live in the `0x8000_xxxx` range.
    pub const fn is_extended(&self) -> bool {
        self.leaf & EXTENDED_LEAF_BASE != 0
    }
}

/// The first extended leaf. Querying it returns the maximum
/// supported extended leaf in `eax`.
pub const EXTENDED_LEAF_BASE: u32 = 0x8000_0000;

/// The result of a `cpuid` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuidResult {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
}

/// The registers of a [CpuidResult].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuidRegister {
    Eax,
    Ebx,
    Ecx,
    Edx,
}

impl CpuidRegister {
    /// All registers in the order `cpuid` reports them.
    pub const ALL: [CpuidRegister; 4] = [
        CpuidRegister::Eax,
        CpuidRegister::Ebx,
        CpuidRegister::Ecx,
        CpuidRegister::Edx,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            CpuidRegister::Eax => "EAX",
            CpuidRegister::Ebx => "EBX",
            CpuidRegister::Ecx => "ECX",
            CpuidRegister::Edx => "EDX",
        }
    }
}

impl CpuidResult {
    /// Retrieve a register value from a CPUID result.
    pub fn get(&self, reg: CpuidRegister) -> u32 {
        match reg {
            CpuidRegister::Eax => self.eax,
            CpuidRegister::Ebx => self.ebx,
            CpuidRegister::Ecx => self.ecx,
            CpuidRegister::Edx => self.edx,
        }
    }
}

/// Anything that can answer `cpuid` queries.
///
/// The instruction never fails: reserved or unsupported leaves still
/// produce some register values (usually zeros). Implementations
/// follow the same rule and always return a result.
pub trait CpuidSource {
    /// Return the result of a `cpuid` invocation.
    fn cpuid(&self, query: CpuidQuery) -> CpuidResult;

    /// The maximum supported standard (`0x0000_xxxx`) CPUID leaf.
    fn max_standard_leaf(&self) -> u32 {
        self.cpuid(0.into()).eax
    }

    /// The maximum supported extended (`0x8000_xxxx`) CPUID leaf.
    fn max_extended_leaf(&self) -> u32 {
        self.cpuid(EXTENDED_LEAF_BASE.into()).eax
    }
}

/// An ASCII string that the CPU hands out spread across registers.
///
/// Each register contributes four bytes in little-endian order. The
/// string ends at the first NUL byte or after `N` bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RegisterString<const N: usize> {
    bytes: [u8; N],
}

/// The 12-byte vendor identification string.
pub type VendorString = RegisterString<12>;

/// The 48-byte processor brand string.
pub type BrandString = RegisterString<48>;

impl<const N: usize> Default for RegisterString<N> {
    fn default() -> Self {
        Self { bytes: [0; N] }
    }
}

impl<const N: usize> RegisterString<N> {
    /// Store the four bytes of `reg` starting at `offset`.
    ///
    /// Panics if the register does not fit at `offset`.
    pub fn write(&mut self, offset: usize, reg: u32) {
        self.bytes[offset..offset + 4].copy_from_slice(&reg.to_le_bytes());
    }

    /// Assemble a string from registers written at successive 4-byte
    /// offsets.
    pub fn from_registers(regs: &[u32]) -> Self {
        assert_eq!(regs.len() * 4, N, "registers must fill the string exactly");

        let mut string = Self::default();
        for (i, reg) in regs.iter().enumerate() {
            string.write(i * 4, *reg);
        }

        string
    }

    /// All `N` raw bytes, including any NUL padding.
    pub fn as_bytes(&self) -> &[u8; N] {
        &self.bytes
    }

    /// The raw bytes up to the first NUL.
    pub fn trimmed_bytes(&self) -> &[u8] {
        let end = self.bytes.iter().position(|&b| b == 0).unwrap_or(N);
        &self.bytes[..end]
    }

    pub const fn len(&self) -> usize {
        N
    }

    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    /// Returns the string.
    ///
    /// This uses lossy conversion to UTF-8 in case the string is not
    /// valid UTF-8.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.trimmed_bytes()).into_owned()
    }
}

impl VendorString {
    /// Assemble the vendor string from the result of leaf 0.
    ///
    /// The register order `ebx`, `edx`, `ecx` is how the architecture
    /// defines it.
    pub fn from_leaf0(result: &CpuidResult) -> Self {
        Self::from_registers(&[result.ebx, result.edx, result.ecx])
    }
}

impl BrandString {
    /// Assemble the brand string from the results of leaves
    /// `0x8000_0002` to `0x8000_0004`.
    pub fn from_leaves(leaves: &[CpuidResult; 3]) -> Self {
        let mut string = Self::default();
        for (i, r) in leaves.iter().enumerate() {
            let offset = i * 16;
            string.write(offset, r.eax);
            string.write(offset + 4, r.ebx);
            string.write(offset + 8, r.ecx);
            string.write(offset + 12, r.edx);
        }

        string
    }
}

impl<const N: usize> fmt::Display for RegisterString<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl<const N: usize> fmt::Debug for RegisterString<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

impl<const N: usize> Serialize for RegisterString<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string_lossy())
    }
}
