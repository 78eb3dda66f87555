//! # Raw Queries
//!
//! A thin wrapper around a single `cpuid` invocation: check that the
//! leaf is supported, issue the query and render the four registers.

use std::num::ParseIntError;

use thiserror::Error;
use tracing::{debug, info};

use crate::cpu_information::{CpuidQuery, CpuidRegister, CpuidResult, CpuidSource};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("basic function code {leaf:#x} exceeds the maximum of {max:#x}")]
    BasicLeafOutOfRange { leaf: u32, max: u32 },

    #[error("extended function code {leaf:#x} exceeds the maximum of {max:#x}")]
    ExtendedLeafOutOfRange { leaf: u32, max: u32 },
}

/// Parse a function code given in decimal or, with a `0x` prefix, in
/// hexadecimal.
pub fn parse_code(input: &str) -> Result<u32, ParseIntError> {
    match input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => input.parse(),
    }
}

/// Check `leaf` against the maximum basic or extended leaf the CPU
/// reports. The maximum itself is a valid leaf.
pub fn check_leaf(source: &dyn CpuidSource, leaf: u32) -> Result<(), QueryError> {
    if CpuidQuery::from(leaf).is_extended() {
        let max = source.max_extended_leaf();
        debug!("maximum extended function code is {:#x}", max);

        if leaf > max {
            return Err(QueryError::ExtendedLeafOutOfRange { leaf, max });
        }
    } else {
        let max = source.max_standard_leaf();
        debug!("maximum basic function code is {:#x}", max);

        if leaf > max {
            return Err(QueryError::BasicLeafOutOfRange { leaf, max });
        }
    }

    Ok(())
}

/// Issue a single query.
///
/// Unless `ignore_range` is set, leaves beyond the CPU's maximum are
/// rejected before the query is issued.
pub fn run(
    source: &dyn CpuidSource,
    query: CpuidQuery,
    ignore_range: bool,
) -> Result<CpuidResult, QueryError> {
    if ignore_range {
        info!("not checking function code {:#x} against the maximum", query.leaf);
    } else {
        check_leaf(source, query.leaf)?;
    }

    info!(
        "calling CPUID with EAX = {:#x} and ECX = {:#x}",
        query.leaf, query.subleaf
    );

    Ok(source.cpuid(query))
}

/// The number base registers are printed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Radix {
    #[default]
    Hex,
    Decimal,
    Octal,
    Binary,
}

impl Radix {
    /// Format `value` zero-padded to the full width of a 32-bit value
    /// in this base.
    pub fn format(&self, value: u32) -> String {
        match self {
            Radix::Hex => format!("{:08x}", value),
            Radix::Decimal => format!("{:010}", value),
            Radix::Octal => format!("{:011o}", value),
            Radix::Binary => format!("{:032b}", value),
        }
    }
}

/// Render the bytes of a register as ASCII, least-significant byte
/// first. Rendering stops at the first NUL. Non-printable bytes are
/// shown as `.`.
pub fn ascii(value: u32) -> String {
    value
        .to_le_bytes()
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}

/// How [render] presents registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputOptions {
    pub radix: Radix,
    /// Append the ASCII rendering of each register.
    pub ascii: bool,
    /// Values only, one per line.
    pub clean: bool,
    pub verbose: bool,
}

/// Render the registers of `result` as text.
pub fn render(result: &CpuidResult, options: &OutputOptions) -> String {
    let mut out = String::new();

    if options.verbose {
        out.push_str("CPUID call successful.\nRegisters:\n");
    }

    for reg in CpuidRegister::ALL {
        let value = result.get(reg);

        if options.verbose {
            out.push('\t');
        }
        if !options.clean {
            out.push_str(reg.name());
            out.push_str(": ");
        }

        out.push_str(&options.radix.format(value));

        if options.ascii {
            out.push_str(&format!(" : \"{}\"", ascii(value)));
        }

        out.push('\n');
    }

    out
}
