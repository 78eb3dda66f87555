//! # Replay AIDA CPUID Dumps
//!
//! Extract CPUID values out of AIDA64 CPUID dumps, so a CPU can be
//! decoded without having it at hand. Only the values of one logical
//! CPU are used (CPU 0 by default). MSR values and other lines in the
//! dump are ignored.
//!
//! See [AidaCpuidDump].

pub use std::collections::BTreeMap as Map;
use std::{collections::BTreeSet as Set, str::FromStr};

use regex::Regex;
use thiserror::Error;
use tracing::{debug, trace};

use crate::cpu_information::{CpuidQuery, CpuidResult, CpuidSource};

/// The CPUID values of a single logical CPU from an AIDA dump.
#[derive(Debug, Clone)]
pub struct AidaCpuidDump {
    pub cpuid: Map<CpuidQuery, CpuidResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseAidaCpuidDumpError {
    #[error("AIDA CPUID dump contains group `{0}` more than once")]
    DuplicateGroup(String),

    #[error("AIDA CPUID dump has no `{0}` group")]
    MissingGroup(String),

    #[error("AIDA CPUID dump has no CPUID values for `{0}`")]
    NoCpuidValues(String),
}

/// Low-level representation of a single input line after first
/// parsing round.
#[derive(Debug, Clone, PartialEq)]
enum InputLine {
    /// A header in the input.
    ///
    /// For example, `------[ Logical CPU #0 ]------` would be parsed
    /// as group header with name `Logical CPU #0`.
    GroupHeader { name: String },

    /// A CPUID line in the input.
    Cpuid {
        query: CpuidQuery,
        result: CpuidResult,
    },
}

/// Parse a group header line or return [None].
fn try_match_group_header(input: &str) -> Option<InputLine> {
    lazy_static! {
        static ref GROUP_HEADER_RE: Regex =
            Regex::new(r"^------\[ (.+) ]------$").expect("a valid regex");
    }

    let matches = GROUP_HEADER_RE.captures(input.trim_end())?;

    Some(InputLine::GroupHeader {
        name: matches
            .get(1)
            .expect("capture group populated after match")
            .as_str()
            .to_owned(),
    })
}

/// Parse a hex string of at most 8 digits to an `u32`.
///
/// **Note:** This function assumes the input was validated by a
/// regex and will panic if the string cannot be parsed.
fn hex_as_u32(input: &str) -> u32 {
    u32::from_str_radix(input, 16).expect("can't parse input after regex matched")
}

/// Parse a CPUID line or return [None].
fn try_match_cpuid(input: &str) -> Option<InputLine> {
    lazy_static! {
        static ref CPUID_RE: Regex =
            Regex::new(r"^CPUID ([0-9a-fA-F]{1,8}): ([0-9a-fA-F]{8})-([0-9a-fA-F]{8})-([0-9a-fA-F]{8})-([0-9a-fA-F]{8})(?: \[SL ([0-9a-fA-F]{2})\]|.*)$").expect("a valid regex");
    }

    let matches = CPUID_RE.captures(input.trim_end())?;

    Some(InputLine::Cpuid {
        query: CpuidQuery {
            leaf: hex_as_u32(matches.get(1).expect("CPUID leaf match").as_str()),
            subleaf: matches.get(6).map(|m| hex_as_u32(m.as_str())).unwrap_or(0),
        },

        result: CpuidResult {
            eax: hex_as_u32(matches.get(2).expect("CPUID eax match").as_str()),
            ebx: hex_as_u32(matches.get(3).expect("CPUID ebx match").as_str()),
            ecx: hex_as_u32(matches.get(4).expect("CPUID ecx match").as_str()),
            edx: hex_as_u32(matches.get(5).expect("CPUID edx match").as_str()),
        },
    })
}

impl InputLine {
    fn parse(s: &str) -> Option<Self> {
        try_match_group_header(s).or_else(|| try_match_cpuid(s))
    }
}

/// The group name AIDA uses for the values of one logical CPU.
fn logical_cpu_group(cpu: u32) -> String {
    format!("Logical CPU #{}", cpu)
}

impl AidaCpuidDump {
    /// Parse a dump and keep the CPUID values of logical CPU `cpu`.
    ///
    /// Dumps without any group headers are accepted as well. All of
    /// their CPUID lines are taken to belong to the requested CPU.
    pub fn parse(s: &str, cpu: u32) -> Result<Self, ParseAidaCpuidDumpError> {
        // We first parse each line of the input. Non-matching lines
        // are discarded.
        let parsed_lines = s.lines().filter_map(InputLine::parse);

        // Now we fold each input into the groups they belong to. For
        // this we use a list of groups plus their content as
        // accumulator. Everything before the first group header
        // belongs to the unnamed group.
        let groups_vec: Vec<(String, Vec<InputLine>)> =
            parsed_lines.fold(vec![("".to_string(), vec![])], |mut acc, line| {
                if let InputLine::GroupHeader { name } = line {
                    // Start a new group.
                    acc.push((name, vec![]));
                } else {
                    // Extend the last group.
                    acc.last_mut().expect("at least one item").1.push(line);
                }

                acc
            });

        {
            let mut seen = Set::new();
            if let Some((name, _)) = groups_vec.iter().find(|(name, _)| !seen.insert(name)) {
                return Err(ParseAidaCpuidDumpError::DuplicateGroup(name.clone()));
            }
        }

        let wanted = logical_cpu_group(cpu);
        let headerless = groups_vec.len() == 1;

        // Turn the parsed groups into an easy-to-query map.
        let groups: Map<String, Vec<InputLine>> = groups_vec.into_iter().collect();

        let group = if headerless { "" } else { wanted.as_str() };
        let lines = groups
            .get(group)
            .ok_or_else(|| ParseAidaCpuidDumpError::MissingGroup(wanted.clone()))?;

        let cpuid: Map<CpuidQuery, CpuidResult> = lines
            .iter()
            .filter_map(|line| {
                if let InputLine::Cpuid { query, result } = line {
                    Some((*query, *result))
                } else {
                    None
                }
            })
            .collect();

        if cpuid.is_empty() {
            return Err(ParseAidaCpuidDumpError::NoCpuidValues(wanted));
        }

        debug!(group = %wanted, queries = cpuid.len(), "parsed AIDA CPUID dump");

        Ok(AidaCpuidDump { cpuid })
    }
}

impl FromStr for AidaCpuidDump {
    type Err = ParseAidaCpuidDumpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, 0)
    }
}

impl CpuidSource for AidaCpuidDump {
    /// Queries missing from the dump read as zeros.
    fn cpuid(&self, query: CpuidQuery) -> CpuidResult {
        self.cpuid.get(&query).copied().unwrap_or_else(|| {
            trace!(leaf = query.leaf, subleaf = query.subleaf, "query not in dump");
            CpuidResult::default()
        })
    }
}
