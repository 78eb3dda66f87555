//! # Feature Flags
//!
//! Every CPU feature we report is a single bit in one register of one
//! CPUID leaf. [FEATURES] lists them all. [FeatureFlagSet::evaluate]
//! walks the table and tests each bit against a [CpuidSource].

use std::collections::BTreeMap;

use serde::Serialize;

use crate::bits::BitRange;
use crate::cpu_information::CpuidRegister::{Eax, Ebx, Ecx, Edx};
use crate::cpu_information::{CpuidQuery, CpuidRegister, CpuidResult, CpuidSource};

use self::Section::{Avx512, Basic, Extended, ThermalPower};

pub type Bit = u8;

/// The report section a feature is listed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Basic,
    Avx512,
    Extended,
    ThermalPower,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::Basic,
        Section::Avx512,
        Section::Extended,
        Section::ThermalPower,
    ];

    pub const fn title(&self) -> &'static str {
        match self {
            Section::Basic => "CPU BASIC FEATURES",
            Section::Avx512 => "AVX-512 COMPATIBILITY",
            Section::Extended => "CPU EXTENDED FEATURES",
            Section::ThermalPower => "THERMAL AND POWER MANAGEMENT",
        }
    }
}

/// A single feature bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Feature {
    /// Short, unique name, e.g. `SSE4.1`.
    pub name: &'static str,
    pub description: &'static str,
    pub section: Section,
    pub query: CpuidQuery,
    pub register: CpuidRegister,
    pub bit: Bit,
}

impl Feature {
    const fn new(
        name: &'static str,
        description: &'static str,
        section: Section,
        query: CpuidQuery,
        register: CpuidRegister,
        bit: Bit,
    ) -> Self {
        assert!((bit as u32) < u32::BITS);

        Self {
            name,
            description,
            section,
            query,
            register,
            bit,
        }
    }

    pub const fn mask(&self) -> u32 {
        BitRange::bit(self.bit as u32).mask()
    }

    /// Test this feature's bit in a `cpuid` result for its query.
    pub fn is_set_in(&self, result: &CpuidResult) -> bool {
        result.get(self.register) & self.mask() != 0
    }
}

const LEAF_1: CpuidQuery = CpuidQuery::new(1, 0);
const LEAF_6: CpuidQuery = CpuidQuery::new(6, 0);
const LEAF_7: CpuidQuery = CpuidQuery::new(7, 0);
const LEAF_7_1: CpuidQuery = CpuidQuery::new(7, 1);
const LEAF_EXT_1: CpuidQuery = CpuidQuery::new(0x8000_0001, 0);
const LEAF_EXT_8: CpuidQuery = CpuidQuery::new(0x8000_0008, 0);

/// All features we know about, in report order.
pub const FEATURES: &[Feature] = &[
    Feature::new("FPU", "FPU", Basic, LEAF_1, Edx, 0),
    Feature::new("VME", "VME", Basic, LEAF_1, Edx, 1),
    Feature::new("DE", "DE", Basic, LEAF_1, Edx, 2),
    Feature::new("PSE", "PSE", Basic, LEAF_1, Edx, 3),
    Feature::new("TSC", "TSC", Basic, LEAF_1, Edx, 4),
    Feature::new("MSR", "MSR", Basic, LEAF_1, Edx, 5),
    Feature::new("PAE", "PAE", Basic, LEAF_1, Edx, 6),
    Feature::new("APIC", "APIC", Basic, LEAF_1, Edx, 9),
    Feature::new("MMX", "MMX", Basic, LEAF_1, Edx, 23),
    Feature::new("SSE", "SSE", Basic, LEAF_1, Edx, 25),
    Feature::new("SSE2", "SSE2", Basic, LEAF_1, Edx, 26),
    Feature::new("HTT", "HTT", Basic, LEAF_1, Edx, 28),
    Feature::new("SSE3", "SSE3", Basic, LEAF_1, Ecx, 0),
    Feature::new("SSSE3", "SSSE3", Basic, LEAF_1, Ecx, 9),
    Feature::new("FMA", "FMA", Basic, LEAF_1, Ecx, 12),
    Feature::new("SSE4.1", "SSE4.1", Basic, LEAF_1, Ecx, 19),
    Feature::new("SSE4.2", "SSE4.2", Basic, LEAF_1, Ecx, 20),
    Feature::new("AES", "AES", Basic, LEAF_1, Ecx, 25),
    Feature::new("AVX", "AVX", Basic, LEAF_1, Ecx, 28),
    Feature::new("AVX2", "AVX2", Basic, LEAF_7, Ebx, 5),
    Feature::new("SHA", "SHA", Basic, LEAF_7, Ebx, 29),
    //
    Feature::new("AVX512F", "AVX-512 Foundation", Avx512, LEAF_7, Ebx, 16),
    Feature::new(
        "AVX512DQ",
        "AVX-512 DWORD and QWORD Instructions",
        Avx512,
        LEAF_7,
        Ebx,
        17,
    ),
    Feature::new(
        "AVX512IFMA",
        "AVX-512 Integer Fused Multiply-Add Instructions",
        Avx512,
        LEAF_7,
        Ebx,
        21,
    ),
    Feature::new(
        "AVX512PF",
        "AVX-512 Prefetch Instructions",
        Avx512,
        LEAF_7,
        Ebx,
        26,
    ),
    Feature::new(
        "AVX512ER",
        "AVX-512 Exponential and Reciprocal Instructions",
        Avx512,
        LEAF_7,
        Ebx,
        27,
    ),
    Feature::new(
        "AVX512CD",
        "AVX-512 Conflict Detection Instructions",
        Avx512,
        LEAF_7,
        Ebx,
        28,
    ),
    Feature::new(
        "AVX512BW",
        "AVX-512 Byte and Word Instructions",
        Avx512,
        LEAF_7,
        Ebx,
        30,
    ),
    Feature::new(
        "AVX512VL",
        "AVX-512 Vector Length Extensions",
        Avx512,
        LEAF_7,
        Ebx,
        31,
    ),
    Feature::new(
        "AVX512VBMI",
        "AVX-512 Vector Bit Manipulation Instructions",
        Avx512,
        LEAF_7,
        Ecx,
        1,
    ),
    Feature::new(
        "AVX512VBMI2",
        "AVX-512 Vector Bit Manipulation Instructions 2",
        Avx512,
        LEAF_7,
        Ecx,
        6,
    ),
    Feature::new(
        "AVX512VNNI",
        "AVX-512 Vector Neural Network Instructions",
        Avx512,
        LEAF_7,
        Ecx,
        11,
    ),
    Feature::new(
        "AVX512BITALG",
        "AVX-512 BITALG Instructions",
        Avx512,
        LEAF_7,
        Ecx,
        12,
    ),
    Feature::new(
        "AVX512VPOPCNTDQ",
        "AVX-512 Vector Population Count DWORD and QWORD",
        Avx512,
        LEAF_7,
        Ecx,
        14,
    ),
    Feature::new(
        "AVX5124VNNIW",
        "AVX-512 4-Register Neural Network Instructions",
        Avx512,
        LEAF_7,
        Edx,
        2,
    ),
    Feature::new(
        "AVX5124FMAPS",
        "AVX-512 4-Register Multiple Accumulation Single Precision",
        Avx512,
        LEAF_7,
        Edx,
        3,
    ),
    Feature::new(
        "AVX512VP2INTERSECT",
        "AVX-512 Vector Intersection Instructions On 32/64-bit Integers",
        Avx512,
        LEAF_7,
        Edx,
        8,
    ),
    Feature::new(
        "AVX512FP16",
        "AVX-512 Half-Precision Floating-Point Arithmetic Instructions",
        Avx512,
        LEAF_7,
        Edx,
        23,
    ),
    Feature::new(
        "AVX512BF16",
        "AVX-512 Instructions For bfloat16 Numbers",
        Avx512,
        LEAF_7_1,
        Eax,
        5,
    ),
    //
    Feature::new("MCE", "Machine Check Exception", Extended, LEAF_1, Edx, 7),
    Feature::new("CX8", "CMPXCHG8B", Extended, LEAF_1, Edx, 8),
    Feature::new("SEP", "SYSENTER and SYSEXIT", Extended, LEAF_1, Edx, 11),
    Feature::new(
        "BMI1",
        "Bit Manipulation Instruction Set 1",
        Extended,
        LEAF_7,
        Ebx,
        3,
    ),
    Feature::new(
        "BMI2",
        "Bit Manipulation Instruction Set 2",
        Extended,
        LEAF_7,
        Ebx,
        8,
    ),
    Feature::new("RDSEED", "RDSEED", Extended, LEAF_7, Ebx, 18),
    Feature::new("ADX", "Multi-Precision Add-Carry", Extended, LEAF_7, Ebx, 19),
    Feature::new(
        "SMAP",
        "Supervisor Mode Access Prevention",
        Extended,
        LEAF_7,
        Ebx,
        20,
    ),
    Feature::new("SYSCALL", "SYSCALL and SYSRET", Extended, LEAF_EXT_1, Edx, 11),
    Feature::new("NX", "No-Execute Bit", Extended, LEAF_EXT_1, Edx, 20),
    Feature::new("3DNow", "3DNow!", Extended, LEAF_EXT_1, Edx, 31),
    Feature::new("LZCNT", "LZCNT", Extended, LEAF_EXT_1, Ecx, 5),
    Feature::new("SSE4A", "SSE4a", Extended, LEAF_EXT_1, Ecx, 6),
    Feature::new("PREFETCHW", "PREFETCHW", Extended, LEAF_EXT_1, Ecx, 8),
    Feature::new("FMA4", "FMA4", Extended, LEAF_EXT_1, Ecx, 16),
    Feature::new("CLZERO", "CLZERO", Extended, LEAF_EXT_8, Ebx, 0),
    Feature::new("WBNOINVD", "WBNOINVD", Extended, LEAF_EXT_8, Ebx, 9),
    //
    Feature::new(
        "DTS",
        "Digital Temperature Sensor",
        ThermalPower,
        LEAF_6,
        Eax,
        0,
    ),
    Feature::new("Turbo Boost", "Turbo Boost", ThermalPower, LEAF_6, Eax, 1),
    Feature::new(
        "ARAT",
        "Always Running APIC Timer",
        ThermalPower,
        LEAF_6,
        Eax,
        2,
    ),
];

/// Look up a feature by its short name.
pub fn feature(name: &str) -> Option<&'static Feature> {
    FEATURES.iter().find(|f| f.name == name)
}

/// The presence of every feature in [FEATURES].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FeatureFlagSet {
    flags: BTreeMap<&'static str, bool>,
}

impl FeatureFlagSet {
    /// Evaluate the feature table against `source`.
    ///
    /// Each distinct query is issued only once.
    pub fn evaluate(source: &dyn CpuidSource) -> Self {
        let mut results: BTreeMap<CpuidQuery, CpuidResult> = BTreeMap::new();

        let flags = FEATURES
            .iter()
            .map(|f| {
                let result = results
                    .entry(f.query)
                    .or_insert_with(|| source.cpuid(f.query));

                (f.name, f.is_set_in(result))
            })
            .collect();

        Self { flags }
    }

    /// Returns `None` for names that are not in the feature table.
    pub fn get(&self, name: &str) -> Option<bool> {
        self.flags.get(name).copied()
    }

    pub fn is_supported(&self, name: &str) -> bool {
        self.get(name).unwrap_or(false)
    }

    /// Features of one report section, in table order.
    pub fn section(
        &self,
        section: Section,
    ) -> impl Iterator<Item = (&'static Feature, bool)> + '_ {
        FEATURES
            .iter()
            .filter(move |f| f.section == section)
            .map(move |f| (f, self.is_supported(f.name)))
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, bool)> + '_ {
        self.flags.iter().map(|(name, present)| (*name, *present))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_information::tests_support::MapSource;

    use std::collections::BTreeSet;

    #[test]
    fn feature_names_are_unique() {
        let names: BTreeSet<&str> = FEATURES.iter().map(|f| f.name).collect();
        assert_eq!(names.len(), FEATURES.len());
    }

    #[test]
    fn every_section_has_features() {
        for section in Section::ALL {
            assert!(FEATURES.iter().any(|f| f.section == section));
        }
    }

    #[test]
    fn known_bit_positions() {
        let check = |name: &str, leaf: u32, subleaf: u32, reg: CpuidRegister, bit: Bit| {
            let f = feature(name).expect("feature in table");
            assert_eq!(f.query, CpuidQuery::new(leaf, subleaf), "{}", name);
            assert_eq!(f.register, reg, "{}", name);
            assert_eq!(f.bit, bit, "{}", name);
        };

        check("FPU", 1, 0, CpuidRegister::Edx, 0);
        check("MMX", 1, 0, CpuidRegister::Edx, 23);
        check("AVX", 1, 0, CpuidRegister::Ecx, 28);
        check("AVX2", 7, 0, CpuidRegister::Ebx, 5);
        check("BMI1", 7, 0, CpuidRegister::Ebx, 3);
        check("BMI2", 7, 0, CpuidRegister::Ebx, 8);
        check("SHA", 7, 0, CpuidRegister::Ebx, 29);
        check("AVX512F", 7, 0, CpuidRegister::Ebx, 16);
        check("AVX512FP16", 7, 0, CpuidRegister::Edx, 23);
        check("AVX512BF16", 7, 1, CpuidRegister::Eax, 5);
        check("3DNow", 0x8000_0001, 0, CpuidRegister::Edx, 31);
        check("WBNOINVD", 0x8000_0008, 0, CpuidRegister::Ebx, 9);
        check("DTS", 6, 0, CpuidRegister::Eax, 0);
        check("ARAT", 6, 0, CpuidRegister::Eax, 2);
    }

    #[test]
    fn fpu_only() {
        let source = MapSource::new().with(
            1,
            0,
            CpuidResult {
                edx: 0x0000_0001,
                ..Default::default()
            },
        );
        let flags = FeatureFlagSet::evaluate(&source);

        assert_eq!(flags.get("FPU"), Some(true));
        for (feature, present) in flags.section(Section::Basic) {
            if feature.query == LEAF_1
                && feature.register == CpuidRegister::Edx
                && feature.name != "FPU"
            {
                assert!(!present, "{} should not be set", feature.name);
            }
        }
    }

    #[test]
    fn mmx_only() {
        let source = MapSource::new().with(
            1,
            0,
            CpuidResult {
                edx: 0x0080_0000,
                ..Default::default()
            },
        );
        let flags = FeatureFlagSet::evaluate(&source);

        assert_eq!(flags.get("MMX"), Some(true));
        assert_eq!(flags.get("FPU"), Some(false));
    }

    #[test]
    fn each_row_sets_exactly_one_feature() {
        for f in FEATURES {
            let mut result = CpuidResult::default();
            match f.register {
                CpuidRegister::Eax => result.eax = f.mask(),
                CpuidRegister::Ebx => result.ebx = f.mask(),
                CpuidRegister::Ecx => result.ecx = f.mask(),
                CpuidRegister::Edx => result.edx = f.mask(),
            }

            let source = MapSource::new().with(f.query.leaf, f.query.subleaf, result);
            let flags = FeatureFlagSet::evaluate(&source);

            let set: Vec<&str> = flags.iter().filter(|(_, p)| *p).map(|(n, _)| n).collect();
            assert_eq!(set, vec![f.name]);
        }
    }

    #[test]
    fn zero_source_reports_nothing() {
        let flags = FeatureFlagSet::evaluate(&MapSource::new());

        assert_eq!(flags.len(), FEATURES.len());
        assert!(flags.iter().all(|(_, present)| !present));
        assert_eq!(flags.get("no such feature"), None);
    }

    #[test]
    fn queries_are_issued_once() {
        let source = MapSource::new();
        FeatureFlagSet::evaluate(&source);

        let distinct: BTreeSet<CpuidQuery> = FEATURES.iter().map(|f| f.query).collect();
        assert_eq!(source.query_count(), distinct.len());
    }
}
