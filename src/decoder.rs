//! # CPU Identification
//!
//! Turns raw `cpuid` results into a [CpuReport]: who made the CPU,
//! what it is called, its family/model/stepping and which features it
//! supports.
//!
//! Decoding is a pure function of the register values the
//! [CpuidSource] returns. Nothing here checks whether a leaf is
//! actually supported. A CPU reports zeros (or stale data) for leaves
//! beyond its maximum, and those are decoded as-is.

use serde::Serialize;
use tracing::debug;

use crate::bits::BitRange;
use crate::cpu_information::{BrandString, CpuidResult, CpuidSource, VendorString};
use crate::features::FeatureFlagSet;

const STEPPING: BitRange = BitRange::new(3, 0);
const BASE_MODEL: BitRange = BitRange::new(7, 4);
const BASE_FAMILY: BitRange = BitRange::new(11, 8);
const PROCESSOR_TYPE: BitRange = BitRange::new(13, 12);
const EXTENDED_MODEL: BitRange = BitRange::new(19, 16);
const EXTENDED_FAMILY: BitRange = BitRange::new(27, 20);

const BRAND_LEAVES: [u32; 3] = [0x8000_0002, 0x8000_0003, 0x8000_0004];

/// The CPU manufacturer, as far as we care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Vendor {
    Intel,
    Amd,
    Other,
}

impl Vendor {
    /// Classify a vendor string.
    ///
    /// The comparison is exact and case-sensitive.
    pub fn from_vendor_string(vendor: &VendorString) -> Self {
        match vendor.as_bytes() {
            b"GenuineIntel" => Vendor::Intel,
            b"AuthenticAMD" => Vendor::Amd,
            _ => Vendor::Other,
        }
    }
}

/// The processor type field of leaf 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessorType {
    Oem,
    Overdrive,
    DualProcessor,
    Unknown,
}

impl From<u32> for ProcessorType {
    /// Only the two lowest bits are meaningful.
    fn from(value: u32) -> Self {
        match value & 0b11 {
            0 => ProcessorType::Oem,
            1 => ProcessorType::Overdrive,
            2 => ProcessorType::DualProcessor,
            _ => ProcessorType::Unknown,
        }
    }
}

impl ProcessorType {
    pub const fn description(&self) -> &'static str {
        match self {
            ProcessorType::Oem => "OEM",
            ProcessorType::Overdrive => "Intel Overdrive",
            ProcessorType::DualProcessor => "Dual Processor",
            ProcessorType::Unknown => "Unknown",
        }
    }
}

/// The version fields of leaf 1 `eax`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Signature {
    pub stepping: u32,
    pub base_model: u32,
    pub base_family: u32,
    /// The raw 2-bit processor type field.
    pub processor_type_id: u32,
    pub processor_type: ProcessorType,
    pub extended_model: u32,
    pub extended_family: u32,
}

impl From<u32> for Signature {
    fn from(eax: u32) -> Self {
        let processor_type_id = PROCESSOR_TYPE.extract(eax);

        Self {
            stepping: STEPPING.extract(eax),
            base_model: BASE_MODEL.extract(eax),
            base_family: BASE_FAMILY.extract(eax),
            processor_type_id,
            processor_type: processor_type_id.into(),
            extended_model: EXTENDED_MODEL.extract(eax),
            extended_family: EXTENDED_FAMILY.extract(eax),
        }
    }
}

impl Signature {
    /// The model number software should use.
    ///
    /// The extended model only counts for family 6 and 15.
    pub fn effective_model(&self) -> u32 {
        match self.base_family {
            6 | 15 => (self.extended_model << 4) + self.base_model,
            _ => self.base_model,
        }
    }

    /// The family number software should use.
    ///
    /// The extended family only counts for family 15.
    pub fn effective_family(&self) -> u32 {
        match self.base_family {
            15 => self.base_family + self.extended_family,
            _ => self.base_family,
        }
    }
}

/// Everything that identifies a CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CpuIdentity {
    pub max_basic_leaf: u32,
    pub max_extended_leaf: u32,
    pub vendor_string: VendorString,
    pub vendor: Vendor,
    pub brand_string: BrandString,
    #[serde(flatten)]
    pub signature: Signature,
    pub effective_model: u32,
    pub effective_family: u32,
}

impl CpuIdentity {
    pub fn decode(source: &dyn CpuidSource) -> Self {
        let leaf0 = source.cpuid(0.into());
        let vendor_string = VendorString::from_leaf0(&leaf0);
        debug!(max_basic_leaf = leaf0.eax, vendor = %vendor_string, "decoded leaf 0");

        let signature = Signature::from(source.cpuid(1.into()).eax);
        debug!(?signature, "decoded leaf 1");

        let brand: [CpuidResult; 3] = BRAND_LEAVES.map(|leaf| source.cpuid(leaf.into()));
        let brand_string = BrandString::from_leaves(&brand);

        Self {
            max_basic_leaf: leaf0.eax,
            max_extended_leaf: source.max_extended_leaf(),
            vendor_string,
            vendor: Vendor::from_vendor_string(&vendor_string),
            brand_string,
            signature,
            effective_model: signature.effective_model(),
            effective_family: signature.effective_family(),
        }
    }
}

/// The complete decoded state of a CPU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CpuReport {
    pub identity: CpuIdentity,
    pub features: FeatureFlagSet,
}

/// Decode the identity and all feature flags from `source`.
pub fn decode(source: &dyn CpuidSource) -> CpuReport {
    let identity = CpuIdentity::decode(source);
    let features = FeatureFlagSet::evaluate(source);

    debug!(
        supported = features.iter().filter(|(_, present)| *present).count(),
        total = features.len(),
        "decoded feature flags"
    );

    CpuReport { identity, features }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_information::tests_support::MapSource;

    fn vendor_leaf(vendor: &[u8; 12], max_leaf: u32) -> CpuidResult {
        let reg = |i: usize| {
            u32::from_le_bytes([vendor[i], vendor[i + 1], vendor[i + 2], vendor[i + 3]])
        };

        CpuidResult {
            eax: max_leaf,
            ebx: reg(0),
            edx: reg(4),
            ecx: reg(8),
        }
    }

    /// CPUID values of an Intel Core i9-9900K (Coffee Lake).
    fn coffee_lake() -> MapSource {
        MapSource::new()
            .with(0, 0, vendor_leaf(b"GenuineIntel", 0x16))
            .with(
                1,
                0,
                CpuidResult {
                    eax: 0x000906ED,
                    ebx: 0x00100800,
                    ecx: 0x7FFAFBBF,
                    edx: 0xBFEBFBFF,
                },
            )
            .with(
                7,
                0,
                CpuidResult {
                    eax: 0,
                    ebx: 0x029C67AF,
                    ecx: 0x40000000,
                    edx: 0xBC000400,
                },
            )
            .with(
                0x8000_0000,
                0,
                CpuidResult {
                    eax: 0x8000_0008,
                    ..Default::default()
                },
            )
            .with(
                0x8000_0002,
                0,
                CpuidResult {
                    eax: 0x65746E49,
                    ebx: 0x2952286C,
                    ecx: 0x726F4320,
                    edx: 0x4D542865,
                },
            )
            .with(
                0x8000_0003,
                0,
                CpuidResult {
                    eax: 0x39692029,
                    ebx: 0x3039392D,
                    ecx: 0x43204B30,
                    edx: 0x40205550,
                },
            )
            .with(
                0x8000_0004,
                0,
                CpuidResult {
                    eax: 0x362E3320,
                    ebx: 0x7A484730,
                    ecx: 0x00000000,
                    edx: 0x00000000,
                },
            )
    }

    #[test]
    fn signature_fields() {
        let sig = Signature::from(0x000906ED);

        assert_eq!(sig.stepping, 0xD);
        assert_eq!(sig.base_model, 0xE);
        assert_eq!(sig.base_family, 0x6);
        assert_eq!(sig.processor_type, ProcessorType::Oem);
        assert_eq!(sig.extended_model, 0x9);
        assert_eq!(sig.extended_family, 0);
        assert_eq!(sig.effective_model(), 0x9E);
        assert_eq!(sig.effective_family(), 6);
    }

    #[test]
    fn extended_model_applies_to_family_6() {
        let sig = Signature {
            stepping: 0,
            base_model: 0x5,
            base_family: 6,
            processor_type_id: 0,
            processor_type: ProcessorType::Oem,
            extended_model: 0xA,
            extended_family: 0,
        };

        assert_eq!(sig.effective_model(), 0xA5);
    }

    #[test]
    fn extended_fields_ignored_for_other_families() {
        // Family 2, extended model 0xA, extended family 0x3.
        let sig = Signature::from(0x003A_0255);

        assert_eq!(sig.base_family, 2);
        assert_eq!(sig.extended_model, 0xA);
        assert_eq!(sig.extended_family, 0x3);
        assert_eq!(sig.effective_model(), 0x5);
        assert_eq!(sig.effective_family(), 2);
    }

    #[test]
    fn extended_family_applies_to_family_15() {
        // AMD Zen 2: family 0xF + 0x8, model 0x3 << 4 | 0x1.
        let sig = Signature::from(0x00830F10);

        assert_eq!(sig.base_family, 0xF);
        assert_eq!(sig.effective_family(), 0x17);
        assert_eq!(sig.effective_model(), 0x31);
    }

    #[test]
    fn processor_types() {
        assert_eq!(ProcessorType::from(0), ProcessorType::Oem);
        assert_eq!(ProcessorType::from(1), ProcessorType::Overdrive);
        assert_eq!(ProcessorType::from(2), ProcessorType::DualProcessor);
        assert_eq!(ProcessorType::from(3), ProcessorType::Unknown);
        assert_eq!(Signature::from(0x2000).processor_type, ProcessorType::DualProcessor);
    }

    #[test]
    fn vendors_are_classified() {
        let classify =
            |v: &[u8; 12]| Vendor::from_vendor_string(&VendorString::from_leaf0(&vendor_leaf(v, 0)));

        assert_eq!(classify(b"GenuineIntel"), Vendor::Intel);
        assert_eq!(classify(b"AuthenticAMD"), Vendor::Amd);
        assert_eq!(classify(b"HygonGenuine"), Vendor::Other);
        assert_eq!(classify(b"genuineintel"), Vendor::Other);
        assert_eq!(classify(b"\0\0\0\0\0\0\0\0\0\0\0\0"), Vendor::Other);
    }

    #[test]
    fn decode_coffee_lake() {
        let report = decode(&coffee_lake());
        let id = &report.identity;

        assert_eq!(id.max_basic_leaf, 0x16);
        assert_eq!(id.max_extended_leaf, 0x8000_0008);
        assert_eq!(id.vendor, Vendor::Intel);
        assert_eq!(id.vendor_string.to_string(), "GenuineIntel");
        assert_eq!(id.brand_string.to_string(), "Intel(R) Core(TM) i9-9900K CPU @ 3.60GHz");
        assert_eq!(id.brand_string.len(), 48);
        assert_eq!(id.effective_model, 0x9E);
        assert_eq!(id.effective_family, 6);

        let f = &report.features;
        for name in ["FPU", "MMX", "SSE4.2", "AES", "AVX", "AVX2", "BMI1", "BMI2", "ADX", "SMAP"] {
            assert_eq!(f.get(name), Some(true), "{}", name);
        }
        for name in ["AVX512F", "SHA", "3DNow", "CLZERO"] {
            assert_eq!(f.get(name), Some(false), "{}", name);
        }
    }

    #[test]
    fn decoding_is_repeatable() {
        let source = coffee_lake();

        assert_eq!(decode(&source), decode(&source));
    }

    #[test]
    fn empty_source_decodes_to_zeros() {
        let report = decode(&MapSource::new());

        assert_eq!(report.identity.vendor, Vendor::Other);
        assert_eq!(report.identity.vendor_string.len(), 12);
        assert_eq!(report.identity.brand_string.to_string(), "");
        assert_eq!(report.identity.effective_family, 0);
        assert!(report.features.iter().all(|(_, present)| !present));
    }
}
