//! # Reports
//!
//! Presents a decoded [CpuReport] as text or JSON.

use std::fmt::{self, Display};

use crate::decoder::{CpuIdentity, CpuReport};
use crate::features::{FeatureFlagSet, Section};

fn supported_state(present: bool) -> &'static str {
    if present {
        "Supported"
    } else {
        "Not supported"
    }
}

/// Writes the identification section.
struct IdentitySection<'a>(&'a CpuIdentity);

impl Display for IdentitySection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let id = self.0;
        let sig = &id.signature;

        writeln!(f, "CPU IDENTIFICATION")?;
        writeln!(f, "\tBrand string: \"{}\"", id.brand_string)?;
        writeln!(f, "\tVendor string: \"{}\"", id.vendor_string)?;
        writeln!(f, "\tMax EAX basic function code: {:#x}", id.max_basic_leaf)?;
        writeln!(f, "\tMax EAX extended function code: {:#x}", id.max_extended_leaf)?;
        writeln!(f, "\tStepping ID: {:#x}", sig.stepping)?;
        writeln!(
            f,
            "\tProcessor type: {:#x} : {}",
            sig.processor_type_id,
            sig.processor_type.description()
        )?;
        writeln!(f, "\tBase model: {:#x}", sig.base_model)?;
        writeln!(f, "\tExtended model: {:#x}", sig.extended_model)?;
        writeln!(f, "\tBase family: {:#x}", sig.base_family)?;
        writeln!(f, "\tExtended family: {:#x}", sig.extended_family)?;
        writeln!(f, "\tEffective model: {:#x}", id.effective_model)?;
        writeln!(f, "\tEffective family: {:#x}", id.effective_family)
    }
}

/// Writes the features of one section.
struct FeatureSection<'a> {
    features: &'a FeatureFlagSet,
    section: Section,
}

impl Display for FeatureSection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.section.title())?;

        for (feature, present) in self.features.section(self.section) {
            writeln!(f, "\t{}: {}", feature.description, supported_state(present))?;
        }

        Ok(())
    }
}

/// The human-readable report, one section after another.
pub fn text(report: &CpuReport) -> String {
    let mut sections = vec![IdentitySection(&report.identity).to_string()];

    sections.extend(Section::ALL.iter().map(|&section| {
        FeatureSection {
            features: &report.features,
            section,
        }
        .to_string()
    }));

    sections.join("\n")
}

/// The machine-readable report.
pub fn json(report: &CpuReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}
