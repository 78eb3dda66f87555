//! # cputools
//!
//! Query the x86 `cpuid` instruction and decode what it says about
//! the CPU: vendor, brand, family/model/stepping and feature flags.
//!
//! CPUID values come from a [CpuidSource]. That is either the CPU we
//! are running on ([native::NativeCpuid], x86 only) or a recorded AIDA64
//! dump ([aida_dump::AidaCpuidDump]). [decoder::decode] turns a source
//! into a [decoder::CpuReport], which [report] renders as text or
//! JSON.

#[macro_use]
extern crate lazy_static;

pub mod aida_dump;
pub mod bits;
pub mod cpu_information;
pub mod decoder;
pub mod features;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod native;
pub mod query;
pub mod report;

pub use cpu_information::{CpuidQuery, CpuidRegister, CpuidResult, CpuidSource};
