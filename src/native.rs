//! # Native CPUID
//!
//! Executes the `cpuid` instruction on the CPU we are running on. This
//! module only exists on x86 targets.

#[cfg(target_arch = "x86")]
use core::arch::x86::__cpuid_count;
#[cfg(target_arch = "x86_64")]
use core::arch::x86_64::__cpuid_count;

use tracing::trace;

use crate::cpu_information::{CpuidQuery, CpuidResult, CpuidSource};

/// The CPU this process runs on.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeCpuid;

impl CpuidSource for NativeCpuid {
    #[allow(unused_unsafe)]
    fn cpuid(&self, query: CpuidQuery) -> CpuidResult {
        // SAFETY: All x86 CPUs that can run this binary support
        // `cpuid`. The instruction has no side effects.
        let raw = unsafe { __cpuid_count(query.leaf, query.subleaf) };

        trace!(
            leaf = query.leaf,
            subleaf = query.subleaf,
            "cpuid {:08x}-{:08x}-{:08x}-{:08x}",
            raw.eax,
            raw.ebx,
            raw.ecx,
            raw.edx
        );

        CpuidResult {
            eax: raw.eax,
            ebx: raw.ebx,
            ecx: raw.ecx,
            edx: raw.edx,
        }
    }
}
