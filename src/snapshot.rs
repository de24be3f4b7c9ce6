// SPDX-License-Identifier: GPL-2.0
//
// scx_cass: capacity-aware wakeup CPU selection

use crate::load::LoadProvider;

/// Instantaneous capacity/utilization measures for one core, read once
/// per candidate evaluation. Pure reads, stale values tolerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuSnapshot {
    /// Fair-class utilization, raw (not yet normalized).
    pub util: u64,
    /// Utilization consumed by non-fair classes (rt + dl + irq).
    pub hard_util: u64,
    /// Usable headroom: cap_max minus hard utilization, at least 1.
    pub cap: u64,
    /// Normalization divisor: capacity ignoring thermal derating.
    pub cap_no_therm: u64,
}

/// Read one core's load state.
///
/// The running average is floored by the estimated enqueued utilization
/// when the provider tracks one; when the estimate wins, the subtractive
/// sync adjustment is disabled (the estimate already excludes blocked
/// tasks). On a synchronous wakeup targeting the calling core, the
/// waker's own utilization is discounted since it is about to block,
/// unless the waker is not fair-class.
pub fn read<P: LoadProvider + ?Sized>(
    prov: &P,
    cpu: u32,
    this_cpu: u32,
    sync: bool,
    cap_max: u64,
    cap_orig: u64,
) -> CpuSnapshot {
    let mut sync = sync;
    let mut util = prov.util_avg(cpu);

    if let Some(est) = prov.util_est(cpu) {
        if est > util {
            sync = false;
            util = est;
        }
    }

    if sync && cpu == this_cpu && prov.waker_is_fair(this_cpu) {
        util -= util.min(prov.waker_util(this_cpu));
    }

    let hard_util = prov.util_rt(cpu) + prov.util_dl(cpu) + prov.util_irq(cpu);
    let cap = cap_max - hard_util.min(cap_max - 1);

    CpuSnapshot {
        util,
        hard_util,
        cap,
        cap_no_therm: cap_orig,
    }
}
