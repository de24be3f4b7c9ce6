// SPDX-License-Identifier: GPL-2.0
//
// scx_cass: capacity-aware wakeup CPU selection
//
// The pairwise preference between two candidates is an ordered decision
// list: criteria are evaluated in sequence and the first one that
// distinguishes the pair decides. A total tie keeps the incumbent.

use std::cmp::Ordering;

use crate::candidate::Candidate;
use crate::load::LoadProvider;
use crate::load::SCHED_CAPACITY_SCALE;

/// Inputs shared by every criterion for one wakeup decision.
pub struct CompareCtx<'a> {
    pub prov: &'a dyn LoadProvider,
    /// The waking task's own raw utilization estimate.
    pub p_util: u64,
    pub this_cpu: u32,
    pub prev_cpu: u32,
    pub sync: bool,
}

/// Standard capacity-fit test with the 1.25 headroom margin.
pub fn fits_capacity(util: u64, cap: u64) -> bool {
    cap * SCHED_CAPACITY_SCALE > util * (SCHED_CAPACITY_SCALE + SCHED_CAPACITY_SCALE / 4)
}

type Criterion = fn(&CompareCtx<'_>, &Candidate, &Candidate) -> Ordering;

/// Less proportionally loaded wins.
fn load_ratio(_ctx: &CompareCtx<'_>, a: &Candidate, b: &Candidate) -> Ordering {
    (b.eff_util / b.cap_max).cmp(&(a.eff_util / a.cap_max))
}

/// When both candidates are already past their sustainable capacity the
/// coarse ratio saturates; re-compare at full scale precision. Fires
/// only when both sides exceed their own cap_max.
fn overload_severity(_ctx: &CompareCtx<'_>, a: &Candidate, b: &Candidate) -> Ordering {
    if b.eff_util > b.cap_max && a.eff_util > a.cap_max {
        (b.eff_util * SCHED_CAPACITY_SCALE / b.cap_max)
            .cmp(&(a.eff_util * SCHED_CAPACITY_SCALE / a.cap_max))
    } else {
        Ordering::Equal
    }
}

/// A core the task fits on beats one it does not.
fn capacity_fit(ctx: &CompareCtx<'_>, a: &Candidate, b: &Candidate) -> Ordering {
    fits_capacity(ctx.p_util, a.cap_max).cmp(&fits_capacity(ctx.p_util, b.cap_max))
}

/// Less absolute core-local load wins.
fn local_load(_ctx: &CompareCtx<'_>, a: &Candidate, b: &Candidate) -> Ordering {
    b.util.cmp(&a.util)
}

/// Cache warmth: sharing a cache domain with the previous core wins.
fn cache_locality(ctx: &CompareCtx<'_>, a: &Candidate, b: &Candidate) -> Ordering {
    ctx.prov
        .cpus_share_cache(a.cpu, ctx.prev_cpu)
        .cmp(&ctx.prov.cpus_share_cache(b.cpu, ctx.prev_cpu))
}

/// On a synchronous wakeup, co-location with the waker favors the
/// challenger only; the incumbent being the calling core decides
/// nothing here.
fn sync_colocate(ctx: &CompareCtx<'_>, a: &Candidate, _b: &Candidate) -> Ordering {
    if ctx.sync && a.cpu == ctx.this_cpu {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

/// More instantaneous headroom wins.
fn headroom(_ctx: &CompareCtx<'_>, a: &Candidate, b: &Candidate) -> Ordering {
    a.cap.cmp(&b.cap)
}

/// Cheaper to bring out of idle (or already running) wins.
fn exit_latency(_ctx: &CompareCtx<'_>, a: &Candidate, b: &Candidate) -> Ordering {
    b.exit_lat.cmp(&a.exit_lat)
}

/// Last resort: prefer staying on the previous core.
fn prev_core(ctx: &CompareCtx<'_>, a: &Candidate, b: &Candidate) -> Ordering {
    (a.cpu == ctx.prev_cpu).cmp(&(b.cpu == ctx.prev_cpu))
}

const CRITERIA: &[Criterion] = &[
    load_ratio,
    overload_severity,
    capacity_fit,
    local_load,
    cache_locality,
    sync_colocate,
    headroom,
    exit_latency,
    prev_core,
];

/// True when candidate `a` is strictly preferable to `b`. Ties favor
/// `b`, the incumbent best.
pub fn candidate_better(ctx: &CompareCtx<'_>, a: &Candidate, b: &Candidate) -> bool {
    for crit in CRITERIA {
        match crit(ctx, a, b) {
            Ordering::Equal => continue,
            ord => return ord == Ordering::Greater,
        }
    }
    false
}
