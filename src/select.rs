// SPDX-License-Identifier: GPL-2.0
//
// scx_cass: capacity-aware wakeup CPU selection

use crate::candidate::Candidate;
use crate::candidate::SkipReason;
use crate::candidate::Synth;
use crate::candidate::{self, MAX_UTIL_SPREAD};
use crate::compare::candidate_better;
use crate::compare::CompareCtx;
use crate::load::LoadProvider;
use crate::task::TaskClass;
use crate::task::WakeFlags;
use crate::task::WakeTask;

/// Per-decision skip tallies, for observability only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipCounts {
    pub not_big: u64,
    pub busy_after_idle: u64,
    pub overloaded: u64,
    pub spread: u64,
}

/// Outcome of one wakeup decision. `cpu` is always a member of the
/// task's allowed set (first allowed core when nothing qualifies).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Decision {
    pub cpu: u32,
    /// Effective synchronous-handoff flag used for the decision.
    pub sync: bool,
    /// Exec-continuation fast path taken.
    pub exec_fast: bool,
    /// Allowed set did not intersect the active set.
    pub affinity_fallback: bool,
    /// Chosen core was available (idle or sync single-runner).
    pub idle_pick: bool,
    /// Every core was filtered out; fell back to the first allowed.
    pub no_candidate: bool,
    pub skips: SkipCounts,
}

/// Walk the allowed ∩ active cores keeping only the best candidate so
/// far. O(1) extra memory: one adopted slot plus the scratch candidate
/// under evaluation.
fn best_cpu(
    prov: &dyn LoadProvider,
    task: &WakeTask,
    this_cpu: u32,
    sync: bool,
    dec: &mut Decision,
) -> u32 {
    let mut best: Option<Candidate> = None;
    let mut has_idle = false;
    let ctx = CompareCtx {
        prov,
        p_util: task.placement_util(),
        this_cpu,
        prev_cpu: task.prev_cpu,
        sync,
    };

    for cpu in task.allowed.iter() {
        if !prov.active_mask().test_cpu(cpu) {
            continue;
        }

        let (cand, idle_pref) = match candidate::synthesize(prov, task, cpu, this_cpu, sync, has_idle) {
            Synth::Cand { cand, idle_pref } => (cand, idle_pref),
            Synth::Skip(reason) => {
                match reason {
                    SkipReason::NotBigEnough => dec.skips.not_big += 1,
                    SkipReason::BusyAfterIdle => dec.skips.busy_after_idle += 1,
                    SkipReason::Overloaded => dec.skips.overloaded += 1,
                }
                continue;
            }
        };

        // The first qualifying available core displaces any incumbent:
        // idle cores are preferred outright until one is held.
        if idle_pref {
            best = Some(cand);
            has_idle = true;
            continue;
        }

        let adopt = match best {
            None => true,
            Some(ref b) => {
                if cand.util.abs_diff(b.util) > MAX_UTIL_SPREAD {
                    dec.skips.spread += 1;
                    continue;
                }
                candidate_better(&ctx, &cand, b)
            }
        };
        if adopt {
            best = Some(cand);
        }
    }

    match best {
        Some(b) => {
            dec.idle_pick = b.exit_lat > 0;
            b.cpu
        }
        None => {
            dec.no_candidate = true;
            task.allowed.first().unwrap_or(0)
        }
    }
}

/// Wakeup entry point: resolve the fast paths, then delegate to the
/// selector. Never fails; degenerate inputs degrade the choice, not the
/// contract.
pub fn select_task_rq(
    prov: &dyn LoadProvider,
    task: &mut WakeTask,
    this_cpu: u32,
    wake_flags: WakeFlags,
) -> Decision {
    debug_assert!(
        !task.allowed.is_empty(),
        "waking task {} has an empty allowed set",
        task.pid
    );

    let mut dec = Decision {
        cpu: task.prev_cpu,
        ..Decision::default()
    };

    // Exec continuation: the address space was just replaced, locality
    // with the previous core is all that matters.
    if wake_flags.exec() {
        dec.exec_fast = true;
        return dec;
    }

    // Hotplug/affinity race: nothing allowed is schedulable.
    if !task.allowed.intersects(prov.active_mask()) {
        dec.cpu = task.allowed.first().unwrap_or(0);
        dec.affinity_fallback = true;
        return dec;
    }

    // Fork-time fair placement has no history worth refreshing yet.
    if task.class == TaskClass::Fair && !wake_flags.fork() {
        prov.sync_task_load(task);
    }

    let sync = wake_flags.sync() && !prov.waker_exiting(this_cpu);
    dec.sync = sync;
    let cpu = best_cpu(prov, task, this_cpu, sync, &mut dec);
    dec.cpu = cpu;
    dec
}

/// Fair-class wakeup: place with the task's utilization estimate.
pub fn select_task_rq_fair(
    prov: &dyn LoadProvider,
    task: &mut WakeTask,
    this_cpu: u32,
    wake_flags: WakeFlags,
) -> u32 {
    task.class = TaskClass::Fair;
    select_task_rq(prov, task, this_cpu, wake_flags).cpu
}

/// Real-time wakeup: same walk with a zero utilization estimate and no
/// history refresh.
pub fn select_task_rq_rt(
    prov: &dyn LoadProvider,
    task: &mut WakeTask,
    this_cpu: u32,
    wake_flags: WakeFlags,
) -> u32 {
    task.class = TaskClass::RealTime;
    select_task_rq(prov, task, this_cpu, wake_flags).cpu
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpumask::Cpumask;
    use crate::load::SystemLoad;
    use crate::task::{WF_EXEC, WF_SYNC};

    fn task(util: u64, uclamp_min: u64, prev: u32, nr_cpus: usize) -> WakeTask {
        WakeTask {
            pid: 7,
            prev_cpu: prev,
            cur_cpu: prev,
            allowed: Cpumask::full(nr_cpus),
            util,
            uclamp_min,
            class: TaskClass::Fair,
        }
    }

    fn all_busy(sys: &SystemLoad, util: u64) {
        for cpu in 0..sys.nr_cpus() as u32 {
            sys.set_running(cpu, 2, 50, true);
            sys.set_util_avg(cpu, util);
        }
    }

    #[test]
    fn returned_cpu_in_allowed_set() {
        let sys = SystemLoad::uniform(8, 1024);
        all_busy(&sys, 300);
        sys.set_idle(5, 1);

        let mut t = task(100, 0, 0, 8);
        t.allowed = Cpumask::from_cpus(&[2, 3], 8);
        let cpu = select_task_rq_fair(&sys, &mut t, 0, WakeFlags(0));
        assert!(t.allowed.test_cpu(cpu));
    }

    #[test]
    fn inactive_cpus_never_chosen() {
        let mut sys = SystemLoad::uniform(4, 1024);
        all_busy(&sys, 300);
        sys.set_idle(3, 0);
        sys.set_active(Cpumask::from_cpus(&[0, 1, 2], 4));

        let mut t = task(100, 0, 0, 4);
        let cpu = select_task_rq_fair(&sys, &mut t, 0, WakeFlags(0));
        assert_ne!(cpu, 3);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "empty allowed set")]
    fn empty_allowed_set_is_a_caller_bug() {
        let sys = SystemLoad::uniform(4, 1024);
        let mut t = task(100, 0, 0, 4);
        t.allowed = Cpumask::new(4);
        select_task_rq(&sys, &mut t, 0, WakeFlags(0));
    }

    #[test]
    fn affinity_fallback_on_empty_intersection() {
        let mut sys = SystemLoad::uniform(4, 1024);
        sys.set_active(Cpumask::from_cpus(&[0, 1], 4));

        let mut t = task(100, 0, 0, 4);
        t.allowed = Cpumask::from_cpus(&[2, 3], 4);
        let dec = select_task_rq(&sys, &mut t, 0, WakeFlags(0));
        assert!(dec.affinity_fallback);
        assert_eq!(dec.cpu, 2);
    }

    #[test]
    fn exec_continuation_returns_prev_unconditionally() {
        let sys = SystemLoad::uniform(4, 1024);
        all_busy(&sys, 900);
        sys.set_idle(2, 0);

        let mut t = task(100, 0, 1, 4);
        let dec = select_task_rq(&sys, &mut t, 0, WakeFlags(WF_EXEC));
        assert!(dec.exec_fast);
        assert_eq!(dec.cpu, 1);
    }

    #[test]
    fn single_idle_core_preferred() {
        let sys = SystemLoad::uniform(4, 1024);
        all_busy(&sys, 400);
        sys.set_idle(3, 2);

        let mut t = task(100, 0, 0, 4);
        let dec = select_task_rq(&sys, &mut t, 0, WakeFlags(0));
        assert_eq!(dec.cpu, 3);
        assert!(dec.idle_pick);
    }

    #[test]
    fn idle_core_with_exit_latency_beats_busy_core() {
        // Core 0 idle at exit latency 5; core 1 busy at 200/1024 with no
        // hard utilization. Clamp 0 always qualifies for the idle pick.
        let sys = SystemLoad::uniform(2, 1024);
        sys.set_idle(0, 5);
        sys.set_running(1, 2, 50, true);
        sys.set_util_avg(1, 200);

        let mut t = task(100, 0, 1, 2);
        let dec = select_task_rq(&sys, &mut t, 1, WakeFlags(0));
        assert_eq!(dec.cpu, 0);
        assert!(dec.idle_pick);
    }

    #[test]
    fn clamped_out_idle_core_loses_preference() {
        // The idle core's current frequency cannot honor the clamp, so
        // it is not adopted on sight; it still competes normally and
        // loses on load to the busy-but-light alternative.
        let sys = SystemLoad::uniform(2, 1024);
        sys.set_idle(0, 5);
        sys.set_freq_capacity(0, 300);
        sys.set_util_avg(0, 480);
        sys.set_running(1, 2, 50, true);
        sys.set_util_avg(1, 420);

        let mut t = task(0, 400, 1, 2);
        let dec = select_task_rq(&sys, &mut t, 1, WakeFlags(0));
        assert_eq!(dec.cpu, 1);
    }

    #[test]
    fn overloaded_core_never_chosen_when_alternative_exists() {
        let sys = SystemLoad::uniform(2, 1024);
        all_busy(&sys, 0);
        sys.set_util_avg(0, 1100);
        sys.set_util_avg(1, 800);

        let mut t = task(0, 0, 0, 2);
        let dec = select_task_rq(&sys, &mut t, 0, WakeFlags(0));
        assert_eq!(dec.cpu, 1);
        assert_eq!(dec.skips.overloaded, 1);
    }

    #[test]
    fn all_filtered_falls_back_to_first_allowed() {
        let sys = SystemLoad::uniform(2, 1024);
        all_busy(&sys, 1200);

        let mut t = task(0, 0, 1, 2);
        t.allowed = Cpumask::from_cpus(&[1], 2);
        let dec = select_task_rq(&sys, &mut t, 0, WakeFlags(0));
        assert!(dec.no_candidate);
        assert_eq!(dec.cpu, 1);
    }

    #[test]
    fn sync_wake_prefers_calling_core() {
        // Caller has only the waker runnable; the alternative carries
        // the same load but is not idle.
        let sys = SystemLoad::uniform(2, 1024);
        sys.set_running(0, 1, 100, true);
        sys.set_util_avg(0, 100);
        sys.set_running(1, 2, 100, true);
        sys.set_util_avg(1, 100);

        let mut t = task(100, 0, 1, 2);
        let dec = select_task_rq(&sys, &mut t, 0, WakeFlags(WF_SYNC));
        assert!(dec.sync);
        assert_eq!(dec.cpu, 0);
    }

    #[test]
    fn exiting_waker_disables_sync() {
        let sys = SystemLoad::uniform(2, 1024);
        sys.set_running(0, 1, 100, true);
        sys.set_util_avg(0, 100);
        sys.set_waker_exiting(0, true);
        sys.set_running(1, 2, 100, true);
        sys.set_util_avg(1, 100);

        let mut t = task(100, 0, 1, 2);
        let dec = select_task_rq(&sys, &mut t, 0, WakeFlags(WF_SYNC));
        assert!(!dec.sync);
    }

    #[test]
    fn spread_bound_protects_adopted_best() {
        // No idle cores; clamp above the busy-skip threshold is not
        // needed since has_idle never becomes true. Core 1 is lighter
        // by more than the spread, so it cannot displace core 0.
        let sys = SystemLoad::uniform(2, 1024);
        all_busy(&sys, 0);
        sys.set_util_avg(0, 500);
        sys.set_util_avg(1, 390);

        let mut t = task(0, 0, 0, 2);
        let dec = select_task_rq(&sys, &mut t, 0, WakeFlags(0));
        assert_eq!(dec.cpu, 0);
        assert_eq!(dec.skips.spread, 1);
    }

    #[test]
    fn within_spread_lighter_core_wins() {
        let sys = SystemLoad::uniform(2, 1024);
        all_busy(&sys, 0);
        sys.set_util_avg(0, 500);
        sys.set_util_avg(1, 420);

        let mut t = task(0, 0, 0, 2);
        let dec = select_task_rq(&sys, &mut t, 0, WakeFlags(0));
        assert_eq!(dec.cpu, 1);
    }

    #[test]
    fn heavy_task_confined_to_big_cores() {
        let sys = SystemLoad::new(vec![
            crate::load::CpuLoad::new(512, 0),
            crate::load::CpuLoad::new(512, 0),
            crate::load::CpuLoad::new(1024, 1),
        ]);
        for cpu in 0..3 {
            sys.set_running(cpu, 2, 50, true);
        }
        sys.set_util_avg(2, 300);

        let mut t = task(600, 0, 0, 3);
        let dec = select_task_rq(&sys, &mut t, 0, WakeFlags(0));
        assert_eq!(dec.cpu, 2);
        assert_eq!(dec.skips.not_big, 2);
    }

    #[test]
    fn rt_task_places_with_zero_util() {
        // A little core an rt task would overload if its own util
        // counted still qualifies, since rt placement uses zero.
        let sys = SystemLoad::new(vec![
            crate::load::CpuLoad::new(512, 0),
            crate::load::CpuLoad::new(1024, 1),
        ]);
        sys.set_running(0, 1, 10, true);
        sys.set_util_avg(0, 10);
        sys.set_running(1, 2, 50, true);
        sys.set_util_avg(1, 600);

        let mut t = task(900, 0, 0, 2);
        let cpu = select_task_rq_rt(&sys, &mut t, 1, WakeFlags(0));
        assert_eq!(cpu, 0);
    }

    #[test]
    fn deterministic_on_frozen_snapshot() {
        let sys = SystemLoad::uniform(8, 1024);
        all_busy(&sys, 0);
        for cpu in 0..8 {
            sys.set_util_avg(cpu, 100 + 37 * cpu as u64);
        }
        sys.set_idle(6, 3);

        let mut a = task(150, 0, 2, 8);
        let mut b = a.clone();
        let first = select_task_rq(&sys, &mut a, 0, WakeFlags(0));
        let second = select_task_rq(&sys, &mut b, 0, WakeFlags(0));
        assert_eq!(first, second);
    }

    #[test]
    fn cache_warm_core_preferred_on_tied_load() {
        let sys = SystemLoad::new(vec![
            crate::load::CpuLoad::new(1024, 0),
            crate::load::CpuLoad::new(1024, 0),
            crate::load::CpuLoad::new(1024, 1),
        ]);
        for cpu in 0..3 {
            sys.set_running(cpu, 2, 50, true);
            sys.set_util_avg(cpu, 200);
        }

        // prev_cpu = 1 is not allowed; of the tied cores, 0 shares a
        // cache domain with it and 2 does not.
        let mut t = task(0, 0, 1, 3);
        t.allowed = Cpumask::from_cpus(&[0, 2], 3);
        let dec = select_task_rq(&sys, &mut t, 0, WakeFlags(0));
        assert_eq!(dec.cpu, 0);
    }
}
