// SPDX-License-Identifier: GPL-2.0
//
// scx_cass: capacity-aware wakeup CPU selection

use crate::load::LoadProvider;
use crate::load::SCHED_CAPACITY_SCALE;
use crate::snapshot;
use crate::task::WakeTask;

/// Minimum derated capacity for a core to count as "big" when placement
/// is forced onto big cores.
pub const BIG_CORE_MIN_CAP: u64 = 640;

/// Task utilization or clamp at/above this forces big-core-only
/// placement.
pub const FORCE_BIG_UTIL_THRESH: u64 = 512;

/// Once an idle-preferring best exists, busy cores are skipped outright
/// for tasks clamped below this.
pub const IDLE_PREF_CLAMP_THRESH: u64 = 512;

/// Maximum normalized-utilization distance a challenger may sit from the
/// adopted best before it is not worth shopping around for.
pub const MAX_UTIL_SPREAD: u64 = 96;

/// One core's placement record for a single wakeup decision. Never
/// cached or shared across wakeups; the selector keeps at most two
/// alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub cpu: u32,
    /// 0 if running, 1 + idle-state exit latency if available.
    pub exit_lat: u64,
    /// Headroom left after non-fair classes, at least 1.
    pub cap: u64,
    pub cap_max: u64,
    pub cap_no_therm: u64,
    pub cap_orig: u64,
    /// Projected total utilization if the task ran here, clamp-floored.
    pub eff_util: u64,
    pub hard_util: u64,
    /// Fair-class utilization with the task folded in, clamp-floored,
    /// normalized to SCHED_CAPACITY_SCALE.
    pub util: u64,
}

/// Why a core dropped out of the candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Heavy task, core below the big-core capacity threshold.
    NotBigEnough,
    /// An idle-preferring best exists and the task is lightly clamped.
    BusyAfterIdle,
    /// Projected utilization at or above sustainable capacity.
    Overloaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Synth {
    Skip(SkipReason),
    Cand {
        cand: Candidate,
        /// This core qualifies as the first idle-preferring best.
        idle_pref: bool,
    },
}

/// Build the Candidate for one core, or decide it is ineligible.
///
/// `has_idle` tells the synthesizer whether the selector already adopted
/// an idle-preferring best. The load-spread filter is applied by the
/// selector since it needs the incumbent.
pub fn synthesize<P: LoadProvider + ?Sized>(
    prov: &P,
    task: &WakeTask,
    cpu: u32,
    this_cpu: u32,
    sync: bool,
    has_idle: bool,
) -> Synth {
    let p_util = task.placement_util();
    let cap_orig = prov.cap_orig(cpu);
    let cap_max = prov.cap_max(cpu);

    if (task.uclamp_min >= FORCE_BIG_UTIL_THRESH || p_util >= FORCE_BIG_UTIL_THRESH)
        && cap_max < BIG_CORE_MIN_CAP
    {
        return Synth::Skip(SkipReason::NotBigEnough);
    }

    let idle_lat = prov.idle_exit_latency(cpu);
    let available = (sync && cpu == this_cpu && prov.nr_running(cpu) == 1)
        || idle_lat.is_some()
        || prov.sched_idle_cpu(cpu);

    let (exit_lat, idle_pref) = if available {
        let idle_pref = !has_idle && task.uclamp_min <= prov.freq_capacity(cpu);
        (1 + idle_lat.unwrap_or(0), idle_pref)
    } else {
        if has_idle && task.uclamp_min < IDLE_PREF_CLAMP_THRESH {
            return Synth::Skip(SkipReason::BusyAfterIdle);
        }
        (0, false)
    };

    let snap = snapshot::read(prov, cpu, this_cpu, sync, cap_max, cap_orig);

    let mut util = snap.util;
    if cpu != task.cur_cpu {
        util += p_util;
    }

    let eff_util = (util + snap.hard_util).max(task.uclamp_min);
    let util = util.max(task.uclamp_min) * SCHED_CAPACITY_SCALE / snap.cap_no_therm;

    if eff_util >= cap_max {
        return Synth::Skip(SkipReason::Overloaded);
    }

    Synth::Cand {
        cand: Candidate {
            cpu,
            exit_lat,
            cap: snap.cap,
            cap_max,
            cap_no_therm: snap.cap_no_therm,
            cap_orig,
            eff_util,
            hard_util: snap.hard_util,
            util,
        },
        idle_pref,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpumask::Cpumask;
    use crate::load::SystemLoad;
    use crate::task::TaskClass;

    fn task(util: u64, uclamp_min: u64) -> WakeTask {
        WakeTask {
            pid: 42,
            prev_cpu: 0,
            cur_cpu: 0,
            allowed: Cpumask::full(8),
            util,
            uclamp_min,
            class: TaskClass::Fair,
        }
    }

    fn expect_cand(s: Synth) -> (Candidate, bool) {
        match s {
            Synth::Cand { cand, idle_pref } => (cand, idle_pref),
            Synth::Skip(r) => panic!("unexpected skip: {:?}", r),
        }
    }

    #[test]
    fn heavy_task_skips_little_core() {
        let sys = SystemLoad::new(vec![
            crate::load::CpuLoad::new(1024, 0),
            crate::load::CpuLoad::new(512, 1),
        ]);
        let t = task(600, 0);

        assert!(matches!(
            synthesize(&sys, &t, 1, 0, false, false),
            Synth::Skip(SkipReason::NotBigEnough)
        ));
        // The big core stays eligible.
        expect_cand(synthesize(&sys, &t, 0, 0, false, false));
    }

    #[test]
    fn idle_core_gets_exit_latency_and_preference() {
        let sys = SystemLoad::uniform(2, 1024);
        sys.set_idle(0, 5);
        let t = task(100, 0);

        let (cand, idle_pref) = expect_cand(synthesize(&sys, &t, 0, 1, false, false));
        assert_eq!(cand.exit_lat, 6);
        assert!(idle_pref);

        // Once an idle best exists, a later idle core is a normal
        // candidate, not a new idle preference.
        let (_, idle_pref) = expect_cand(synthesize(&sys, &t, 0, 1, false, true));
        assert!(!idle_pref);
    }

    #[test]
    fn clamp_above_freq_capacity_blocks_idle_preference() {
        let sys = SystemLoad::uniform(1, 1024);
        sys.set_idle(0, 0);
        sys.set_freq_capacity(0, 300);
        let t = task(100, 400);

        let (cand, idle_pref) = expect_cand(synthesize(&sys, &t, 0, 0, false, false));
        assert_eq!(cand.exit_lat, 1);
        assert!(!idle_pref);
    }

    #[test]
    fn busy_core_skipped_after_idle_for_light_tasks() {
        let sys = SystemLoad::uniform(2, 1024);
        sys.set_running(1, 1, 50, true);
        sys.set_util_avg(1, 100);
        let t = task(100, 0);

        assert!(matches!(
            synthesize(&sys, &t, 1, 0, false, true),
            Synth::Skip(SkipReason::BusyAfterIdle)
        ));

        // A heavily clamped task keeps evaluating busy cores.
        let heavy = task(100, 600);
        let (cand, _) = expect_cand(synthesize(&sys, &heavy, 1, 0, false, true));
        assert_eq!(cand.exit_lat, 0);
    }

    #[test]
    fn sync_single_runner_on_calling_core_is_available() {
        let sys = SystemLoad::uniform(2, 1024);
        sys.set_running(0, 1, 80, true);
        sys.set_util_avg(0, 80);
        let t = task(50, 0);

        let (cand, idle_pref) = expect_cand(synthesize(&sys, &t, 0, 0, true, false));
        assert_eq!(cand.exit_lat, 1);
        assert!(idle_pref);
    }

    #[test]
    fn task_util_folded_in_unless_already_there() {
        let sys = SystemLoad::uniform(2, 1024);
        sys.set_util_avg(0, 100);
        sys.set_util_avg(1, 100);
        let t = task(200, 0); // cur_cpu == 0

        let (on_cur, _) = expect_cand(synthesize(&sys, &t, 0, 0, false, false));
        let (on_other, _) = expect_cand(synthesize(&sys, &t, 1, 0, false, false));
        assert_eq!(on_cur.eff_util, 100);
        assert_eq!(on_other.eff_util, 300);
        assert_eq!(on_cur.util, 100 * 1024 / 1024);
        assert_eq!(on_other.util, 300 * 1024 / 1024);
    }

    #[test]
    fn clamp_floors_both_utilizations() {
        let sys = SystemLoad::uniform(1, 1024);
        sys.set_util_avg(0, 50);
        let t = task(0, 400); // cur_cpu == 0, nothing folded in

        let (cand, _) = expect_cand(synthesize(&sys, &t, 0, 0, false, false));
        assert_eq!(cand.eff_util, 400);
        assert_eq!(cand.util, 400 * 1024 / 1024);
    }

    #[test]
    fn overloaded_core_is_rejected() {
        let sys = SystemLoad::uniform(1, 1024);
        sys.set_util_avg(0, 900);
        sys.set_hard_util(0, 200, 0, 0);
        let t = task(0, 0);

        assert!(matches!(
            synthesize(&sys, &t, 0, 0, false, false),
            Synth::Skip(SkipReason::Overloaded)
        ));
    }

    #[test]
    fn overloaded_idle_core_never_becomes_idle_preference() {
        let sys = SystemLoad::uniform(1, 1024);
        sys.set_idle(0, 2);
        sys.set_util_est(0, Some(2000));
        let t = task(0, 0);

        assert!(matches!(
            synthesize(&sys, &t, 0, 0, false, false),
            Synth::Skip(SkipReason::Overloaded)
        ));
    }
}
