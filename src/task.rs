// SPDX-License-Identifier: GPL-2.0
//
// scx_cass: capacity-aware wakeup CPU selection

use crate::cpumask::Cpumask;

/// Scheduling class of the waking task. Real-time (and other non-fair)
/// tasks are placed with a zero utilization estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskClass {
    Fair,
    RealTime,
}

/// Wake flag bits, raw-bit style.
pub const WF_SYNC: u32 = 0x1;
pub const WF_FORK: u32 = 0x2;
pub const WF_EXEC: u32 = 0x4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WakeFlags(pub u32);

impl WakeFlags {
    pub fn sync(self) -> bool {
        self.0 & WF_SYNC != 0
    }

    pub fn fork(self) -> bool {
        self.0 & WF_FORK != 0
    }

    pub fn exec(self) -> bool {
        self.0 & WF_EXEC != 0
    }
}

/// The view of a waking task the selection policy consumes.
#[derive(Debug, Clone)]
pub struct WakeTask {
    pub pid: i32,
    /// Core the task ran on before it slept.
    pub prev_cpu: u32,
    /// Core the task is currently assigned to (usually == prev_cpu at
    /// wakeup time). Its own utilization is already folded into this
    /// core's counters, so it is not added again there.
    pub cur_cpu: u32,
    /// CPUs the task is permitted to run on. Never empty: the
    /// dispatcher's answer is always a member of this set, including
    /// on the fallback paths.
    pub allowed: Cpumask,
    /// Recency-weighted utilization estimate of the task itself.
    pub util: u64,
    /// Minimum-utilization clamp (performance floor).
    pub uclamp_min: u64,
    pub class: TaskClass,
}

impl WakeTask {
    /// Utilization used for placement: real-time tasks count as zero.
    pub fn placement_util(&self) -> u64 {
        match self.class {
            TaskClass::Fair => self.util,
            TaskClass::RealTime => 0,
        }
    }
}
