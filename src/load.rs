// SPDX-License-Identifier: GPL-2.0
//
// scx_cass: capacity-aware wakeup CPU selection
//
// The selection policy never owns load state. Every per-core counter it
// consumes belongs to the surrounding scheduler's run-queue bookkeeping;
// this module defines the read-only view of that state plus a concrete
// in-process implementation backed by relaxed atomics, so the policy can
// run against synthetic fixtures and the replay harness.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::cpumask::Cpumask;
use crate::task::WakeTask;

/// Fixed scale utilization and capacity are normalized to, so values are
/// comparable across cores with different raw capacities.
pub const SCHED_CAPACITY_SCALE: u64 = 1024;

/// Read-only topology and load view injected into the selection policy.
///
/// All reads are best-effort: implementations must not block, and callers
/// tolerate stale or torn values from concurrently running cores.
pub trait LoadProvider {
    fn nr_cpus(&self) -> usize;

    /// CPUs currently schedulable (online and not isolated).
    fn active_mask(&self) -> &Cpumask;

    /// Architectural maximum capacity, ignoring thermal derating.
    fn cap_orig(&self, cpu: u32) -> u64;

    /// Maximum capacity sustainable right now (post thermal derating).
    fn cap_max(&self, cpu: u32) -> u64;

    /// Capacity at the core's current operating frequency.
    fn freq_capacity(&self, cpu: u32) -> u64;

    /// Recency-weighted fair-class utilization average.
    fn util_avg(&self, cpu: u32) -> u64;

    /// Estimated enqueued utilization floor, if the provider tracks one.
    fn util_est(&self, cpu: u32) -> Option<u64>;

    fn util_rt(&self, cpu: u32) -> u64;
    fn util_dl(&self, cpu: u32) -> u64;
    fn util_irq(&self, cpu: u32) -> u64;

    fn nr_running(&self, cpu: u32) -> u32;

    /// `Some(exit_latency)` when the core is hardware-idle.
    fn idle_exit_latency(&self, cpu: u32) -> Option<u64>;

    /// Core is running only SCHED_IDLE-class work.
    fn sched_idle_cpu(&self, cpu: u32) -> bool;

    /// Locality predicate: do the two cores share a cache level?
    fn cpus_share_cache(&self, a: u32, b: u32) -> bool;

    /// Utilization of the task currently running on `cpu`. On a
    /// synchronous wakeup this is the waker, about to block.
    fn waker_util(&self, cpu: u32) -> u64;

    /// Whether the task currently running on `cpu` is fair-class.
    fn waker_is_fair(&self, cpu: u32) -> bool;

    /// Whether the task currently running on `cpu` is exiting.
    fn waker_exiting(&self, cpu: u32) -> bool;

    /// Bring the waking task's own utilization history up to date before
    /// placement. Default: history is already current.
    fn sync_task_load(&self, _task: &mut WakeTask) {}
}

/// Sentinel for "no estimated utilization tracked".
const UTIL_EST_NONE: u64 = u64::MAX;
/// Sentinel for "not hardware-idle".
const NOT_IDLE: u64 = u64::MAX;

/// Per-core load record. Single-word atomics, all relaxed: writers are
/// the cores' own bookkeeping (or the replay harness), readers are
/// concurrent wakeups on other cores.
#[derive(Debug)]
pub struct CpuLoad {
    cap_orig: u64,
    cache_domain: u32,
    cap_max: AtomicU64,
    freq_capacity: AtomicU64,
    util_avg: AtomicU64,
    util_est: AtomicU64,
    util_rt: AtomicU64,
    util_dl: AtomicU64,
    util_irq: AtomicU64,
    nr_running: AtomicU32,
    idle_exit_lat: AtomicU64,
    sched_idle: AtomicBool,
    waker_util: AtomicU64,
    waker_is_fair: AtomicBool,
    waker_exiting: AtomicBool,
}

impl CpuLoad {
    pub fn new(cap_orig: u64, cache_domain: u32) -> Self {
        Self {
            cap_orig,
            cache_domain,
            cap_max: AtomicU64::new(cap_orig),
            freq_capacity: AtomicU64::new(cap_orig),
            util_avg: AtomicU64::new(0),
            util_est: AtomicU64::new(UTIL_EST_NONE),
            util_rt: AtomicU64::new(0),
            util_dl: AtomicU64::new(0),
            util_irq: AtomicU64::new(0),
            nr_running: AtomicU32::new(0),
            idle_exit_lat: AtomicU64::new(0),
            sched_idle: AtomicBool::new(false),
            waker_util: AtomicU64::new(0),
            waker_is_fair: AtomicBool::new(true),
            waker_exiting: AtomicBool::new(false),
        }
    }
}

/// Concrete provider over a table of per-core records.
#[derive(Debug)]
pub struct SystemLoad {
    cpus: Vec<CpuLoad>,
    active: Cpumask,
    /// Frequency-pinning governor in effect: every core runs at max
    /// frequency, so frequency-scaled capacity reads as cap_max.
    pin_max_freq: bool,
}

impl SystemLoad {
    pub fn new(cpus: Vec<CpuLoad>) -> Self {
        let nr = cpus.len();
        Self {
            cpus,
            active: Cpumask::full(nr),
            pin_max_freq: false,
        }
    }

    /// Uniform topology helper: `nr_cpus` cores of equal capacity, all
    /// in one cache domain, all hardware-idle.
    pub fn uniform(nr_cpus: usize, cap: u64) -> Self {
        Self::new((0..nr_cpus).map(|_| CpuLoad::new(cap, 0)).collect())
    }

    pub fn set_pin_max_freq(&mut self, pin: bool) {
        self.pin_max_freq = pin;
    }

    pub fn set_active(&mut self, active: Cpumask) {
        self.active = active;
    }

    fn cpu(&self, cpu: u32) -> &CpuLoad {
        &self.cpus[cpu as usize]
    }

    // Mutation surface for fixtures and the replay harness. These stand
    // in for the run-queue bookkeeping that owns the counters in a real
    // scheduler.

    pub fn set_util_avg(&self, cpu: u32, util: u64) {
        self.cpu(cpu).util_avg.store(util, Ordering::Relaxed);
    }

    pub fn add_util_avg(&self, cpu: u32, util: u64) {
        self.cpu(cpu).util_avg.fetch_add(util, Ordering::Relaxed);
    }

    pub fn set_util_est(&self, cpu: u32, est: Option<u64>) {
        self.cpu(cpu)
            .util_est
            .store(est.unwrap_or(UTIL_EST_NONE), Ordering::Relaxed);
    }

    pub fn set_hard_util(&self, cpu: u32, rt: u64, dl: u64, irq: u64) {
        let c = self.cpu(cpu);
        c.util_rt.store(rt, Ordering::Relaxed);
        c.util_dl.store(dl, Ordering::Relaxed);
        c.util_irq.store(irq, Ordering::Relaxed);
    }

    pub fn set_cap_max(&self, cpu: u32, cap: u64) {
        self.cpu(cpu).cap_max.store(cap, Ordering::Relaxed);
    }

    pub fn set_freq_capacity(&self, cpu: u32, cap: u64) {
        self.cpu(cpu).freq_capacity.store(cap, Ordering::Relaxed);
    }

    /// Mark a core hardware-idle with the given idle-state exit latency.
    pub fn set_idle(&self, cpu: u32, exit_latency: u64) {
        let c = self.cpu(cpu);
        c.idle_exit_lat.store(exit_latency, Ordering::Relaxed);
        c.nr_running.store(0, Ordering::Relaxed);
        c.sched_idle.store(false, Ordering::Relaxed);
    }

    /// Mark a core busy with `nr_running` runnable tasks and the given
    /// currently-running task state.
    pub fn set_running(&self, cpu: u32, nr_running: u32, waker_util: u64, waker_is_fair: bool) {
        let c = self.cpu(cpu);
        c.idle_exit_lat.store(NOT_IDLE, Ordering::Relaxed);
        c.nr_running.store(nr_running, Ordering::Relaxed);
        c.waker_util.store(waker_util, Ordering::Relaxed);
        c.waker_is_fair.store(waker_is_fair, Ordering::Relaxed);
    }

    pub fn set_sched_idle(&self, cpu: u32, sched_idle: bool) {
        self.cpu(cpu).sched_idle.store(sched_idle, Ordering::Relaxed);
    }

    pub fn set_waker_exiting(&self, cpu: u32, exiting: bool) {
        self.cpu(cpu).waker_exiting.store(exiting, Ordering::Relaxed);
    }
}

impl LoadProvider for SystemLoad {
    fn nr_cpus(&self) -> usize {
        self.cpus.len()
    }

    fn active_mask(&self) -> &Cpumask {
        &self.active
    }

    fn cap_orig(&self, cpu: u32) -> u64 {
        self.cpu(cpu).cap_orig
    }

    fn cap_max(&self, cpu: u32) -> u64 {
        self.cpu(cpu).cap_max.load(Ordering::Relaxed)
    }

    fn freq_capacity(&self, cpu: u32) -> u64 {
        if self.pin_max_freq {
            return self.cap_max(cpu);
        }
        self.cpu(cpu).freq_capacity.load(Ordering::Relaxed)
    }

    fn util_avg(&self, cpu: u32) -> u64 {
        self.cpu(cpu).util_avg.load(Ordering::Relaxed)
    }

    fn util_est(&self, cpu: u32) -> Option<u64> {
        match self.cpu(cpu).util_est.load(Ordering::Relaxed) {
            UTIL_EST_NONE => None,
            est => Some(est),
        }
    }

    fn util_rt(&self, cpu: u32) -> u64 {
        self.cpu(cpu).util_rt.load(Ordering::Relaxed)
    }

    fn util_dl(&self, cpu: u32) -> u64 {
        self.cpu(cpu).util_dl.load(Ordering::Relaxed)
    }

    fn util_irq(&self, cpu: u32) -> u64 {
        self.cpu(cpu).util_irq.load(Ordering::Relaxed)
    }

    fn nr_running(&self, cpu: u32) -> u32 {
        self.cpu(cpu).nr_running.load(Ordering::Relaxed)
    }

    fn idle_exit_latency(&self, cpu: u32) -> Option<u64> {
        match self.cpu(cpu).idle_exit_lat.load(Ordering::Relaxed) {
            NOT_IDLE => None,
            lat => Some(lat),
        }
    }

    fn sched_idle_cpu(&self, cpu: u32) -> bool {
        self.cpu(cpu).sched_idle.load(Ordering::Relaxed)
    }

    fn cpus_share_cache(&self, a: u32, b: u32) -> bool {
        let (a, b) = (a as usize, b as usize);
        a < self.cpus.len() && b < self.cpus.len() && self.cpus[a].cache_domain == self.cpus[b].cache_domain
    }

    fn waker_util(&self, cpu: u32) -> u64 {
        self.cpu(cpu).waker_util.load(Ordering::Relaxed)
    }

    fn waker_is_fair(&self, cpu: u32) -> bool {
        self.cpu(cpu).waker_is_fair.load(Ordering::Relaxed)
    }

    fn waker_exiting(&self, cpu: u32) -> bool {
        self.cpu(cpu).waker_exiting.load(Ordering::Relaxed)
    }
}
