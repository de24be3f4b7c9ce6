// SPDX-License-Identifier: GPL-2.0
//
// scx_cass: capacity-aware wakeup CPU selection
//
// Replays a scenario's wakeup list through the dispatcher. The only
// feedback applied between decisions is the enqueue itself: the task's
// utilization is charged to the chosen core. Ready-queue management,
// time slicing and load balancing stay outside this model.

use std::io::Write;

use anyhow::Result;
use log::debug;
use rustc_hash::FxHashMap;

use crate::load::LoadProvider;
use crate::scenario::Scenario;
use crate::select::select_task_rq;
use crate::stats::{Metrics, Monitor};
use crate::task::{TaskClass, WakeFlags, WakeTask, WF_EXEC, WF_FORK, WF_SYNC};

/// One replayed decision, for tracing and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStep {
    pub pid: i32,
    pub this_cpu: u32,
    pub chosen: u32,
}

pub struct Replay {
    pub metrics: Metrics,
    pub steps: Vec<ReplayStep>,
}

/// Run every wakeup in the scenario, in order.
pub fn replay(scenario: &Scenario) -> Result<Replay> {
    run_wakeups(scenario, None)
}

/// Like [`replay`], printing an interval metrics banner through the
/// monitor as the wakeup list progresses.
pub fn replay_monitored<W: Write>(
    scenario: &Scenario,
    monitor: &mut Monitor,
    out: &mut W,
) -> Result<Replay> {
    run_wakeups(scenario, Some((monitor, out)))
}

fn run_wakeups(
    scenario: &Scenario,
    mut monitor: Option<(&mut Monitor, &mut dyn Write)>,
) -> Result<Replay> {
    scenario.validate()?;
    let sys = scenario.build_system();
    let mut tasks: FxHashMap<i32, WakeTask> = scenario
        .build_tasks()?
        .into_iter()
        .map(|t| (t.pid, t))
        .collect();

    let mut metrics = Metrics::default();
    let mut steps = Vec::with_capacity(scenario.wakeups.len());

    for wake in &scenario.wakeups {
        let task = tasks
            .get_mut(&wake.pid)
            .ok_or_else(|| anyhow::anyhow!("wakeup references unknown task {}", wake.pid))?;

        let mut flags = 0u32;
        if wake.sync {
            flags |= WF_SYNC;
        }
        if wake.fork {
            flags |= WF_FORK;
        }
        if wake.exec {
            flags |= WF_EXEC;
        }

        let prev_cpu = task.prev_cpu;
        let dec = select_task_rq(&sys, task, wake.this_cpu, WakeFlags(flags));
        metrics.record(&dec, prev_cpu, wake.this_cpu);
        if let Some((mon, out)) = monitor.as_mut() {
            mon.tick(&metrics, out)?;
        }
        debug!(
            "pid {} woke on cpu {} -> cpu {} (sync={} idle={})",
            wake.pid, wake.this_cpu, dec.cpu, dec.sync, dec.idle_pick
        );

        // Enqueue feedback: the chosen core absorbs the task.
        let already_running = sys.nr_running(dec.cpu);
        sys.set_running(
            dec.cpu,
            already_running + 1,
            task.util,
            task.class == TaskClass::Fair,
        );
        if dec.cpu != task.cur_cpu {
            sys.add_util_avg(dec.cpu, task.util);
        }
        task.prev_cpu = dec.cpu;
        task.cur_cpu = dec.cpu;

        steps.push(ReplayStep {
            pid: wake.pid,
            this_cpu: wake.this_cpu,
            chosen: dec.cpu,
        });
    }

    Ok(Replay { metrics, steps })
}
