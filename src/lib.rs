// SPDX-License-Identifier: GPL-2.0
//
// scx_cass: capacity-aware wakeup CPU selection
//
// At every task wakeup the policy picks, among the cores the task may
// run on, the one with the most attractive capacity/utilization trade,
// preferring idle cores for light tasks, avoiding overloaded ones, and
// breaking ties through a fixed criteria list (load ratio, capacity
// fit, cache warmth, sync co-location, headroom, exit latency,
// stability). The decision path is allocation-free and lock-free; all
// load state is read through an injected provider so the policy runs
// identically against a live system view or a frozen fixture.

pub mod candidate;
pub mod compare;
pub mod cpumask;
pub mod load;
pub mod scenario;
pub mod select;
pub mod sim;
pub mod snapshot;
pub mod stats;
pub mod task;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use crate::scenario::Scenario;

pub const SCHEDULER_NAME: &str = "scx_cass";

#[derive(Debug, Clone, Parser)]
#[command(
    name = "scx_cass",
    version,
    about = "Capacity-aware wakeup CPU selection, replayed against scenario fixtures."
)]
pub struct Opts {
    /// Scenario file (JSON). Runs a built-in demo scenario when absent.
    #[clap(short = 's', long)]
    pub scenario: Option<PathBuf>,

    /// Print an interval metrics banner every N wakeups during the
    /// replay, in addition to the final totals.
    #[clap(long, value_name = "N")]
    pub stats: Option<u64>,

    /// Emit metrics as JSON instead of the human-readable banner.
    #[clap(long)]
    pub json: bool,

    /// Print every decision step after the replay.
    #[clap(long)]
    pub trace: bool,

    /// Increase verbosity (-v: debug, -vv: trace).
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

pub fn run(opts: Opts) -> Result<()> {
    let scenario = match &opts.scenario {
        Some(path) => Scenario::load(path)?,
        None => Scenario::demo(),
    };

    info!(
        "replaying scenario '{}': {} cpus, {} tasks, {} wakeups",
        scenario.name,
        scenario.cpus.len(),
        scenario.tasks.len(),
        scenario.wakeups.len()
    );

    let replay = match opts.stats {
        Some(interval) => {
            let mut monitor = stats::Monitor::new(interval);
            sim::replay_monitored(&scenario, &mut monitor, &mut std::io::stdout())?
        }
        None => sim::replay(&scenario)?,
    };

    if opts.trace {
        for step in &replay.steps {
            println!(
                "pid {:>6} woke on cpu {:>3} -> cpu {:>3}",
                step.pid, step.this_cpu, step.chosen
            );
        }
    }

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&replay.metrics)?);
    } else {
        replay.metrics.format(&mut std::io::stdout())?;
    }

    Ok(())
}
