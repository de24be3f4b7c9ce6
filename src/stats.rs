// SPDX-License-Identifier: GPL-2.0
//
// scx_cass: capacity-aware wakeup CPU selection

use std::io::Write;

use anyhow::Result;
use chrono::Local;
use serde::Deserialize;
use serde::Serialize;

use crate::select::Decision;

/// Decision counters accumulated over a replay run.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Metrics {
    /// Wakeups dispatched
    pub wakeups: u64,
    /// Exec-continuation fast path hits
    pub exec_fast: u64,
    /// Affinity/hotplug fallbacks (allowed ∩ active empty)
    pub affinity_fallback: u64,
    /// Every core filtered out, first allowed adopted
    pub no_candidate: u64,
    /// Chosen core was idle or a sync single-runner
    pub idle_pick: u64,
    /// Sync wakeups kept on the calling core
    pub sync_local: u64,
    /// Task stayed on its previous core
    pub stay_prev: u64,
    /// Task moved off its previous core
    pub migrations: u64,
    /// Cores skipped: too small for a forced-big task
    pub skip_not_big: u64,
    /// Cores skipped: busy once an idle best existed
    pub skip_busy: u64,
    /// Cores skipped: projected overload
    pub skip_overload: u64,
    /// Cores skipped: outside the load spread bound
    pub skip_spread: u64,
}

impl Metrics {
    /// Fold one decision into the counters.
    pub fn record(&mut self, dec: &Decision, prev_cpu: u32, this_cpu: u32) {
        self.wakeups += 1;
        if dec.exec_fast {
            self.exec_fast += 1;
        }
        if dec.affinity_fallback {
            self.affinity_fallback += 1;
        }
        if dec.no_candidate {
            self.no_candidate += 1;
        }
        if dec.idle_pick {
            self.idle_pick += 1;
        }
        if dec.sync && dec.cpu == this_cpu {
            self.sync_local += 1;
        }
        if dec.cpu == prev_cpu {
            self.stay_prev += 1;
        } else {
            self.migrations += 1;
        }
        self.skip_not_big += dec.skips.not_big;
        self.skip_busy += dec.skips.busy_after_idle;
        self.skip_overload += dec.skips.overloaded;
        self.skip_spread += dec.skips.spread;
    }

    pub fn format<W: Write>(&self, w: &mut W) -> Result<()> {
        let mig_pct = if self.wakeups > 0 {
            (self.migrations as f64) * 100.0 / (self.wakeups as f64)
        } else {
            0.0
        };

        let now = Local::now();
        writeln!(w, "┌─ {} {} ─", crate::SCHEDULER_NAME, now.format("%H:%M:%S"))?;
        writeln!(
            w,
            "│ wake {:>7}  exec {:>5}  afffb {:>4}  nocand {:>4}",
            self.wakeups, self.exec_fast, self.affinity_fallback, self.no_candidate
        )?;
        writeln!(
            w,
            "│ idle {:>7}  sync {:>5}  stay {:>6}  mig {:>6} ({:>4.1}%)",
            self.idle_pick, self.sync_local, self.stay_prev, self.migrations, mig_pct
        )?;
        writeln!(
            w,
            "│ skip: big {:>6}  busy {:>6}  over {:>6}  spread {:>6}",
            self.skip_not_big, self.skip_busy, self.skip_overload, self.skip_spread
        )?;
        writeln!(w, "└─")?;
        Ok(())
    }

    /// Interval delta against a previous sample.
    pub fn delta(&self, prev: &Self) -> Self {
        Self {
            wakeups: self.wakeups.saturating_sub(prev.wakeups),
            exec_fast: self.exec_fast.saturating_sub(prev.exec_fast),
            affinity_fallback: self.affinity_fallback.saturating_sub(prev.affinity_fallback),
            no_candidate: self.no_candidate.saturating_sub(prev.no_candidate),
            idle_pick: self.idle_pick.saturating_sub(prev.idle_pick),
            sync_local: self.sync_local.saturating_sub(prev.sync_local),
            stay_prev: self.stay_prev.saturating_sub(prev.stay_prev),
            migrations: self.migrations.saturating_sub(prev.migrations),
            skip_not_big: self.skip_not_big.saturating_sub(prev.skip_not_big),
            skip_busy: self.skip_busy.saturating_sub(prev.skip_busy),
            skip_overload: self.skip_overload.saturating_sub(prev.skip_overload),
            skip_spread: self.skip_spread.saturating_sub(prev.skip_spread),
        }
    }
}

/// Interval reporter over a metrics stream: once `interval` wakeups
/// have accumulated since the previous sample, prints the delta banner
/// and re-baselines. The replay analogue of a timer-driven stats
/// monitor thread.
pub struct Monitor {
    interval: u64,
    last: Metrics,
}

impl Monitor {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            last: Metrics::default(),
        }
    }

    pub fn tick<W: Write>(&mut self, cur: &Metrics, w: &mut W) -> Result<()> {
        if cur.wakeups.saturating_sub(self.last.wakeups) < self.interval {
            return Ok(());
        }
        cur.delta(&self.last).format(w)?;
        self.last = cur.clone();
        Ok(())
    }
}
