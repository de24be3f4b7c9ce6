// SPDX-License-Identifier: GPL-2.0
//
// scx_cass: capacity-aware wakeup CPU selection
//
// Replay scenarios: a frozen system description plus an ordered wakeup
// list, loaded from JSON. Everything is deterministic by construction.

use std::path::Path;

use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

use crate::cpumask::{parse_cpu_list, Cpumask};
use crate::load::{CpuLoad, SystemLoad};
use crate::task::{TaskClass, WakeTask};

fn default_cap() -> u64 {
    1024
}

fn default_true() -> bool {
    true
}

/// What a core is doing when the replay starts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CpuState {
    /// Hardware-idle in a state with the given exit latency.
    Idle { exit_latency: u64 },
    /// Running `nr_running` tasks; the on-CPU task has the given
    /// utilization and class.
    Busy {
        nr_running: u32,
        waker_util: u64,
        #[serde(default = "default_true")]
        waker_is_fair: bool,
    },
    /// Running only SCHED_IDLE-class work.
    SchedIdle,
}

impl Default for CpuState {
    fn default() -> Self {
        CpuState::Idle { exit_latency: 0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuSpec {
    pub cap_orig: u64,
    /// Thermally derated sustainable capacity; defaults to cap_orig.
    pub cap_max: Option<u64>,
    /// Capacity at the current operating frequency; defaults to
    /// cap_orig (or cap_max under a pinned governor).
    pub freq_capacity: Option<u64>,
    pub cache_domain: u32,
    pub util_avg: u64,
    pub util_est: Option<u64>,
    pub util_rt: u64,
    pub util_dl: u64,
    pub util_irq: u64,
    pub state: CpuState,
    pub active: bool,
}

impl Default for CpuSpec {
    fn default() -> Self {
        Self {
            cap_orig: default_cap(),
            cap_max: None,
            freq_capacity: None,
            cache_domain: 0,
            util_avg: 0,
            util_est: None,
            util_rt: 0,
            util_dl: 0,
            util_irq: 0,
            state: CpuState::default(),
            active: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskClassSpec {
    Fair,
    Rt,
}

impl From<TaskClassSpec> for TaskClass {
    fn from(c: TaskClassSpec) -> Self {
        match c {
            TaskClassSpec::Fair => TaskClass::Fair,
            TaskClassSpec::Rt => TaskClass::RealTime,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub pid: i32,
    pub util: u64,
    #[serde(default)]
    pub uclamp_min: u64,
    #[serde(default = "TaskSpec::default_class")]
    pub class: TaskClassSpec,
    /// CPU list string ("0-3,6"); all CPUs when absent.
    #[serde(default)]
    pub allowed: Option<String>,
    #[serde(default)]
    pub start_cpu: u32,
}

impl TaskSpec {
    fn default_class() -> TaskClassSpec {
        TaskClassSpec::Fair
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WakeupSpec {
    pub pid: i32,
    /// Core the wakeup executes on.
    pub this_cpu: u32,
    pub sync: bool,
    pub fork: bool,
    pub exec: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    /// Frequency-pinning governor: every core reads its max frequency.
    #[serde(default)]
    pub pin_max_freq: bool,
    pub cpus: Vec<CpuSpec>,
    pub tasks: Vec<TaskSpec>,
    pub wakeups: Vec<WakeupSpec>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        let scenario: Scenario = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse scenario {}", path.display()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cpus.is_empty() {
            anyhow::bail!("scenario has no CPUs");
        }
        for (idx, c) in self.cpus.iter().enumerate() {
            if c.cap_orig == 0 || c.cap_max == Some(0) {
                anyhow::bail!("CPU {} has zero capacity", idx);
            }
        }
        let nr = self.cpus.len() as u32;
        for t in &self.tasks {
            if t.start_cpu >= nr {
                anyhow::bail!("task {} starts on unknown CPU {}", t.pid, t.start_cpu);
            }
            if let Some(list) = &t.allowed {
                let cpus = parse_cpu_list(list)
                    .map_err(|e| anyhow::anyhow!("task {}: {}", t.pid, e))?;
                if cpus.is_empty() {
                    anyhow::bail!("task {} allows no CPUs", t.pid);
                }
                if let Some(&cpu) = cpus.iter().find(|&&c| c >= nr) {
                    anyhow::bail!("task {} allows unknown CPU {}", t.pid, cpu);
                }
            }
        }
        for w in &self.wakeups {
            if w.this_cpu >= nr {
                anyhow::bail!("wakeup of {} on unknown CPU {}", w.pid, w.this_cpu);
            }
            if !self.tasks.iter().any(|t| t.pid == w.pid) {
                anyhow::bail!("wakeup references unknown task {}", w.pid);
            }
        }
        Ok(())
    }

    /// Materialize the per-core load table.
    pub fn build_system(&self) -> SystemLoad {
        let cpus = self
            .cpus
            .iter()
            .map(|spec| CpuLoad::new(spec.cap_orig, spec.cache_domain))
            .collect();
        let mut sys = SystemLoad::new(cpus);
        sys.set_pin_max_freq(self.pin_max_freq);

        let mut active = Cpumask::new(self.cpus.len());
        for (idx, spec) in self.cpus.iter().enumerate() {
            let cpu = idx as u32;
            if spec.active {
                active.set_cpu(cpu);
            }
            sys.set_cap_max(cpu, spec.cap_max.unwrap_or(spec.cap_orig));
            sys.set_freq_capacity(cpu, spec.freq_capacity.unwrap_or(spec.cap_orig));
            sys.set_util_avg(cpu, spec.util_avg);
            sys.set_util_est(cpu, spec.util_est);
            sys.set_hard_util(cpu, spec.util_rt, spec.util_dl, spec.util_irq);
            match spec.state {
                CpuState::Idle { exit_latency } => sys.set_idle(cpu, exit_latency),
                CpuState::Busy {
                    nr_running,
                    waker_util,
                    waker_is_fair,
                } => sys.set_running(cpu, nr_running, waker_util, waker_is_fair),
                CpuState::SchedIdle => {
                    sys.set_running(cpu, 1, 0, true);
                    sys.set_sched_idle(cpu, true);
                }
            }
        }
        sys.set_active(active);
        sys
    }

    /// Materialize the waking-task views.
    pub fn build_tasks(&self) -> Result<Vec<WakeTask>> {
        let nr = self.cpus.len();
        self.tasks
            .iter()
            .map(|spec| {
                let allowed = match &spec.allowed {
                    Some(list) => {
                        let cpus = parse_cpu_list(list)
                            .map_err(|e| anyhow::anyhow!("task {}: {}", spec.pid, e))?;
                        Cpumask::from_cpus(&cpus, nr)
                    }
                    None => Cpumask::full(nr),
                };
                Ok(WakeTask {
                    pid: spec.pid,
                    prev_cpu: spec.start_cpu,
                    cur_cpu: spec.start_cpu,
                    allowed,
                    util: spec.util,
                    uclamp_min: spec.uclamp_min,
                    class: spec.class.into(),
                })
            })
            .collect()
    }

    /// Built-in demo: a 4+4 big.LITTLE system with a mixed wakeup run.
    pub fn demo() -> Self {
        let little = |util_avg| CpuSpec {
            cap_orig: 512,
            cache_domain: 0,
            util_avg,
            state: CpuState::Busy {
                nr_running: 2,
                waker_util: 40,
                waker_is_fair: true,
            },
            ..CpuSpec::default()
        };
        let big = |util_avg, exit_latency| CpuSpec {
            cap_orig: 1024,
            cache_domain: 1,
            util_avg,
            state: CpuState::Idle { exit_latency },
            ..CpuSpec::default()
        };

        let tasks = vec![
            TaskSpec {
                pid: 100,
                util: 80,
                uclamp_min: 0,
                class: TaskClassSpec::Fair,
                allowed: None,
                start_cpu: 0,
            },
            TaskSpec {
                pid: 101,
                util: 600,
                uclamp_min: 0,
                class: TaskClassSpec::Fair,
                allowed: None,
                start_cpu: 4,
            },
            TaskSpec {
                pid: 102,
                util: 50,
                uclamp_min: 0,
                class: TaskClassSpec::Rt,
                allowed: Some("0-3".to_string()),
                start_cpu: 1,
            },
        ];

        let wakeups = (0..30)
            .map(|i| WakeupSpec {
                pid: 100 + (i % 3),
                this_cpu: (i as u32) % 8,
                sync: i % 5 == 0,
                fork: false,
                exec: i % 11 == 0 && i > 0,
            })
            .collect();

        Scenario {
            name: "demo".to_string(),
            pin_max_freq: false,
            cpus: vec![
                little(120),
                little(200),
                little(80),
                little(300),
                big(0, 1),
                big(0, 3),
                big(0, 10),
                big(0, 10),
            ],
            tasks,
            wakeups,
        }
    }
}
