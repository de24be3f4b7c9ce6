// SPDX-License-Identifier: GPL-2.0
//
// scx_cass: capacity-aware wakeup CPU selection

use bitvec::prelude::*;
use serde::Deserialize;
use serde::Serialize;

/// Upper bound on CPU ids accepted from scenario files and CLI lists.
pub const MAX_CPUS: usize = 1024;

/// A set of CPU ids. Used for a task's allowed set and for the system's
/// active (online) set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cpumask {
    mask: BitVec<u64, Lsb0>,
}

impl Cpumask {
    pub fn new(nr_cpus: usize) -> Self {
        Self {
            mask: bitvec![u64, Lsb0; 0; nr_cpus],
        }
    }

    /// All CPUs in 0..nr_cpus set.
    pub fn full(nr_cpus: usize) -> Self {
        Self {
            mask: bitvec![u64, Lsb0; 1; nr_cpus],
        }
    }

    pub fn from_cpus(cpus: &[u32], nr_cpus: usize) -> Self {
        let mut m = Self::new(nr_cpus);
        for &cpu in cpus {
            m.set_cpu(cpu);
        }
        m
    }

    pub fn len(&self) -> usize {
        self.mask.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mask.not_any()
    }

    pub fn set_cpu(&mut self, cpu: u32) {
        let idx = cpu as usize;
        if idx >= self.mask.len() {
            self.mask.resize(idx + 1, false);
        }
        self.mask.set(idx, true);
    }

    pub fn clear_cpu(&mut self, cpu: u32) {
        let idx = cpu as usize;
        if idx < self.mask.len() {
            self.mask.set(idx, false);
        }
    }

    pub fn test_cpu(&self, cpu: u32) -> bool {
        self.mask
            .get(cpu as usize)
            .map(|b| *b)
            .unwrap_or(false)
    }

    /// Lowest set CPU id, if any.
    pub fn first(&self) -> Option<u32> {
        self.mask.first_one().map(|idx| idx as u32)
    }

    pub fn intersects(&self, other: &Cpumask) -> bool {
        self.iter().any(|cpu| other.test_cpu(cpu))
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.mask.iter_ones().map(|idx| idx as u32)
    }

    pub fn weight(&self) -> usize {
        self.mask.count_ones()
    }
}

/// Parse a comma-separated CPU list with ranges, e.g. "0-3,6,12-15".
pub fn parse_cpu_list(optarg: &str) -> Result<Vec<u32>, String> {
    let mut cpus = Vec::new();
    let mut seen = std::collections::HashSet::new();

    if optarg
        .chars()
        .any(|c| !c.is_ascii_digit() && c != '-' && c != ',' && !c.is_whitespace())
    {
        return Err("Invalid character in CPU list".to_string());
    }

    for token in optarg.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        if let Some((start_str, end_str)) = token.split_once('-') {
            let start = start_str
                .trim()
                .parse::<u32>()
                .map_err(|_| "Invalid range start".to_string())?;
            let end = end_str
                .trim()
                .parse::<u32>()
                .map_err(|_| "Invalid range end".to_string())?;
            if start > end {
                return Err(format!("Invalid CPU range: {}-{}", start, end));
            }
            for i in start..=end {
                if cpus.len() >= MAX_CPUS {
                    return Err(format!("Too many CPUs specified (max {})", MAX_CPUS));
                }
                if seen.insert(i) {
                    cpus.push(i);
                }
            }
        } else {
            let cpu = token
                .parse::<u32>()
                .map_err(|_| format!("Invalid CPU: {}", token))?;
            if cpus.len() >= MAX_CPUS {
                return Err(format!("Too many CPUs specified (max {})", MAX_CPUS));
            }
            if seen.insert(cpu) {
                cpus.push(cpu);
            }
        }
    }

    Ok(cpus)
}
