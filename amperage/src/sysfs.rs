//! Linux sysfs CPU hotplug and cpufreq backend

use crate::error::{HotplugError, Result};
use crate::platform::{CoreControl, FrequencySource};
use crate::tunables::Hz;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Default CPU sysfs root
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/devices/system/cpu";

/// CPU cores exposed under `/sys/devices/system/cpu`
#[derive(Debug)]
pub struct SysfsCpus {
    root: PathBuf,
    total_cores: usize,
    last_known: Mutex<HashMap<usize, Hz>>,
}

impl SysfsCpus {
    /// Discover the CPU tree rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            return Err(HotplugError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("cpu sysfs root not found: {}", root.display()),
            )));
        }

        // `present` lists the cores that exist; `possible` may include
        // hot-addable slots with no cpuN directory behind them
        let listed = ["present", "possible"]
            .iter()
            .find_map(|name| read_sysfs_string(&root.join(name)));
        let total_cores = match listed {
            Some(list) => {
                let span = cpu_list_span(&list)?;
                let total = count_cpu_dirs(&root, span);
                if total < span {
                    warn!(
                        "cpu list covers {} cpus but only cpu0..cpu{} exist under {}",
                        span,
                        total.saturating_sub(1),
                        root.display()
                    );
                }
                total
            }
            None => count_cpu_dirs(&root, MAX_CPUS),
        };
        if total_cores == 0 {
            warn!("No cpu directories found under {}", root.display());
        }

        debug!("Found {} cpus under {}", total_cores, root.display());

        Ok(Self {
            root,
            total_cores,
            last_known: Mutex::new(HashMap::new()),
        })
    }

    fn cpu_dir(&self, core: usize) -> PathBuf {
        self.root.join(format!("cpu{}", core))
    }
}

impl CoreControl for SysfsCpus {
    fn total_cores(&self) -> usize {
        self.total_cores
    }

    fn is_core_online(&self, core: usize) -> bool {
        let dir = self.cpu_dir(core);
        match read_sysfs_int(&dir.join("online")) {
            Some(value) => value == 1,
            // Cores without an online node cannot be hotplugged at all
            None => dir.exists(),
        }
    }

    fn set_core_online(&self, core: usize, online: bool) -> Result<()> {
        let online_path = self.cpu_dir(core).join("online");
        if !online_path.exists() {
            return Err(HotplugError::transition(core, online, "cpu is not hotpluggable"));
        }

        let value = if online { "1" } else { "0" };
        debug!("Writing {} to {}", value, online_path.display());
        fs::write(&online_path, value).map_err(|e| HotplugError::transition(core, online, e))
    }
}

impl FrequencySource for SysfsCpus {
    fn current_frequency(&self, core: usize) -> Hz {
        let freq_path = self.cpu_dir(core).join("cpufreq/scaling_cur_freq");
        let mut last_known = self.last_known.lock().unwrap_or_else(PoisonError::into_inner);

        match read_sysfs_u64(&freq_path) {
            Some(khz) => {
                let hz = khz.saturating_mul(1000);
                last_known.insert(core, hz);
                hz
            }
            None => last_known.get(&core).copied().unwrap_or(0),
        }
    }
}

/// Upper bound on cpu indices accepted from sysfs (the kernel's largest NR_CPUS)
pub const MAX_CPUS: usize = 8192;

/// Highest cpu index in a kernel cpu list such as `0-3,6,8-9`, plus one
pub fn cpu_list_span(list: &str) -> Result<usize> {
    Ok(cpu_ranges(list)?
        .into_iter()
        .map(|(_, end)| end + 1)
        .max()
        .unwrap_or(0))
}

fn cpu_ranges(list: &str) -> Result<Vec<(usize, usize)>> {
    let list = list.trim();
    if list.is_empty() {
        return Ok(Vec::new());
    }

    let mut ranges = Vec::new();
    for part in list.split(',') {
        let part = part.trim();
        let parse = |s: &str| {
            s.parse::<usize>()
                .map_err(|_| HotplugError::Parse(format!("invalid cpu list entry: {}", part)))
        };

        let (start, end) = match part.split_once('-') {
            Some((start, end)) => (parse(start)?, parse(end)?),
            None => {
                let cpu = parse(part)?;
                (cpu, cpu)
            }
        };
        if start > end {
            return Err(HotplugError::Parse(format!("invalid cpu range: {}", part)));
        }
        if end >= MAX_CPUS {
            return Err(HotplugError::Parse(format!(
                "cpu index {} exceeds limit of {}",
                end, MAX_CPUS
            )));
        }
        ranges.push((start, end));
    }

    Ok(ranges)
}

/// Count `cpu0`, `cpu1`, ... up to the first missing directory
fn count_cpu_dirs(root: &Path, limit: usize) -> usize {
    (0..limit)
        .take_while(|core| root.join(format!("cpu{}", core)).is_dir())
        .count()
}

// Helper functions for reading sysfs values
fn read_sysfs_string(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok()
}

fn read_sysfs_int(path: &Path) -> Option<i32> {
    read_sysfs_string(path)?.trim().parse().ok()
}

fn read_sysfs_u64(path: &Path) -> Option<u64> {
    read_sysfs_string(path)?.trim().parse().ok()
}
