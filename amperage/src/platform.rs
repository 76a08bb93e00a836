//! Platform services consumed by the controller
//!
//! [`CoreControl`] moves cores between online and offline, [`FrequencySource`]
//! reports per-core frequency. [`SysfsCpus`](crate::sysfs::SysfsCpus) backs
//! both on Linux; [`SimulatedCpus`] is an in-memory platform for dry runs and
//! tests.

use crate::error::{HotplugError, Result};
use crate::tunables::Hz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Core power-state primitive
pub trait CoreControl: Send + Sync {
    /// Number of cores present, core 0 included
    fn total_cores(&self) -> usize;

    /// Whether `core` currently participates in scheduling
    fn is_core_online(&self, core: usize) -> bool;

    /// Transition `core` online or offline
    fn set_core_online(&self, core: usize, online: bool) -> Result<()>;
}

/// Per-core frequency reporting
pub trait FrequencySource: Send + Sync {
    /// Current (or last-known, for offline cores) frequency of `core`
    fn current_frequency(&self, core: usize) -> Hz;
}

/// Everything the controller needs from the platform
pub trait Platform: CoreControl + FrequencySource {}

impl<T: CoreControl + FrequencySource> Platform for T {}

/// Snapshot of one core, as reported over IPC
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreInfo {
    pub index: usize,
    pub online: bool,
    pub frequency: Hz,
    pub managed: bool,
}

/// Read every core's state from `platform`
pub fn describe_cores<P: Platform + ?Sized>(platform: &P) -> Vec<CoreInfo> {
    (0..platform.total_cores())
        .map(|index| CoreInfo {
            index,
            online: platform.is_core_online(index),
            frequency: platform.current_frequency(index),
            managed: index != 0,
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct SimCore {
    online: bool,
    frequency: Hz,
}

#[derive(Debug, Default)]
struct SimState {
    cores: Vec<SimCore>,
    failing: BTreeSet<usize>,
    transitions: Vec<(usize, bool)>,
}

/// In-memory platform
///
/// Every core starts online. Each transition request, successful or not, is
/// appended to a log so callers can inspect ordering.
#[derive(Debug, Default)]
pub struct SimulatedCpus {
    state: Mutex<SimState>,
}

impl SimulatedCpus {
    /// Create `total` online cores reporting 0 Hz
    pub fn new(total: usize) -> Self {
        let cores = vec![
            SimCore {
                online: true,
                frequency: 0,
            };
            total
        ];
        Self {
            state: Mutex::new(SimState {
                cores,
                ..Default::default()
            }),
        }
    }

    /// Set the reported frequency of `core`
    pub fn set_frequency(&self, core: usize, frequency: Hz) {
        if let Some(c) = self.lock().cores.get_mut(core) {
            c.frequency = frequency;
        }
    }

    /// Force `core` into a state without logging a transition
    pub fn force_online(&self, core: usize, online: bool) {
        if let Some(c) = self.lock().cores.get_mut(core) {
            c.online = online;
        }
    }

    /// Make every transition request for `core` fail
    pub fn fail_core(&self, core: usize) {
        self.lock().failing.insert(core);
    }

    /// Stop failing transitions for `core`
    pub fn heal_core(&self, core: usize) {
        self.lock().failing.remove(&core);
    }

    /// Transition requests received so far, in order
    pub fn transitions(&self) -> Vec<(usize, bool)> {
        self.lock().transitions.clone()
    }

    pub fn clear_transitions(&self) {
        self.lock().transitions.clear();
    }

    /// Indices of online cores, ascending
    pub fn online_cores(&self) -> Vec<usize> {
        self.lock()
            .cores
            .iter()
            .enumerate()
            .filter(|(_, c)| c.online)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn online_count(&self) -> usize {
        self.online_cores().len()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CoreControl for SimulatedCpus {
    fn total_cores(&self) -> usize {
        self.lock().cores.len()
    }

    fn is_core_online(&self, core: usize) -> bool {
        self.lock().cores.get(core).map(|c| c.online).unwrap_or(false)
    }

    fn set_core_online(&self, core: usize, online: bool) -> Result<()> {
        let mut state = self.lock();
        state.transitions.push((core, online));

        if state.failing.contains(&core) {
            return Err(HotplugError::transition(core, online, "simulated failure"));
        }
        if core == 0 && !online {
            return Err(HotplugError::transition(core, online, "boot cpu cannot go offline"));
        }

        match state.cores.get_mut(core) {
            Some(c) => {
                c.online = online;
                Ok(())
            }
            None => Err(HotplugError::transition(core, online, "no such cpu")),
        }
    }
}

impl FrequencySource for SimulatedCpus {
    fn current_frequency(&self, core: usize) -> Hz {
        self.lock().cores.get(core).map(|c| c.frequency).unwrap_or(0)
    }
}
