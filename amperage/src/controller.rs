//! Hotplug policy controller
//!
//! Reacts to suspend and resume notifications by taking one tunable snapshot,
//! planning the pass with [`crate::policy`] and issuing core transitions one
//! at a time in plan order. A failed transition is logged and the pass moves
//! on to the next core.

use crate::platform::Platform;
use crate::policy::{self, CoreView, ResumeStrategy};
use crate::tunables::TunableStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Suspend/resume capability invoked by the platform notifier
pub trait PowerStateHandler {
    fn on_suspend(&mut self);
    fn on_resume(&mut self);
}

/// Device power state as seen by the controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    #[default]
    Resumed,
    Suspended,
}

/// Power transition delivered by the notifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerEvent {
    Suspend,
    Resume,
}

impl PowerEvent {
    /// State the device is in once this event has been handled
    pub fn target_state(&self) -> PowerState {
        match self {
            Self::Suspend => PowerState::Suspended,
            Self::Resume => PowerState::Resumed,
        }
    }
}

impl fmt::Display for PowerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Suspend => write!(f, "suspend"),
            Self::Resume => write!(f, "resume"),
        }
    }
}

/// Outcome of one suspend or resume pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassSummary {
    pub event: PowerEvent,
    /// Cores a transition was requested for, in request order
    pub attempted: Vec<usize>,
    /// Cores whose transition failed
    pub failed: Vec<usize>,
    /// Resume strategy applied (resume passes only)
    pub strategy: Option<ResumeStrategy>,
    /// Cores online once the pass finished
    pub online_after: usize,
    pub finished_at: DateTime<Utc>,
}

impl PassSummary {
    pub fn succeeded(&self) -> usize {
        self.attempted.len() - self.failed.len()
    }
}

/// Hotplug policy controller
pub struct HotplugController<P: Platform> {
    platform: P,
    tunables: Arc<TunableStore>,
    state: PowerState,
    last_pass: Option<PassSummary>,
}

impl<P: Platform> HotplugController<P> {
    /// Create a controller in the resumed state
    pub fn new(platform: P, tunables: Arc<TunableStore>) -> Self {
        Self {
            platform,
            tunables,
            state: PowerState::Resumed,
            last_pass: None,
        }
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn tunables(&self) -> &Arc<TunableStore> {
        &self.tunables
    }

    /// Summary of the most recent pass
    pub fn last_pass(&self) -> Option<&PassSummary> {
        self.last_pass.as_ref()
    }

    /// Dispatch `event`, returning whether a pass ran
    ///
    /// An event matching the current state is a duplicate and is ignored.
    pub fn handle(&mut self, event: PowerEvent) -> bool {
        if self.state == event.target_state() {
            debug!("Ignoring duplicate {} notification", event);
            return false;
        }

        let summary = match event {
            PowerEvent::Suspend => self.suspend_pass(),
            PowerEvent::Resume => self.resume_pass(),
        };
        self.state = event.target_state();

        info!(
            "{} pass complete: {}/{} transitions applied, {} cores online",
            event,
            summary.succeeded(),
            summary.attempted.len(),
            summary.online_after
        );
        self.last_pass = Some(summary);
        true
    }

    fn suspend_pass(&mut self) -> PassSummary {
        let cores = self.observe(false);
        let plan = policy::plan_suspend(&cores);

        let failed = self.apply(&plan, false, true);
        self.summarize(PowerEvent::Suspend, plan, failed, None)
    }

    fn resume_pass(&mut self) -> PassSummary {
        let total = self.platform.total_cores();
        if total < 2 {
            warn!("{} cores reported, no cores to restore", total);
            return self.summarize(PowerEvent::Resume, Vec::new(), Vec::new(), None);
        }

        let snapshot = self.tunables.snapshot();
        let (strategy, min_online) = match policy::resume_strategy(&snapshot, total) {
            Ok(strategy) => (strategy, snapshot.min_cores_online),
            Err(e) => {
                warn!("{}; restoring all cores", e);
                (ResumeStrategy::fallback(total), 1)
            }
        };
        debug!("Resuming with {}", strategy);

        let needs_frequency = matches!(strategy, ResumeStrategy::Threshold { .. });
        let cores = self.observe(needs_frequency);
        let plan = policy::plan_resume(&cores, strategy, min_online);

        let failed = self.apply(&plan, true, false);
        self.summarize(PowerEvent::Resume, plan, failed, Some(strategy))
    }

    /// Read every core's state, sampling offline cores' frequency on request
    fn observe(&self, with_frequency: bool) -> Vec<CoreView> {
        (0..self.platform.total_cores())
            .map(|index| {
                let online = self.platform.is_core_online(index);
                let frequency = if with_frequency && !online && index != 0 {
                    self.platform.current_frequency(index)
                } else {
                    0
                };
                CoreView {
                    index,
                    online,
                    frequency,
                }
            })
            .collect()
    }

    /// Issue transitions in plan order, returning the cores that failed
    fn apply(&self, plan: &[usize], online: bool, sample_first: bool) -> Vec<usize> {
        let mut failed = Vec::new();

        for &core in plan {
            if sample_first {
                // Recorded by the frequency source as the core's last-known value
                let frequency = self.platform.current_frequency(core);
                debug!("cpu{} at {} Hz before offline", core, frequency);
            }

            match self.platform.set_core_online(core, online) {
                Ok(()) => debug!("cpu{} {}", core, if online { "online" } else { "offline" }),
                Err(e) => {
                    warn!("{}", e);
                    failed.push(core);
                }
            }
        }

        failed
    }

    fn summarize(
        &self,
        event: PowerEvent,
        attempted: Vec<usize>,
        failed: Vec<usize>,
        strategy: Option<ResumeStrategy>,
    ) -> PassSummary {
        let online_after = (0..self.platform.total_cores())
            .filter(|&core| self.platform.is_core_online(core))
            .count();

        PassSummary {
            event,
            attempted,
            failed,
            strategy,
            online_after,
            finished_at: Utc::now(),
        }
    }
}

impl<P: Platform> PowerStateHandler for HotplugController<P> {
    fn on_suspend(&mut self) {
        self.handle(PowerEvent::Suspend);
    }

    fn on_resume(&mut self) {
        self.handle(PowerEvent::Resume);
    }
}
