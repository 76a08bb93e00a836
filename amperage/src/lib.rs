//! Amperage - CPU hotplug policy for DaemonOS
//!
//! Takes managed cores offline when the device suspends and restores them on
//! resume, either fully, by percentage, or by last-known frequency.
//!
//! - [`tunables`]: validated, runtime-tunable parameters
//! - [`policy`]: pure core selection
//! - [`controller`]: suspend/resume state machine applying the policy
//! - [`platform`] and [`sysfs`]: core control and frequency backends
//! - [`ipc`], [`service`], [`watcher`]: daemon plumbing

pub mod config;
pub mod controller;
pub mod error;
pub mod ipc;
pub mod platform;
pub mod policy;
pub mod service;
pub mod sysfs;
pub mod tunables;
pub mod watcher;

pub use controller::{HotplugController, PassSummary, PowerEvent, PowerState, PowerStateHandler};
pub use error::{HotplugError, Result};
pub use platform::{CoreControl, FrequencySource, Platform, SimulatedCpus};
pub use sysfs::SysfsCpus;
pub use tunables::{Hz, RestoreMode, TunableStore, Tunables};
