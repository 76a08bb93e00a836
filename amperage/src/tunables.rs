//! Runtime-tunable hotplug parameters
//!
//! The tunables are shared between the controller (reader) and the tuning
//! interface (writer). Readers always take a full [`Tunables`] snapshot under a
//! single read lock; writers validate a complete candidate before committing,
//! so a half-applied update is never visible.

use crate::error::{HotplugError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};
use tracing::info;

/// Frequency in Hz
pub type Hz = u64;

/// Default plugging threshold (1.497 GHz)
pub const DEFAULT_PLUGGING_THRESHOLD: Hz = 1_497_000_000;

/// Names accepted by [`TunableStore::set_by_name`]
pub const TUNABLE_NAMES: [&str; 6] = [
    "min_cores_online",
    "max_cores_online",
    "plug_percent",
    "plugging_threshold",
    "powersave_enabled",
    "restore_mode",
];

/// How cores are brought back on resume
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreMode {
    /// Online managed cores in index order up to the target count
    #[default]
    FullRestore,
    /// Online only cores whose last-known frequency clears the threshold
    ThresholdRestore,
}

impl fmt::Display for RestoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullRestore => write!(f, "full_restore"),
            Self::ThresholdRestore => write!(f, "threshold_restore"),
        }
    }
}

impl FromStr for RestoreMode {
    type Err = HotplugError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "full" | "full_restore" => Ok(Self::FullRestore),
            "threshold" | "threshold_restore" => Ok(Self::ThresholdRestore),
            other => Err(HotplugError::Parse(format!("unknown restore mode: {}", other))),
        }
    }
}

/// A consistent view of every tunable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tunables {
    /// Floor on cores kept online (core 0 included)
    pub min_cores_online: usize,
    /// Ceiling on cores onlined (core 0 included)
    pub max_cores_online: usize,
    /// Share of managed cores eligible to be plugged under powersave
    pub plug_percent: u8,
    /// Frequency a core must reach to be a plug candidate
    pub plugging_threshold: Hz,
    /// Gate for percentage and threshold driven behaviour
    pub powersave_enabled: bool,
    /// Resume strategy
    pub restore_mode: RestoreMode,
}

impl Tunables {
    /// Defaults for a platform with `total_cores` cores
    pub fn defaults_for(total_cores: usize) -> Self {
        Self {
            min_cores_online: 1,
            max_cores_online: total_cores.max(1),
            plug_percent: 100,
            plugging_threshold: DEFAULT_PLUGGING_THRESHOLD,
            powersave_enabled: false,
            restore_mode: RestoreMode::FullRestore,
        }
    }

    /// Check every invariant against a platform with `total_cores` cores
    pub fn validate(&self, total_cores: usize) -> Result<()> {
        if self.min_cores_online < 1 {
            return Err(HotplugError::Validation(
                "min_cores_online must be at least 1".into(),
            ));
        }
        if self.min_cores_online > self.max_cores_online {
            return Err(HotplugError::Validation(format!(
                "min_cores_online ({}) exceeds max_cores_online ({})",
                self.min_cores_online, self.max_cores_online
            )));
        }
        if self.max_cores_online > total_cores {
            return Err(HotplugError::Validation(format!(
                "max_cores_online ({}) exceeds total cores ({})",
                self.max_cores_online, total_cores
            )));
        }
        if self.plug_percent > 100 {
            return Err(HotplugError::Validation(format!(
                "plug_percent ({}) must be within 0-100",
                self.plug_percent
            )));
        }
        if self.powersave_enabled && self.plug_percent == 0 {
            return Err(HotplugError::Validation(
                "plug_percent must be greater than 0 while powersave is enabled".into(),
            ));
        }
        Ok(())
    }
}

/// Shared, validated tunable storage
#[derive(Debug)]
pub struct TunableStore {
    total_cores: usize,
    inner: RwLock<Tunables>,
}

impl TunableStore {
    /// Create a store seeded with `initial`, rejecting invalid values
    pub fn new(total_cores: usize, initial: Tunables) -> Result<Self> {
        initial.validate(total_cores)?;
        Ok(Self {
            total_cores,
            inner: RwLock::new(initial),
        })
    }

    /// Create a store holding the defaults for `total_cores`
    pub fn with_defaults(total_cores: usize) -> Self {
        Self {
            total_cores,
            inner: RwLock::new(Tunables::defaults_for(total_cores)),
        }
    }

    /// Total cores the store validates against
    pub fn total_cores(&self) -> usize {
        self.total_cores
    }

    /// Copy out every tunable under one read lock
    pub fn snapshot(&self) -> Tunables {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_min_cores_online(&self, value: usize) -> Result<Tunables> {
        self.update("min_cores_online", |t| t.min_cores_online = value)
    }

    pub fn set_max_cores_online(&self, value: usize) -> Result<Tunables> {
        self.update("max_cores_online", |t| t.max_cores_online = value)
    }

    pub fn set_plug_percent(&self, value: u8) -> Result<Tunables> {
        self.update("plug_percent", |t| t.plug_percent = value)
    }

    pub fn set_plugging_threshold(&self, value: Hz) -> Result<Tunables> {
        self.update("plugging_threshold", |t| t.plugging_threshold = value)
    }

    pub fn set_powersave_enabled(&self, value: bool) -> Result<Tunables> {
        self.update("powersave_enabled", |t| t.powersave_enabled = value)
    }

    pub fn set_restore_mode(&self, value: RestoreMode) -> Result<Tunables> {
        self.update("restore_mode", |t| t.restore_mode = value)
    }

    /// Set a tunable from its textual name and value
    pub fn set_by_name(&self, name: &str, value: &str) -> Result<Tunables> {
        match name {
            "min_cores_online" => self.set_min_cores_online(parse_value(name, value)?),
            "max_cores_online" => self.set_max_cores_online(parse_value(name, value)?),
            "plug_percent" => self.set_plug_percent(parse_value(name, value)?),
            "plugging_threshold" => self.set_plugging_threshold(parse_value(name, value)?),
            "powersave_enabled" => self.set_powersave_enabled(parse_bool(value)?),
            "restore_mode" => self.set_restore_mode(value.parse()?),
            other => Err(HotplugError::Validation(format!(
                "unknown tunable: {} (expected one of {})",
                other,
                TUNABLE_NAMES.join(", ")
            ))),
        }
    }

    fn update(&self, field: &str, apply: impl FnOnce(&mut Tunables)) -> Result<Tunables> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut candidate = *guard;
        apply(&mut candidate);
        candidate.validate(self.total_cores)?;

        if candidate != *guard {
            info!("Tunable {} updated", field);
        }
        *guard = candidate;
        Ok(candidate)
    }
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| HotplugError::Parse(format!("invalid value for {}: {}", name, value)))
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => Err(HotplugError::Parse(format!("invalid boolean: {}", other))),
    }
}
