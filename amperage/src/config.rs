//! Configuration for the Amperage hotplug daemon

use crate::error::{HotplugError, Result};
use crate::sysfs::DEFAULT_SYSFS_ROOT;
use crate::tunables::{Hz, RestoreMode, Tunables, DEFAULT_PLUGGING_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AmperageConfig {
    /// Initial hotplug tunables
    #[serde(default)]
    pub hotplug: HotplugConfig,

    /// CPU platform settings
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Suspend/resume event source settings
    #[serde(default)]
    pub events: EventsConfig,

    /// Daemon settings
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Initial tunable values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotplugConfig {
    /// Floor on cores kept online after resume
    #[serde(default = "default_min_cores")]
    pub min_cores_online: usize,

    /// Ceiling on cores onlined (defaults to every core)
    #[serde(default)]
    pub max_cores_online: Option<usize>,

    /// Share of managed cores restored under powersave (0-100)
    #[serde(default = "default_plug_percent")]
    pub plug_percent: u8,

    /// Frequency (Hz) a core must reach to be restored in threshold mode
    #[serde(default = "default_plugging_threshold")]
    pub plugging_threshold: Hz,

    /// Enable percentage and threshold driven restore
    #[serde(default)]
    pub powersave_enabled: bool,

    /// Resume strategy
    #[serde(default)]
    pub restore_mode: RestoreMode,
}

impl Default for HotplugConfig {
    fn default() -> Self {
        Self {
            min_cores_online: default_min_cores(),
            max_cores_online: None,
            plug_percent: default_plug_percent(),
            plugging_threshold: default_plugging_threshold(),
            powersave_enabled: false,
            restore_mode: RestoreMode::default(),
        }
    }
}

impl HotplugConfig {
    /// Resolve into tunables for a platform with `total_cores` cores
    pub fn to_tunables(&self, total_cores: usize) -> Result<Tunables> {
        let tunables = Tunables {
            min_cores_online: self.min_cores_online,
            max_cores_online: self.max_cores_online.unwrap_or(total_cores),
            plug_percent: self.plug_percent,
            plugging_threshold: self.plugging_threshold,
            powersave_enabled: self.powersave_enabled,
            restore_mode: self.restore_mode,
        };
        tunables.validate(total_cores)?;
        Ok(tunables)
    }
}

/// CPU platform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// CPU sysfs root
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: String,

    /// Drive an in-memory platform instead of sysfs
    #[serde(default)]
    pub simulate: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            sysfs_root: default_sysfs_root(),
            simulate: false,
        }
    }
}

/// Suspend/resume event source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// File polled for the suspend state (e.g. `/sys/kernel/power_suspend/power_suspend_state`)
    #[serde(default)]
    pub state_path: Option<String>,

    /// Poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            state_path: None,
            poll_interval_ms: default_poll_interval(),
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Socket path
    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            log_level: default_log_level(),
        }
    }
}

// Default value functions
fn default_min_cores() -> usize {
    1
}

fn default_plug_percent() -> u8 {
    100
}

fn default_plugging_threshold() -> Hz {
    DEFAULT_PLUGGING_THRESHOLD
}

fn default_sysfs_root() -> String {
    DEFAULT_SYSFS_ROOT.to_string()
}

fn default_poll_interval() -> u64 {
    500
}

pub fn default_socket_path() -> String {
    "/run/amperage/amperage.sock".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AmperageConfig {
    /// Load configuration from file, falling back to defaults if it is missing
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::parse(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from YAML text
    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| HotplugError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AmperageConfig::load(Path::new("/nonexistent/amperage.yaml")).unwrap();
        assert_eq!(config.daemon.socket_path, "/run/amperage/amperage.sock");
        assert_eq!(config.platform.sysfs_root, "/sys/devices/system/cpu");
        assert!(config.events.state_path.is_none());

        let tunables = config.hotplug.to_tunables(4).unwrap();
        assert_eq!(tunables, Tunables::defaults_for(4));
    }

    #[test]
    fn test_load_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "hotplug:\n  min_cores_online: 2\n  max_cores_online: 3\n  plug_percent: 50\n  powersave_enabled: true\n  restore_mode: threshold_restore\nevents:\n  state_path: /sys/kernel/power_suspend/power_suspend_state\n"
        )
        .unwrap();

        let config = AmperageConfig::load(file.path()).unwrap();
        let tunables = config.hotplug.to_tunables(4).unwrap();
        assert_eq!(tunables.min_cores_online, 2);
        assert_eq!(tunables.max_cores_online, 3);
        assert_eq!(tunables.restore_mode, RestoreMode::ThresholdRestore);
        assert_eq!(config.events.poll_interval_ms, 500);
    }

    #[test]
    fn test_invalid_tunables_rejected() {
        let config = AmperageConfig::parse("hotplug:\n  max_cores_online: 16\n").unwrap();
        assert!(config.hotplug.to_tunables(4).is_err());
        assert!(AmperageConfig::parse("hotplug: [").is_err());
    }
}
