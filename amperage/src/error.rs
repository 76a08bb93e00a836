//! Error types for hotplug operations

use thiserror::Error;

/// Hotplug error types
#[derive(Debug, Error)]
pub enum HotplugError {
    /// A tunable write would violate an invariant
    #[error("Validation error: {0}")]
    Validation(String),

    /// The platform failed to transition a single core
    #[error("cpu{core}: transition to {target} failed: {reason}")]
    PlatformTransition {
        core: usize,
        target: &'static str,
        reason: String,
    },

    /// Tunables cannot produce a valid decision for this platform
    #[error("Configuration inconsistency: {0}")]
    ConfigurationInconsistency(String),

    /// Parse error (YAML, sysfs values, tunable values)
    #[error("Parse error: {0}")]
    Parse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for hotplug operations
pub type Result<T> = std::result::Result<T, HotplugError>;

impl HotplugError {
    /// Build a transition error for `core` going to `online`
    pub fn transition(core: usize, online: bool, reason: impl ToString) -> Self {
        Self::PlatformTransition {
            core,
            target: if online { "online" } else { "offline" },
            reason: reason.to_string(),
        }
    }

    /// Check if this error was raised at the tuning boundary
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Parse(_))
    }
}
