//! Suspend state file watcher
//!
//! Polls a kernel node such as `/sys/kernel/power_suspend/power_suspend_state`
//! and turns changes into [`PowerEvent`]s.

use crate::controller::PowerEvent;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Interpret the contents of a suspend state node
pub fn parse_state(content: &str) -> Option<PowerEvent> {
    match content.trim().to_ascii_lowercase().as_str() {
        "1" | "mem" | "suspend" | "suspended" | "off" => Some(PowerEvent::Suspend),
        "0" | "on" | "resume" | "resumed" | "awake" => Some(PowerEvent::Resume),
        _ => None,
    }
}

/// Polls a state file and forwards transitions
pub struct StateWatcher {
    path: PathBuf,
    interval: Duration,
    last: Option<PowerEvent>,
}

impl StateWatcher {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
            last: None,
        }
    }

    /// Read the node once, returning an event if the state changed
    pub async fn poll(&mut self) -> Option<PowerEvent> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                debug!("Cannot read {}: {}", self.path.display(), e);
                return None;
            }
        };

        let Some(event) = parse_state(&content) else {
            warn!("Unrecognised suspend state {:?} in {}", content.trim(), self.path.display());
            return None;
        };

        if self.last == Some(event) {
            return None;
        }
        self.last = Some(event);
        Some(event)
    }

    /// Poll until the receiving side goes away
    pub async fn run(mut self, events: mpsc::Sender<PowerEvent>) {
        let mut interval = tokio::time::interval(self.interval);

        loop {
            interval.tick().await;

            if let Some(event) = self.poll().await {
                debug!("Suspend state changed: {}", event);
                if events.send(event).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state() {
        assert_eq!(parse_state("1\n"), Some(PowerEvent::Suspend));
        assert_eq!(parse_state("0"), Some(PowerEvent::Resume));
        assert_eq!(parse_state("mem"), Some(PowerEvent::Suspend));
        assert_eq!(parse_state("maybe"), None);
    }

    #[tokio::test]
    async fn test_poll_reports_changes_once() {
        let dir = tempfile::tempdir().unwrap();
        let node = dir.path().join("power_suspend_state");
        std::fs::write(&node, "0\n").unwrap();

        let mut watcher = StateWatcher::new(&node, Duration::from_millis(10));
        assert_eq!(watcher.poll().await, Some(PowerEvent::Resume));
        assert_eq!(watcher.poll().await, None);

        std::fs::write(&node, "1\n").unwrap();
        assert_eq!(watcher.poll().await, Some(PowerEvent::Suspend));
        assert_eq!(watcher.poll().await, None);
    }
}
