//! Daemon state shared between the IPC server and the event watcher

use crate::controller::{HotplugController, PowerEvent};
use crate::ipc::{DaemonStatus, IpcHandler};
use crate::platform::{describe_cores, CoreInfo, Platform};
use crate::tunables::{TunableStore, Tunables};
use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Serialises hotplug passes and answers IPC queries
pub struct HotplugService<P: Platform> {
    controller: Mutex<HotplugController<P>>,
    tunables: Arc<TunableStore>,
}

impl<P: Platform> HotplugService<P> {
    pub fn new(platform: P, tunables: Arc<TunableStore>) -> Self {
        Self {
            controller: Mutex::new(HotplugController::new(platform, Arc::clone(&tunables))),
            tunables,
        }
    }

    /// Run a pass for `event`; events arriving mid-pass wait here
    pub fn dispatch(&self, event: PowerEvent) -> bool {
        self.controller().handle(event)
    }

    fn controller(&self) -> MutexGuard<'_, HotplugController<P>> {
        self.controller.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P: Platform> IpcHandler for HotplugService<P> {
    fn get_status(&self) -> Result<DaemonStatus> {
        let controller = self.controller();
        let cores = describe_cores(controller.platform());

        Ok(DaemonStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: controller.state(),
            total_cores: cores.len(),
            online_cores: cores.iter().filter(|c| c.online).count(),
            tunables: self.tunables.snapshot(),
            last_pass: controller.last_pass().cloned(),
        })
    }

    fn get_tunables(&self) -> Tunables {
        self.tunables.snapshot()
    }

    fn set_tunable(&self, name: &str, value: &str) -> Result<Tunables> {
        Ok(self.tunables.set_by_name(name, value)?)
    }

    fn list_cores(&self) -> Vec<CoreInfo> {
        describe_cores(self.controller().platform())
    }

    fn notify(&self, event: PowerEvent) -> Result<bool> {
        Ok(self.dispatch(event))
    }
}
