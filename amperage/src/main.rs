//! Amperage - CPU hotplug policy daemon for DaemonOS
//!
//! Provides:
//! - Offlining of secondary cores on suspend
//! - Full, percentage or frequency-gated core restore on resume
//! - Runtime tunables over IPC
//! - Optional polling of a kernel suspend state node

use amperage::config::AmperageConfig;
use amperage::ipc::IpcServer;
use amperage::service::HotplugService;
use amperage::watcher::StateWatcher;
use amperage::{Platform, SimulatedCpus, SysfsCpus, TunableStore};
use anyhow::{Context, Result};
use clap::Parser;
use nix::unistd::Uid;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Amperage - CPU hotplug policy daemon
#[derive(Parser, Debug)]
#[command(name = "amperaged", version, about)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "/grimoire/system/amperage.yaml")]
    config: PathBuf,

    /// Socket path (overrides the configuration file)
    #[arg(short, long)]
    socket: Option<String>,

    /// Drive an in-memory platform instead of sysfs
    #[arg(long)]
    simulate: bool,

    /// Core count for the simulated platform
    #[arg(long, default_value_t = 4)]
    cores: usize,

    /// Debug mode
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = AmperageConfig::load(&args.config)?;

    let log_level = if args.debug {
        "debug".to_string()
    } else {
        config.daemon.log_level.clone()
    };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    info!("Amperage v{} starting", env!("CARGO_PKG_VERSION"));

    let socket = args
        .socket
        .clone()
        .unwrap_or_else(|| config.daemon.socket_path.clone());

    if args.simulate || config.platform.simulate {
        info!("Using simulated platform with {} cores", args.cores);
        serve(SimulatedCpus::new(args.cores), config, socket).await
    } else {
        if !Uid::effective().is_root() {
            warn!("Not running as root, cpu hotplug writes will likely fail");
        }
        let cpus = SysfsCpus::new(&config.platform.sysfs_root)?;
        serve(cpus, config, socket).await
    }
}

async fn serve<P: Platform + 'static>(
    platform: P,
    config: AmperageConfig,
    socket: String,
) -> Result<()> {
    let total = platform.total_cores();
    let initial = config
        .hotplug
        .to_tunables(total)
        .context("invalid hotplug configuration")?;
    let tunables = Arc::new(TunableStore::new(total, initial)?);
    info!(
        "Managing {} of {} cores",
        tunables.total_cores().saturating_sub(1),
        tunables.total_cores()
    );

    let service = Arc::new(HotplugService::new(platform, tunables));

    // Start suspend state watcher
    if let Some(path) = config.events.state_path.clone() {
        let (tx, mut rx) = mpsc::channel(8);
        let watcher = StateWatcher::new(&path, Duration::from_millis(config.events.poll_interval_ms));
        tokio::spawn(watcher.run(tx));
        info!("Watching {} for suspend state", path);

        let watcher_service = Arc::clone(&service);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let svc = Arc::clone(&watcher_service);
                if let Err(e) = tokio::task::spawn_blocking(move || svc.dispatch(event)).await {
                    warn!("Hotplug pass for {} aborted: {}", event, e);
                }
            }
        });
    }

    // Start IPC server
    let server = IpcServer::new(socket, service);

    info!("Amperage ready");
    server.run().await
}
