//! amperagectl - Amperage control utility

use amperage::config::default_socket_path;
use amperage::ipc::IpcClient;
use amperage::tunables::TUNABLE_NAMES;
use amperage::{PowerEvent, Tunables};
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

/// Amperage control utility
#[derive(Parser)]
#[command(name = "amperagectl", version, about = "Control the Amperage hotplug daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Socket path
    #[arg(long, default_value_t = default_socket_path())]
    socket: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon status
    Status,

    /// List cores with their state and frequency
    Cores,

    /// Tunable management
    Tunables {
        #[command(subcommand)]
        command: TunableCommands,
    },

    /// Deliver a suspend/resume notification (for sleep hooks)
    Notify {
        #[arg(value_enum)]
        event: EventArg,
    },
}

#[derive(Subcommand)]
enum TunableCommands {
    /// Show every tunable
    Show,

    /// Set one tunable
    Set {
        /// Tunable name
        name: String,
        /// New value
        value: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum EventArg {
    Suspend,
    Resume,
}

impl From<EventArg> for PowerEvent {
    fn from(arg: EventArg) -> Self {
        match arg {
            EventArg::Suspend => PowerEvent::Suspend,
            EventArg::Resume => PowerEvent::Resume,
        }
    }
}

fn print_tunables(tunables: &Tunables) {
    println!("min_cores_online:    {}", tunables.min_cores_online);
    println!("max_cores_online:    {}", tunables.max_cores_online);
    println!("plug_percent:        {}", tunables.plug_percent);
    println!("plugging_threshold:  {} Hz", tunables.plugging_threshold);
    println!("powersave_enabled:   {}", tunables.powersave_enabled);
    println!("restore_mode:        {}", tunables.restore_mode);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = IpcClient::new(&cli.socket);

    match cli.command {
        Commands::Status => {
            let status = client.get_status().await?;

            println!("Amperage Daemon Status");
            println!("======================");
            println!("Version:       {}", status.version);
            println!("State:         {:?}", status.state);
            println!("Cores online:  {}/{}", status.online_cores, status.total_cores);
            println!();

            println!("Tunables:");
            print_tunables(&status.tunables);

            if let Some(pass) = status.last_pass {
                println!();
                println!("Last pass:");
                println!("  Event:       {}", pass.event);
                println!("  Finished:    {}", pass.finished_at.to_rfc3339());
                println!("  Attempted:   {:?}", pass.attempted);
                if !pass.failed.is_empty() {
                    println!("  Failed:      {:?}", pass.failed);
                }
                if let Some(strategy) = pass.strategy {
                    println!("  Strategy:    {}", strategy);
                }
                println!("  Online:      {}", pass.online_after);
            }
        }

        Commands::Cores => {
            let cores = client.list_cores().await?;

            println!("{:<6} {:<8} {:>14}", "CPU", "STATE", "FREQUENCY");
            for core in &cores {
                let state = if core.online { "online" } else { "offline" };
                let marker = if core.managed { "" } else { " (boot)" };
                println!(
                    "cpu{:<3} {:<8} {:>10} MHz{}",
                    core.index,
                    state,
                    core.frequency / 1_000_000,
                    marker
                );
            }
        }

        Commands::Tunables { command } => match command {
            TunableCommands::Show => {
                let tunables = client.get_tunables().await?;
                print_tunables(&tunables);
            }

            TunableCommands::Set { name, value } => {
                if !TUNABLE_NAMES.contains(&name.as_str()) {
                    anyhow::bail!(
                        "unknown tunable {} (expected one of {})",
                        name,
                        TUNABLE_NAMES.join(", ")
                    );
                }
                let tunables = client.set_tunable(&name, &value).await?;
                println!("{} set to {}", name, value);
                println!();
                print_tunables(&tunables);
            }
        },

        Commands::Notify { event } => {
            let event = PowerEvent::from(event);
            if client.notify(event).await? {
                println!("{} pass applied", event);
            } else {
                println!("Already in {} state, nothing to do", event);
            }
        }
    }

    Ok(())
}
