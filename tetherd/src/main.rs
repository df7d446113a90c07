//! tether daemon and command-line host.
//!
//! Usage:
//!   tetherd services
//!   tetherd connect <service-id>
//!   tetherd authorize <binding-id> [--config '{"username":"rj"}']
//!   tetherd callback <binding-id> '<redirect query string>'
//!   tetherd sync <binding-id>
//!   tetherd run

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tether_sync::AuthorizationStep;
use tether_types::{BindingId, ServiceId};
use tetherd::{Tether, TetherConfig};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "tetherd")]
#[command(about = "Hosts tether service consumer plugins and runs their syncs")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "tether.toml")]
    config: PathBuf,

    /// Overrides `plugin_dir` from the configuration
    #[arg(long)]
    plugin_dir: Option<PathBuf>,

    /// Overrides `database_path` from the configuration
    #[arg(long)]
    database: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan the plugin directory and list registered services
    Services,
    /// List service bindings and their sync state
    Bindings,
    /// Connect a registered service, creating a binding
    Connect { service_id: ServiceId },
    /// Start authorizing a binding
    Authorize {
        binding_id: BindingId,
        /// JSON configuration payload for the consumer
        #[arg(long)]
        config: Option<String>,
    },
    /// Complete authorization with the provider's redirect query string
    Callback { binding_id: BindingId, query: String },
    /// Run one sync for a binding
    Sync { binding_id: BindingId },
    /// Run scheduled syncs until interrupted
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .compact()
        .init();

    let mut config = TetherConfig::load(&args.config)?;
    if let Some(dir) = args.plugin_dir {
        config.plugin_dir = dir;
    }
    if let Some(path) = args.database {
        config.database_path = path;
    }

    let tether = Tether::open(config)?;
    let report = tether.scan()?;
    info!(
        registered = report.registered,
        skipped = report.skipped,
        evicted = report.evicted,
        "tether ready"
    );

    match args.command {
        Command::Services => {
            for service in tether.services() {
                println!(
                    "{}  {}  {}  [{}]",
                    service.id,
                    service.name,
                    service.title,
                    service.data_types.join(", ")
                );
            }
        }
        Command::Bindings => {
            for binding in tether.bindings()? {
                let last = binding
                    .state
                    .last_synchronization_utc
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{}  {}  {}  last sync: {}",
                    binding.id, binding.service_id, binding.state.sync_state, last
                );
            }
        }
        Command::Connect { service_id } => {
            let binding = tether.connect(service_id)?;
            println!("{}", binding.id);
        }
        Command::Authorize { binding_id, config } => {
            let config = config
                .map(|raw| serde_json::from_str(&raw))
                .transpose()
                .context("--config is not valid JSON")?;
            match tether.authorize(binding_id, config).await? {
                AuthorizationStep::AlreadyAuthorized => println!("authorized"),
                AuthorizationStep::Redirect(url) => println!("{url}"),
            }
        }
        Command::Callback { binding_id, query } => {
            if tether.callback(binding_id, &query).await? {
                println!("authorized");
            } else {
                warn!(binding_id = %binding_id, "Provider accepted the callback but validation failed");
                println!("unauthorized");
            }
        }
        Command::Sync { binding_id } => {
            let state = tether.sync(binding_id).await?;
            println!("{}", state.sync_state);
        }
        Command::Run => {
            tether
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!(error = %e, "Failed to listen for shutdown signal");
                    }
                })
                .await?;
        }
    }

    Ok(())
}
