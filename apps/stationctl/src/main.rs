//! # stationctl
//!
//! Command-line host for the media station engine.
//!
//! ## Wiring
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SyncConfig ──► Database (SQLite) ─────────────┐                        │
//! │             ──► MediaCache (LocalFileStorage) ─┼──► StationManager      │
//! │             ──► WsTransport ─► NodeCommandService                       │
//! │             ──► SystemPing ────────────────────┘                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Logging goes to stderr; `RUST_LOG` overrides the default filter.

mod cli;

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use station_core::{Media, NodeRole, StepProgress};
use station_db::{CacheSource, Database, DbConfig, LocalFileStorage, MediaCache};
use station_sync::{
    HostProbe, NoOpEventHandler, NodeCommandService, ServiceTimeouts, StationManager, SyncConfig,
    SystemPing, TracingReporter, TransportConfig, WsTransport,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let cli = Cli::parse();
    let config = SyncConfig::load(cli.config.clone())?;
    let manager = build_manager(&config).await?;

    run(&manager, cli.command).await
}

/// Initializes the tracing subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=station_sync=trace` - Trace the sync engine only
/// - Default: INFO, with debug for the station crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,station_sync=debug,station_db=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn build_manager(config: &SyncConfig) -> Result<StationManager, Box<dyn Error>> {
    let db = Database::new(DbConfig::new(config.database_path()?)).await?;
    let cache = MediaCache::new(Arc::new(LocalFileStorage::new(config.media_root()?)));

    let (transport, incoming) = WsTransport::new(TransportConfig::from(&config.node));
    let service = NodeCommandService::start(
        Arc::new(transport),
        incoming,
        Arc::new(NoOpEventHandler),
        ServiceTimeouts::from(&config.node),
    );
    let probe: Arc<dyn HostProbe> = Arc::new(SystemPing::new(config.node.icmp_timeout()));

    info!(name = %config.app.name, role = %config.role(), "Station host ready");
    Ok(StationManager::new(
        Arc::new(db),
        Arc::new(cache),
        Arc::new(service),
        probe,
        config.role(),
        config.node.icmp_ping_enabled,
    ))
}

async fn run(manager: &StationManager, command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::List => {
            for station in manager.list_stations().await? {
                let pending = if station.has_pending_changes { " (pending changes)" } else { "" };
                println!("{:>4}  {}{}", station.id, station.name, pending);
            }
        }
        Command::Create { name } => {
            let station = manager.create_station(&name).await?;
            println!("{}", station.id);
        }
        Command::Show { station } => {
            let station = manager.station(station).await?;
            let manifest: serde_json::Value = serde_json::from_str(&station.to_manifest_json()?)?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }
        Command::AddNode {
            station,
            name,
            ip,
            controller,
        } => {
            let role = if controller { NodeRole::Controller } else { NodeRole::Default };
            println!("{}", manager.add_node(station, &name, &ip, role).await?);
        }
        Command::AddFolder {
            station,
            name,
            parent,
        } => {
            println!("{}", manager.add_folder(station, parent, &name).await?);
        }
        Command::AddContent {
            station,
            name,
            folder,
        } => {
            println!("{}", manager.add_content(station, folder, &name).await?);
        }
        Command::SetMedia {
            station,
            content,
            node,
            file,
            duration,
        } => {
            let file_name = file_name(&file)?;
            let media = match duration {
                Some(duration) => Media::video(node, file_name, duration),
                None => Media::image(node, file_name),
            };
            manager
                .set_media(station, content, media, CacheSource::Path(file))
                .await?;
        }
        Command::Sync { station, role } => {
            let ok = match role {
                Some(role) => {
                    manager
                        .sync_engine()
                        .sync(station, &role, &TracingReporter)
                        .await?
                }
                None => manager.sync(station, &TracingReporter).await?,
            };
            println!("{}", if ok { "synced" } else { "not fully synced" });
            if !ok {
                std::process::exit(2);
            }
        }
        Command::Check { station, node } => {
            let log_step = |p: StepProgress| info!(step = ?p.step, state = ?p.state, "Health check");
            let status = manager.check_node(station, node, Some(&log_step)).await?;
            println!("{status}");
        }
        Command::Pull { station } => {
            let station = manager.pull_from_controller(station).await?;
            println!("pulled '{}'", station.name);
        }
    }
    Ok(())
}

fn file_name(path: &Path) -> Result<String, Box<dyn Error>> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| format!("not a file path: {}", path.display()).into())
}
