use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use shoal_auth::PermissionSet;
use tracing::info;
use tracing_subscriber::prelude::*;

mod collab;
mod config;
mod dispatch;
mod envelope;
mod error;
mod handlers;
mod metrics;
mod notify;
mod persistence;
mod registry;
mod repository;
mod sender;
mod server;
mod session;
mod state;
#[cfg(test)]
mod test_helpers;

use crate::collab::{DisabledScriptEngine, GitContentStore, SqliteQueryEngine, X25519ChaCha};
use crate::config::{FileConfig, RuntimeConfig, load_config};
use crate::metrics::ServerMetrics;
use crate::notify::Notifier;
use crate::persistence::SessionStore;
use crate::registry::SessionRegistry;
use crate::repository::Database;
use crate::state::CoreState;

/// Every permission token a handler can require.
const ALL_PERMISSIONS: [&str; 6] = [
    "cms_user",
    "git_read",
    "git_write",
    "sql_query",
    "script_run",
    "contact_form",
];

#[derive(Parser)]
#[command(name = "shoal")]
#[command(about = "Real-time collaborative content backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Custom data directory (defaults to ./shoal-data)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server in the foreground
    Server(ServerArgs),

    /// Delete expired session snapshots and exit
    SweepSessions,
}

#[derive(Parser, Default)]
struct ServerArgs {
    /// Port for the server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("shoal-data"));

    match cli.command {
        // Bare `shoal` runs the server with config-file settings.
        None => run_server(ServerArgs::default(), data_dir).await,
        Some(Commands::Server(args)) => run_server(args, data_dir).await,
        Some(Commands::SweepSessions) => sweep_sessions(data_dir).await,
    }
}

async fn run_server(args: ServerArgs, data_dir: PathBuf) -> Result<()> {
    let default_directive = if args.debug {
        "shoal=debug,tower_http=debug,info"
    } else {
        "shoal=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    info!("Starting Shoal - collaborative content backend");

    std::fs::create_dir_all(&data_dir)?;
    let fc: FileConfig = load_config(&data_dir).extract()?;
    let config = RuntimeConfig::resolve(data_dir, &fc, args.host, args.port);

    info!("Initializing database: {}", config.db_path.display());
    let db = Database::connect(&config.db_url()).await?;
    let all_permissions: PermissionSet = ALL_PERMISSIONS.into_iter().collect();
    db.seed_admin(&all_permissions).await?;

    let store = SessionStore::new(config.snapshot_dir.clone(), config.snapshot_retention)?;
    let content = Arc::new(GitContentStore::new(config.workspaces_dir.clone())?);
    let queries = Arc::new(SqliteQueryEngine::new(db.pool.clone()));

    let core = Arc::new(CoreState {
        config,
        sessions: SessionRegistry::new(Notifier::spawn(64)),
        store,
        db,
        content,
        queries,
        scripts: Arc::new(DisabledScriptEngine),
        crypto: Arc::new(X25519ChaCha),
        metrics: Arc::new(ServerMetrics::new()),
    });
    let handlers = Arc::new(handlers::build_registry()?);

    server::serve(core, handlers).await
}

async fn sweep_sessions(data_dir: PathBuf) -> Result<()> {
    let fc: FileConfig = load_config(&data_dir).extract()?;
    let config = RuntimeConfig::resolve(data_dir, &fc, None, None);
    let store = SessionStore::new(config.snapshot_dir.clone(), config.snapshot_retention)?;
    let reaped = store.sweep().await?;
    println!("reaped {reaped} expired session snapshots");
    Ok(())
}
