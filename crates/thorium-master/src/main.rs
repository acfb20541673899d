//! Thorium Master
//!
//! HTTP coordinator that tracks worker machines, schedules games onto them
//! and admits players on behalf of game servers.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use thorium_core::config::load_config;
use thorium_core::tracing_init::{LogFormat, init_tracing};
use thorium_master::auth::TokenAuthority;
use thorium_master::server::{AppState, build_router};
use thorium_master::session::{SessionCache, SessionStore};
use thorium_master::storage::MasterDatabase;

#[derive(Parser, Debug)]
#[command(name = "thorium-master")]
#[command(version, about = "Thorium master - machine registry and game scheduler")]
struct Args {
    /// Path to a JSON settings file.
    #[arg(long, env = "THORIUM_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on. Overrides the settings file.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Path to SQLite database file.
    #[arg(long, env = "THORIUM_DB_PATH")]
    db: Option<PathBuf>,

    /// PEM-encoded P-256 private key used to sign tokens.
    #[arg(long, env = "THORIUM_PRIVATE_KEY", requires = "public_key")]
    private_key: Option<PathBuf>,

    /// PEM-encoded public key paired with `--private-key`.
    #[arg(long, env = "THORIUM_PUBLIC_KEY", requires = "private_key")]
    public_key: Option<PathBuf>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.master.listen_addr = listen.to_string();
    }
    if args.db.is_some() {
        config.master.database_path.clone_from(&args.db);
    }
    if args.private_key.is_some() {
        config.master.private_key_path.clone_from(&args.private_key);
        config.master.public_key_path.clone_from(&args.public_key);
    }

    init_tracing("thorium_master=info", LogFormat::from_flag(args.log_json))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.master.listen_addr,
        "Starting thorium-master"
    );

    let db_path = match &config.master.database_path {
        Some(path) => path.clone(),
        None => default_db_path()?,
    };
    info!(path = %db_path.display(), "Opening master database");
    let db = MasterDatabase::open(&db_path).await?;

    let tokens = match (
        &config.master.private_key_path,
        &config.master.public_key_path,
    ) {
        (Some(private), Some(public)) => TokenAuthority::from_pem_files(private, public)?,
        _ => {
            warn!("No signing key configured, generating an ephemeral key pair");
            TokenAuthority::generate()?
        }
    };
    let tokens = Arc::new(tokens);

    let sessions = SessionStore::new(
        SessionCache::new(),
        Duration::from_secs(config.sessions.expire_secs),
    );

    // Expired sessions are invisible to readers already; this only bounds memory.
    let purge_cache = sessions.cache().clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            let removed = purge_cache.purge_expired().await;
            if removed > 0 {
                info!(removed, "Purged expired sessions");
            }
        }
    });

    let state = AppState::new(&db, &tokens, &sessions, config.scheduler.clone())?;
    let app = build_router(state);

    let listener = TcpListener::bind(&config.master.listen_addr).await?;
    info!(addr = %listener.local_addr()?, "Master listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal");
    })
    .await?;

    info!("Master stopped");
    Ok(())
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let data =
        dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine data directory"))?;
    Ok(data.join("thorium").join("master.db"))
}
