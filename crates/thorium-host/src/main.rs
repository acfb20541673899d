//! Thorium Host
//!
//! Worker daemon that registers with the master, launches game servers on
//! request and relays their calls back to the master.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use thorium_core::config::load_config;
use thorium_core::tracing_init::{LogFormat, init_tracing};
use thorium_host::heartbeat::{LoadSampler, spawn_heartbeat_task};
use thorium_host::master::MasterClient;
use thorium_host::server::{HostState, build_router};
use thorium_host::supervisor::{ProcessSupervisor, SupervisorConfig};

#[derive(Parser, Debug)]
#[command(name = "thorium-host")]
#[command(version, about = "Thorium host - game server supervisor for one machine")]
struct Args {
    /// Path to a JSON settings file.
    #[arg(long, env = "THORIUM_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the master coordinator.
    #[arg(long, env = "THORIUM_MASTER_URL")]
    master_url: Option<String>,

    /// Port for this host's HTTP service.
    #[arg(long, env = "THORIUM_SERVICE_PORT")]
    service_port: Option<u16>,

    /// Path to the game server executable.
    #[arg(long, env = "THORIUM_GAMESERVER_BINARY")]
    gameserver_binary: Option<PathBuf>,

    /// First port handed to a game server.
    #[arg(long, env = "THORIUM_BASE_LISTEN_PORT")]
    base_listen_port: Option<u16>,

    /// Maximum concurrent game servers.
    #[arg(long, env = "THORIUM_MAX_PROCESSES")]
    max_processes: Option<usize>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "THORIUM_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?.host;
    if let Some(url) = args.master_url {
        config.master_url = url;
    }
    if let Some(port) = args.service_port {
        config.service_port = port;
    }
    if let Some(binary) = args.gameserver_binary {
        config.gameserver_binary = binary;
    }
    if let Some(port) = args.base_listen_port {
        config.base_listen_port = port;
    }
    if let Some(max) = args.max_processes {
        config.max_processes = max;
    }

    init_tracing("thorium_host=info", LogFormat::from_flag(args.log_json))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        master = %config.master_url,
        max_processes = config.max_processes,
        "Starting thorium-host"
    );

    let listener =
        TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], config.service_port))).await?;
    let service_port = listener.local_addr()?.port();

    let master = MasterClient::new(
        &config.master_url,
        Duration::from_secs(config.master_timeout_secs),
    )?;
    let identity = master.register(service_port).await?;
    info!(machine_id = identity.machine_id, service_port, "Registered with master");

    let supervisor = ProcessSupervisor::new(SupervisorConfig {
        binary: config.gameserver_binary.clone(),
        base_port: config.base_listen_port,
        service_port,
        max_processes: config.max_processes,
        log_dir: config.log_dir.clone(),
        terminate_timeout: Duration::from_secs(config.terminate_timeout_secs),
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let heartbeat = spawn_heartbeat_task(
        master.clone(),
        identity.machine_key.clone(),
        supervisor.clone(),
        LoadSampler::new(config.network_capacity_mbps),
        Duration::from_secs(config.heartbeat_interval_secs),
        shutdown_rx,
    );

    let app = build_router(HostState {
        supervisor: supervisor.clone(),
        master: master.clone(),
        machine_key: Arc::from(identity.machine_key.as_str()),
    });

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    info!(port = service_port, "Host listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            #[cfg(unix)]
            let sigterm_future = sigterm.recv();
            #[cfg(not(unix))]
            let sigterm_future = std::future::pending::<Option<()>>();

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C shutdown signal");
                }
                _ = sigterm_future => {
                    info!("Received SIGTERM shutdown signal");
                }
            }
        })
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = heartbeat.await;
    supervisor.terminate_all().await;
    if let Err(e) = master
        .unregister(identity.machine_id, &identity.machine_key)
        .await
    {
        warn!(error = %e, "Failed to unregister from master");
    }

    info!("Host stopped");
    Ok(())
}
