//! Tandem peer (tandem-sync) - Main entry point
//!
//! Runs one peer of a two-party room: a simulated playback engine, the sync
//! orchestrator, a TCP link to the other peer and the HTTP control surface.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tandem_common::Role;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tandem_sync::api;
use tandem_sync::clock::WallClock;
use tandem_sync::config::TomlConfig;
use tandem_sync::player::SimulatedPlayer;
use tandem_sync::transport::TcpTransport;
use tandem_sync::SyncHandle;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Command-line arguments for tandem-sync
#[derive(Parser, Debug)]
#[command(name = "tandem-sync")]
#[command(about = "Two-peer playback synchronization")]
#[command(version)]
struct Args {
    /// Initial role (host or follower)
    #[arg(short, long, env = "TANDEM_ROLE")]
    role: Role,

    /// Accept the peer connection on this address
    #[arg(long, conflicts_with = "connect")]
    listen: Option<SocketAddr>,

    /// Connect to the peer at this address
    #[arg(long)]
    connect: Option<SocketAddr>,

    /// HTTP port (overrides the config file)
    #[arg(short, long, env = "TANDEM_PORT")]
    port: Option<u16>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Length of the simulated media
    #[arg(long, default_value = "600000")]
    media_duration_ms: i64,
}

enum PeerLink {
    Listen(SocketAddr),
    Connect(SocketAddr),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = tandem_common::config::resolve_config_path(
        args.config.as_deref(),
        tandem_common::config::CONFIG_ENV_VAR,
    );
    let config = TomlConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let link = match (args.listen, args.connect) {
        (Some(addr), None) => PeerLink::Listen(addr),
        (None, Some(addr)) => PeerLink::Connect(addr),
        _ => bail!("exactly one of --listen or --connect is required"),
    };
    let port = args.port.unwrap_or(config.api.port);

    info!("Starting Tandem peer as {} (HTTP port {})", args.role, port);
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }

    let player = Arc::new(SimulatedPlayer::new(args.media_duration_ms));
    let transport = Arc::new(TcpTransport::new());
    let (sync, actor) = tandem_sync::spawn(
        config.sync.clone(),
        player.clone(),
        transport.clone(),
        Arc::new(WallClock::new()),
    );
    sync.update_role(Some(args.role))
        .await
        .context("Failed to assign initial role")?;

    let peer_task = tokio::spawn(run_peer_link(link, transport, sync.clone()));

    let app = api::create_router(api::AppState {
        sync: sync.clone(),
        player,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    peer_task.abort();
    sync.shutdown().context("Sync orchestrator already stopped")?;
    actor.await.context("Sync orchestrator panicked")?;

    info!("Shutdown complete");
    Ok(())
}

/// Keep a connection to the peer; one at a time, re-established when lost
async fn run_peer_link(link: PeerLink, transport: Arc<TcpTransport>, sync: SyncHandle) -> Result<()> {
    match link {
        PeerLink::Listen(addr) => {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to listen on {}", addr))?;
            info!("Waiting for peer on {}", addr);
            loop {
                let (stream, peer) = listener.accept().await.context("Accept failed")?;
                info!("Peer connection from {}", peer);
                if let Err(e) = transport.run_connection(stream, &sync).await {
                    warn!("Peer connection ended with error: {}", e);
                }
            }
        }
        PeerLink::Connect(addr) => loop {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    if let Err(e) = transport.run_connection(stream, &sync).await {
                        warn!("Peer connection ended with error: {}", e);
                    }
                }
                Err(e) => warn!("Connect to {} failed: {}", addr, e),
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        },
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
