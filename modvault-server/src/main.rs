use clap::Parser;
use modvault_core::logbus::LogBus;
use modvault_core::orchestrator::Orchestrator;
use modvault_core::registry::ArtifactRegistry;
use modvault_core::scraper::WorkshopPageScraper;
use modvault_core::steam::adapter::{SteamCmdAdapter, WorkshopFetcher};
use modvault_core::sweeper;
use modvault_core::workspace::WorkspaceManager;
use modvault_server::app_state::AppState;
use modvault_server::config::Config;
use modvault_server::routes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments for the modvault server
#[derive(Parser, Debug)]
#[command(name = "modvault-server")]
#[command(about = "Workshop item download service backed by steamcmd")]
struct Args {
    /// Override the server port from the environment
    #[arg(long)]
    port: Option<u16>,

    /// Override the bind host from the environment
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(port) = args.port {
        config.server_port = port;
    }
    if let Some(host) = args.host {
        config.server_host = host;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "modvault_server=debug,modvault_core=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.ensure_directories()?;

    let bus = Arc::new(LogBus::new(config.logbus_config()));
    let registry = Arc::new(ArtifactRegistry::new());
    let workspaces = Arc::new(WorkspaceManager::new(config.download_root.clone()));

    // Anything left under the download root belongs to a previous
    // process; active jobs do not survive restarts.
    match workspaces.sweep_all().await {
        Ok(0) => {}
        Ok(count) => info!("startup sweep removed {count} residual workspaces"),
        Err(err) => warn!(%err, "startup sweep failed"),
    }

    let adapter = Arc::new(SteamCmdAdapter::new(config.adapter_config()));
    if config.steam_guard_code.is_some() {
        // One-shot session bootstrap with the provided second factor.
        match adapter.authenticate(None).await {
            Ok(()) => info!("steam session bootstrapped from configured guard code"),
            Err(err) => warn!(%err, "steam session bootstrap failed"),
        }
    }
    let fetcher: Arc<dyn WorkshopFetcher> = adapter.clone();

    let orchestrator = Orchestrator::new(
        config.orchestrator_config(),
        Arc::clone(&registry),
        Arc::clone(&workspaces),
        fetcher,
        Arc::clone(&bus),
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(sweeper::run(
        Arc::clone(&registry),
        Arc::clone(&workspaces),
        Arc::clone(&bus),
        config.sweeper_config(),
        shutdown.clone(),
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        orchestrator: orchestrator.clone(),
        metadata: Arc::new(WorkshopPageScraper::new()),
        bus: Arc::clone(&bus),
        shutdown: shutdown.clone(),
    };
    let app = routes::create_app(state);

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;
    info!(
        "modvault server listening on {addr} (app {}, cap {})",
        config.app_id, config.max_concurrent_downloads
    );
    bus.info("server", format!("listening on {addr}"));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop timers and long-lived connections, then cancel in-flight
    // jobs and drop their scratch trees.
    info!("shutting down: cancelling in-flight jobs");
    shutdown.cancel();
    orchestrator.shutdown().await;
    bus.close_subscribers();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
