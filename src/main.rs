//! Audioserver - miniserver-facing audio bridge.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audioserver::alerts::AlertResolver;
use audioserver::api::{self, AppState};
use audioserver::backends::rpc::RpcClient;
use audioserver::backends::KNOWN_BACKENDS;
use audioserver::bus::{create_bus, BusLogLayer};
use audioserver::config;
use audioserver::content::{AdapterRegistry, MusicAssistantContentAdapter};
use audioserver::favorites::FavoritesStore;
use audioserver::providers::{self, KNOWN_PROVIDERS};
use audioserver::router::CommandRouter;
use audioserver::zone::ZoneManager;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("audioserver {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("audioserver {}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Miniserver-facing audio server bridging zones to networked players.");
        println!();
        println!("USAGE:");
        println!("    audioserver [OPTIONS]");
        println!();
        println!("OPTIONS:");
        println!("    -h, --help       Print help information");
        println!("    -V, --version    Print version information");
        println!();
        println!("ENVIRONMENT VARIABLES:");
        println!("    CONFIG_DIR       Directory holding config.json");
        println!("    CONFIG_FILE      Full path to the config file");
        println!("    DATA_DIR         State directory (favorites, recents)");
        println!("    PUBLIC_DIR       Served media root (alerts, TTS cache)");
        println!("    MEDIA_PROVIDER   Media provider key (default: dummy)");
        println!("    ALERTS_HOST      Advertised host for alert media URLs");
        println!("    ALERTS_PORT      Advertised port for alert media URLs");
        println!("    LOG_LEVEL        Log level when RUST_LOG is unset");
        return Ok(());
    }

    run().await
}

async fn run() -> Result<()> {
    // Event bus first: the log layer mirrors WARN+ records onto it.
    let bus = create_bus();

    // Priority: RUST_LOG > LOG_LEVEL (legacy) > default
    let log_filter = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| "audioserver=debug,tower_http=info".into());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&log_filter))
        .with(tracing_subscriber::fmt::layer())
        .with(BusLogLayer::new(bus.clone()))
        .init();

    tracing::info!("Starting audioserver v{}", env!("CARGO_PKG_VERSION"));

    // Unrecoverable config errors exit non-zero before anything listens.
    let config = config::load_config().context("configuration")?;
    config
        .validate(KNOWN_BACKENDS, KNOWN_PROVIDERS)
        .map_err(|e| anyhow::anyhow!(e))?;
    tracing::info!(
        "Configuration loaded: {} zone(s), ports {}/{}",
        config.zones.len(),
        config.app_http_port,
        config.ms_http_port
    );

    // Media provider selection, instantiated lazily on first use.
    providers::configure_providers(providers::ProviderSettings {
        key: config.media_provider.clone(),
        musicassistant: config.musicassistant.clone(),
        bus: Some(bus.clone()),
    });

    // Content adapters: MA glue carries a fallback client so non-MA zones
    // with a player binding can still play provider content.
    let adapters = AdapterRegistry::new();
    let fallback_client = config
        .musicassistant
        .as_ref()
        .map(|ma| RpcClient::new(format!("ws://{}:{}/ws", ma.host, ma.port)));
    adapters.register(
        "musicassistant",
        Arc::new(MusicAssistantContentAdapter::new(fallback_client.clone())),
    );
    adapters.register(
        "beolink",
        Arc::new(MusicAssistantContentAdapter::new(fallback_client)),
    );

    // Zone runtime.
    let manager = ZoneManager::new(bus.clone(), adapters);
    manager.apply_config(&config).await;
    tracing::info!("Zone manager initialized");

    // Favorites store and alert resolver.
    let favorites = Arc::new(FavoritesStore::new(
        config::get_data_dir().join("favorites"),
        bus.clone(),
    ));
    let alerts = Arc::new(AlertResolver::new(config::get_public_dir(), None));
    let alerts_base = audioserver::alerts::alerts_url_base(
        config.alerts.host.as_deref(),
        config.alerts.port,
        config.app_http_port,
    );

    let shutdown = CancellationToken::new();
    let state = AppState {
        router: Arc::new(
            CommandRouter::new(manager.clone(), favorites)
                .with_alerts(alerts.clone(), alerts_base),
        ),
        alerts,
        bus: bus.clone(),
        shutdown: shutdown.clone(),
    };

    // Two listeners, one route tree: the app surface and the miniserver
    // surface answer identically.
    let app_addr = SocketAddr::from(([0, 0, 0, 0], config.app_http_port));
    let ms_addr = SocketAddr::from(([0, 0, 0, 0], config.ms_http_port));
    let app_router = api::build_router(state.clone());
    let ms_router = api::build_router(state);

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let (app_result, ms_result) = tokio::join!(
        api::serve(app_router, app_addr, shutdown.clone()),
        api::serve(ms_router, ms_addr, shutdown.clone()),
    );
    app_result?;
    ms_result?;

    tracing::info!("Shutting down backends...");
    manager.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
#[allow(clippy::expect_used)] // Signal handlers must succeed for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
