//! LearnTrac Auth Bridge
//!
//! Entry point for the authentication bridge between the identity provider
//! and the LearnTrac ticketing application.

use auth_bridge::auth::HttpJwksFetcher;
use auth_bridge::config::{Config, LogFormat};
use auth_bridge::observability::metrics::init_metrics_recorder;
use auth_bridge::routes::{self, AppState};
use auth_bridge::session::InMemorySessionStore;
use auth_bridge::tasks::start_session_sweeper;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first so the log format is known
    let config = Config::from_env();

    let log_format = config
        .as_ref()
        .map(|c| c.log_format)
        .unwrap_or(LogFormat::Pretty);
    init_tracing(log_format);

    info!("Starting LearnTrac Auth Bridge");

    let config = config.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        issuer = %config.issuer,
        jwks_uri = %config.jwks_uri,
        bind_address = %config.bind_address,
        clock_skew_seconds = config.clock_skew_seconds,
        session_max_lifetime_seconds = config.session_max_lifetime_seconds,
        "Configuration loaded successfully"
    );

    // Initialize Prometheus metrics recorder
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    let fetcher = Arc::new(HttpJwksFetcher::new(config.jwks_uri.clone()));
    let store = Arc::new(InMemorySessionStore::new());

    // Parse bind address before moving config
    let bind_address = config.bind_address.clone();
    let drain_seconds = config.drain_seconds;
    let sweep_interval = Duration::from_secs(config.session_sweep_interval_seconds);

    // Create application state
    let state = Arc::new(AppState::new(config, fetcher, store));

    // Warm the key cache; failure is not fatal, /ready reports it
    match state.resolver.ensure_loaded().await {
        Ok(count) => info!(key_count = count, "Signing keys loaded"),
        Err(e) => warn!(error = %e, "Signing keys unavailable at startup"),
    }

    let cancel_token = CancellationToken::new();
    let sweeper = tokio::spawn(start_session_sweeper(
        Arc::clone(&state.sessions),
        sweep_interval,
        cancel_token.clone(),
    ));

    // Build application routes
    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Auth Bridge listening on {}", addr);

    // Start server with graceful shutdown support
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(drain_seconds))
        .await?;

    cancel_token.cancel();
    if let Err(e) = sweeper.await {
        warn!("Session sweeper task ended abnormally: {}", e);
    }

    info!("Auth Bridge shutdown complete");

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "auth_bridge=debug,bridge=info,tower_http=debug".into());

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and drain period is complete.
async fn shutdown_signal(drain_secs: u64) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (BRIDGE_DRAIN_SECONDS=0)");
    }
}
