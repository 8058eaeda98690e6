//! The Projection Service daemon: a host-wide, multi-process-safe cache
//! of projection matrices reached over a loopback HTTP port. A second
//! instance that loses the port claim exits cleanly rather than racing
//! the incumbent.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use gitvec_core::projection::registry::PortRegistry;
use gitvec_server::app_state::MatrixdState;
use gitvec_server::handlers::matrixd::{health_handler, multiply_handler, shutdown_handler, stats_handler};

/// Per-entry TTL: `/stats` entries older than this are dropped by the
/// eviction scanner.
const MATRIX_TTL: Duration = Duration::from_secs(60 * 60);
/// Eviction scanner cadence.
const EVICTION_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Shut the whole daemon down after this long with nothing reached.
const IDLE_SHUTDOWN: Duration = Duration::from_secs(60 * 60);
/// How often the idle-shutdown timer checks.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();

    let registry = PortRegistry::new();
    if let Err(e) = registry.claim(port, std::process::id()) {
        tracing::info!("another matrixd instance is already running: {e}");
        return Ok(());
    }

    let state = Arc::new(MatrixdState::new());

    let eviction_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(EVICTION_INTERVAL);
        loop {
            ticker.tick().await;
            let evicted = eviction_state.evict_older_than(MATRIX_TTL);
            if evicted > 0 {
                tracing::info!(evicted, "evicted stale projection matrices");
            }
        }
    });

    let idle_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(IDLE_CHECK_INTERVAL);
        loop {
            ticker.tick().await;
            if idle_state.idle_minutes() * 60.0 >= IDLE_SHUTDOWN.as_secs_f64() {
                tracing::info!("idle for an hour, shutting down");
                std::process::exit(0);
            }
        }
    });

    let registry_for_signal = PortRegistry::new();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("received shutdown signal");
        let _ = registry_for_signal.clear();
        std::process::exit(0);
    });

    let app = Router::new()
        .route("/multiply", post(multiply_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/shutdown", post(shutdown_handler))
        .with_state(state);

    tracing::info!("matrixd listening on 127.0.0.1:{port}");
    listener.set_nonblocking(true)?;
    let listener = tokio::net::TcpListener::from_std(listener)?;
    axum::serve(listener, app).await?;

    let _ = registry.clear();
    Ok(())
}

/// Resolves on either Ctrl-C or SIGTERM; a no-op future on platforms
/// without `SIGTERM` (anything but unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
