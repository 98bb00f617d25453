//! Switchboard - session-sticky admission router
//!
//! Loads configuration from the environment, verifies the coordination
//! store answers, then serves the routing endpoints until SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use switchboard_config::RouterConfig;
use switchboard_proxy::{
    app::{build_router, AppState},
    reclaim,
    routing::SessionRouter,
    store::{RedisStore, SessionStore},
    upstream::{BackendClient, DEFAULT_BACKEND_PORT},
    HttpHeaders,
};

/// How long in-flight requests get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RouterConfig::from_env().context("failed to load configuration")?;
    info!(
        backends = ?config.backend_ips,
        max_per_backend = config.max_requests_per_backend,
        mapping_ttl_secs = config.mapping_ttl.as_secs(),
        port = config.port,
        "configuration loaded"
    );

    let store = RedisStore::connect(&config.redis_url)
        .await
        .context("failed to connect to coordination store")?;
    info!("coordination store reachable");
    let store: Arc<dyn SessionStore> = Arc::new(store);

    let session_router = Arc::new(SessionRouter::new(
        store.clone(),
        config.backend_ips.clone(),
        config.max_requests_per_backend,
        config.mapping_ttl,
    ));
    let upstream =
        BackendClient::new(DEFAULT_BACKEND_PORT).context("failed to build backend HTTP client")?;

    let state = AppState {
        router: session_router,
        upstream,
    };
    let app = build_router(state, HttpHeaders::new(&config.allow_origin));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let _reclaimers = reclaim::spawn(
        store,
        config.backend_ips.clone(),
        config.mapping_ttl,
        &shutdown_tx,
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening for HTTP traffic");

    let mut server_shutdown = shutdown_tx.subscribe();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.recv().await;
            })
            .await
    });

    shutdown_signal().await;
    info!("shutdown signal received, draining connections");
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(joined) => {
            joined
                .context("server task panicked")?
                .context("server error")?;
        }
        Err(_) => {
            error!(
                grace_secs = SHUTDOWN_GRACE.as_secs(),
                "graceful shutdown deadline exceeded, aborting in-flight requests"
            );
            std::process::exit(1);
        }
    }

    info!("server exited cleanly");
    Ok(())
}

/// Resolve when the process receives SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = signal::ctrl_c();

    match signal::unix::signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                result = ctrl_c => {
                    if let Err(err) = result {
                        error!(error = %err, "failed to listen for SIGINT");
                    }
                }
                _ = sigterm.recv() => {}
            }
        }
        Err(err) => {
            error!(error = %err, "failed to install SIGTERM handler");
            if let Err(err) = ctrl_c.await {
                error!(error = %err, "failed to listen for SIGINT");
            }
        }
    }
}
