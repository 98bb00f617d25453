//! Router assembly
//!
//! Wires shared state into the HTTP surface: the routed endpoints get the
//! full middleware stack, `/ping` stays outside it, and request-level
//! tracing wraps everything.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::handlers::{self, START_PATH, STOP_PATH};
use crate::headers::{self, HttpHeaders};
use crate::routing::SessionRouter;
use crate::upstream::BackendClient;

/// Shared per-request state.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<SessionRouter>,
    pub upstream: BackendClient,
}

/// Build the full HTTP surface.
pub fn build_router(state: AppState, http_headers: HttpHeaders) -> Router {
    let policy = Arc::new(http_headers);

    let routed = Router::new()
        .route(START_PATH, post(handlers::start_agent))
        .route(STOP_PATH, post(handlers::stop_agent))
        .route("/health", get(handlers::health))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn_with_state(policy, headers::cors))
                .layer(middleware::from_fn(headers::no_cache))
                .layer(middleware::from_fn(headers::timestamp)),
        );

    Router::new()
        .merge(routed)
        .route("/ping", get(handlers::ping))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
