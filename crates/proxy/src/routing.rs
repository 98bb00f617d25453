//! Routing state manager
//!
//! Owns every decision that must stay consistent across router replicas:
//! which backend a client is bound to, how many live sessions a backend
//! currently holds, and which backend should take the next new session.
//! All of it is expressed as reads and pipelined writes against the
//! coordination store; nothing is cached in process.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::{backend_key, client_key, epoch_millis, SessionStore, StoreError};

/// Request header carrying an already-assigned client id.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Routing failure.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no available backend found")]
    NoAvailableBackend,

    #[error("no backend mapped for client {client_id}")]
    Unmapped { client_id: String },
}

/// Return the caller-supplied client id, or mint a fresh one.
///
/// The header lookup is case-insensitive; an empty value counts as absent.
pub fn derive_client_id(headers: &HeaderMap) -> String {
    headers
        .get(CLIENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Sticky client-to-backend routing over the coordination store.
pub struct SessionRouter {
    store: Arc<dyn SessionStore>,
    backends: Vec<String>,
    max_sessions: usize,
    mapping_ttl: Duration,
}

impl SessionRouter {
    pub fn new(
        store: Arc<dyn SessionStore>,
        backends: Vec<String>,
        max_sessions: usize,
        mapping_ttl: Duration,
    ) -> Self {
        Self {
            store,
            backends,
            max_sessions,
            mapping_ttl,
        }
    }

    /// The static backend set, in selection-priority order.
    pub fn backends(&self) -> &[String] {
        &self.backends
    }

    /// Backend for this client: the existing mapping when one is live,
    /// otherwise the least-loaded backend with free capacity.
    ///
    /// Selection and the subsequent [`record_session`] are two separate
    /// round-trips by design; concurrent starts for one client may race and
    /// the last mapping written wins (see DESIGN.md).
    ///
    /// [`record_session`]: SessionRouter::record_session
    pub async fn assign_backend(&self, client_id: &str) -> Result<String, RoutingError> {
        match self.store.get(&client_key(client_id)).await? {
            Some(backend) => {
                debug!(client_id = %client_id, backend = %backend, "reusing existing mapping");
                Ok(backend)
            }
            None => self.least_loaded().await,
        }
    }

    /// Backend for a client that must already be mapped (the stop path).
    pub async fn lookup_backend(&self, client_id: &str) -> Result<String, RoutingError> {
        self.store
            .get(&client_key(client_id))
            .await?
            .ok_or_else(|| RoutingError::Unmapped {
                client_id: client_id.to_string(),
            })
    }

    /// Pick the backend with the strictly smallest live-session count that is
    /// also strictly below the cap. Ties go to the earlier backend in the
    /// configured order. Backends whose count cannot be read are skipped.
    async fn least_loaded(&self) -> Result<String, RoutingError> {
        let now = epoch_millis();
        let window_start = now - self.mapping_ttl.as_millis() as i64;

        let mut fewest = self.max_sessions as u64;
        let mut chosen: Option<&str> = None;

        for backend in &self.backends {
            let live = match self
                .store
                .count_score_range(&backend_key(backend), window_start, now)
                .await
            {
                Ok(count) => count,
                Err(err) => {
                    warn!(backend = %backend, error = %err, "skipping backend: live-session count failed");
                    continue;
                }
            };

            if live < fewest {
                fewest = live;
                chosen = Some(backend);
            }
        }

        match chosen {
            Some(backend) => {
                debug!(backend = %backend, live_sessions = fewest, "selected least-loaded backend");
                Ok(backend.to_string())
            }
            None => Err(RoutingError::NoAvailableBackend),
        }
    }

    /// Bind a client to a backend: forward mapping with the TTL plus an
    /// active-set entry scored with the current time, in one pipeline.
    pub async fn record_session(&self, backend: &str, client_id: &str) -> Result<(), RoutingError> {
        self.store
            .record(
                &client_key(client_id),
                backend,
                self.mapping_ttl,
                &backend_key(backend),
                client_id,
                epoch_millis(),
            )
            .await?;
        Ok(())
    }

    /// Drop a client from a backend's active set. The forward mapping is
    /// left to expire through its TTL.
    pub async fn clear_session(&self, backend: &str, client_id: &str) -> Result<(), RoutingError> {
        let removed = self
            .store
            .remove_member(&backend_key(backend), client_id)
            .await?;
        debug!(backend = %backend, client_id = %client_id, removed, "cleared session");
        Ok(())
    }
}
