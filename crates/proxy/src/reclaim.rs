//! Background reclamation workers
//!
//! The active sets hold entries until something removes them: a stop call,
//! or these sweepers. Liveness counting already ignores entries outside the
//! TTL window, so the sweeps only keep the sorted sets from growing without
//! bound. Errors are logged and the loops keep ticking.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info};

use crate::store::{backend_key, epoch_millis, epoch_secs, SessionStore, LOGOUT_TOKENS_KEY};

/// How often expired active-set entries are reclaimed.
const STALE_SWEEP_PERIOD: Duration = Duration::from_secs(5 * 60);

/// How often expired logout tokens are reclaimed.
const TOKEN_SWEEP_PERIOD: Duration = Duration::from_secs(60 * 60);

/// Spawn both sweepers. They run until the shutdown channel fires.
pub fn spawn(
    store: Arc<dyn SessionStore>,
    backends: Vec<String>,
    mapping_ttl: Duration,
    shutdown: &broadcast::Sender<()>,
) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(stale_mapping_loop(
            store.clone(),
            backends,
            mapping_ttl,
            shutdown.subscribe(),
        )),
        tokio::spawn(expired_token_loop(store, shutdown.subscribe())),
    ]
}

async fn stale_mapping_loop(
    store: Arc<dyn SessionStore>,
    backends: Vec<String>,
    mapping_ttl: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let set_keys: Vec<String> = backends.iter().map(|b| backend_key(b)).collect();
    let mut ticker = interval_at(Instant::now() + STALE_SWEEP_PERIOD, STALE_SWEEP_PERIOD);
    info!("stale-mapping sweeper started");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("stale-mapping sweeper stopping");
                return;
            }
            _ = ticker.tick() => {
                sweep_stale_mappings(store.as_ref(), &set_keys, mapping_ttl).await;
            }
        }
    }
}

/// Drop every active-set entry whose score fell out of the TTL window.
pub async fn sweep_stale_mappings(
    store: &dyn SessionStore,
    set_keys: &[String],
    mapping_ttl: Duration,
) {
    let cutoff = epoch_millis() - mapping_ttl.as_millis() as i64;
    debug!(cutoff, sets = set_keys.len(), "sweeping stale session mappings");

    if let Err(err) = store.purge_score_range(set_keys, 0, cutoff).await {
        error!(error = %err, "stale-mapping sweep failed");
    }
}

async fn expired_token_loop(store: Arc<dyn SessionStore>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = interval_at(Instant::now() + TOKEN_SWEEP_PERIOD, TOKEN_SWEEP_PERIOD);
    info!("expired-token sweeper started");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("expired-token sweeper stopping");
                return;
            }
            _ = ticker.tick() => {
                sweep_expired_tokens(store.as_ref()).await;
            }
        }
    }
}

/// Drop logout tokens whose second-unit score has passed. Nothing in this
/// service writes that set; the sweep keeps the shared schema tidy.
pub async fn sweep_expired_tokens(store: &dyn SessionStore) {
    let keys = [LOGOUT_TOKENS_KEY.to_string()];
    if let Err(err) = store.purge_score_range(&keys, 0, epoch_secs()).await {
        error!(error = %err, "expired-token sweep failed");
    }
}
