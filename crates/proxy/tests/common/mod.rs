//! Shared fixtures for the router integration tests
//!
//! Provides an in-memory `SessionStore` double and a helper that serves the
//! full router on an ephemeral port, so the tests drive real HTTP against
//! stub backends without external infrastructure.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use switchboard_proxy::app::{build_router, AppState};
use switchboard_proxy::headers::HttpHeaders;
use switchboard_proxy::routing::SessionRouter;
use switchboard_proxy::store::{SessionStore, StoreError};
use switchboard_proxy::upstream::BackendClient;

/// In-memory stand-in for the coordination store.
#[derive(Default)]
pub struct MemoryStore {
    strings: Mutex<HashMap<String, (String, Instant)>>,
    sets: Mutex<HashMap<String, HashMap<String, i64>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an active-set entry directly, without a forward mapping.
    pub fn insert_member(&self, set_key: &str, member: &str, score: i64) {
        self.sets
            .lock()
            .unwrap()
            .entry(set_key.to_string())
            .or_default()
            .insert(member.to_string(), score);
    }

    /// Score of a member, if present.
    pub fn member_score(&self, set_key: &str, member: &str) -> Option<i64> {
        self.sets
            .lock()
            .unwrap()
            .get(set_key)
            .and_then(|members| members.get(member).copied())
    }

    /// Remaining lifetime of a string key, if present and unexpired.
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.strings
            .lock()
            .unwrap()
            .get(key)
            .map(|(_, expires_at)| expires_at.saturating_duration_since(Instant::now()))
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut strings = self.strings.lock().unwrap();
        match strings.get(key) {
            Some((_, expires_at)) if *expires_at <= Instant::now() => {
                strings.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.strings
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn record(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        set_key: &str,
        member: &str,
        score: i64,
    ) -> Result<(), StoreError> {
        self.set_with_expiry(key, value, ttl).await?;
        self.insert_member(set_key, member, score);
        Ok(())
    }

    async fn remove_member(&self, set_key: &str, member: &str) -> Result<u64, StoreError> {
        let removed = self
            .sets
            .lock()
            .unwrap()
            .get_mut(set_key)
            .and_then(|members| members.remove(member));
        Ok(u64::from(removed.is_some()))
    }

    async fn count_score_range(
        &self,
        set_key: &str,
        min: i64,
        max: i64,
    ) -> Result<u64, StoreError> {
        let count = self
            .sets
            .lock()
            .unwrap()
            .get(set_key)
            .map(|members| {
                members
                    .values()
                    .filter(|score| (min..=max).contains(*score))
                    .count()
            })
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn purge_score_range(
        &self,
        set_keys: &[String],
        min: i64,
        max: i64,
    ) -> Result<(), StoreError> {
        let mut sets = self.sets.lock().unwrap();
        for set_key in set_keys {
            if let Some(members) = sets.get_mut(set_key) {
                members.retain(|_, score| !(min..=max).contains(score));
            }
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// A running router plus handles into its backing store.
pub struct TestApp {
    pub addr: SocketAddr,
    pub store: Arc<MemoryStore>,
    pub http: reqwest::Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

/// Serve the full router on an ephemeral port.
pub async fn spawn_app(
    backends: Vec<&str>,
    max_per_backend: usize,
    mapping_ttl: Duration,
    allow_origin: &str,
    backend_port: u16,
) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn SessionStore> = store.clone();

    let router = Arc::new(SessionRouter::new(
        dyn_store,
        backends.into_iter().map(str::to_string).collect(),
        max_per_backend,
        mapping_ttl,
    ));
    let state = AppState {
        router,
        upstream: BackendClient::new(backend_port).unwrap(),
    };
    let app = build_router(state, HttpHeaders::new(allow_origin));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        addr,
        store,
        http: reqwest::Client::new(),
    }
}

/// A local port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
