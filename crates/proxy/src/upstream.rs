//! HTTP client for the backend workers
//!
//! One shared `reqwest::Client` with a fixed overall timeout; every backend
//! exposes the agent endpoints on the same well-known port. Cancellation of
//! an inbound request drops the handler future and with it the in-flight
//! upstream call.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;

/// Port every backend worker listens on.
pub const DEFAULT_BACKEND_PORT: u16 = 8080;

/// Overall deadline for one upstream call (connect through body).
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared client for proxying to backend workers.
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    port: u16,
}

impl BackendClient {
    /// Build the shared client. `port` is [`DEFAULT_BACKEND_PORT`] in
    /// production; tests point it at stub servers.
    pub fn new(port: u16) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(UPSTREAM_TIMEOUT).build()?;
        Ok(Self { http, port })
    }

    fn endpoint(&self, backend: &str, path: &str) -> String {
        format!("http://{backend}:{}{path}", self.port)
    }

    /// POST a JSON body to a backend endpoint and hand back the raw
    /// response; the caller decides how to treat the status.
    pub async fn forward<T: Serialize>(
        &self,
        backend: &str,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.http
            .post(self.endpoint(backend, path))
            .json(body)
            .send()
            .await
    }

    /// Liveness probe: a plain GET against the start endpoint. The status
    /// is reported back to the caller and never feeds routing decisions.
    pub async fn probe(&self, backend: &str, path: &str) -> Result<StatusCode, reqwest::Error> {
        let response = self.http.get(self.endpoint(backend, path)).send().await?;
        Ok(response.status())
    }
}
