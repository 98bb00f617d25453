//! Request handlers
//!
//! `/start_agent` and `/stop_agent` validate the body, pick the backend,
//! proxy the call, and rewrite the upstream JSON object with the client id.
//! Upstream status codes pass through untouched; there are no retries.
//! `/health` probes every backend and `/ping` answers locally.

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

use crate::app::AppState;
use crate::errors::RouterError;
use crate::routing::derive_client_id;

/// Backend path for opening a session; also the liveness-probe target.
pub const START_PATH: &str = "/start_agent";

/// Backend path for closing a session.
pub const STOP_PATH: &str = "/stop_agent";

/// Response field the router injects into every proxied reply.
const CLIENT_ID_FIELD: &str = "clientID";

/// Body shared by the start and stop endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub channel_name: String,
    pub uid: i64,
}

impl AgentRequest {
    fn validate(&self) -> Result<(), RouterError> {
        if self.channel_name.is_empty() {
            return Err(RouterError::Validation("channel_name is required"));
        }
        Ok(())
    }
}

fn parse_body(body: &Bytes) -> Result<AgentRequest, RouterError> {
    let request: AgentRequest = serde_json::from_slice(body).map_err(|err| {
        warn!(error = %err, "failed to parse request body");
        RouterError::InvalidBody
    })?;
    // A zero uid is indistinguishable from an absent one and is rejected the
    // same way, before field validation.
    if request.uid == 0 {
        return Err(RouterError::InvalidBody);
    }
    request.validate()?;
    Ok(request)
}

/// Open a session: route the client to a backend and proxy the call there.
pub async fn start_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RouterError> {
    let request = parse_body(&body)?;
    let client_id = derive_client_id(&headers);

    let backend = state
        .router
        .assign_backend(&client_id)
        .await
        .map_err(RouterError::Assign)?;

    let upstream = state
        .upstream
        .forward(&backend, START_PATH, &request)
        .await
        .map_err(RouterError::UpstreamUnreachable)?;

    let (status, payload) = augment_response(upstream, &client_id).await?;

    // Only a session the backend accepted is recorded; a failure here is
    // repaired by the reclaimer, not surfaced to a caller who already has a
    // successful reply in hand.
    if status.is_success() {
        if let Err(err) = state.router.record_session(&backend, &client_id).await {
            error!(backend = %backend, client_id = %client_id, error = %err, "failed to record session after successful start");
        }
    }

    info!(backend = %backend, client_id = %client_id, status = %status, "start request proxied");
    Ok((status, Json(Value::Object(payload))).into_response())
}

/// Close a session on the backend the client is mapped to.
pub async fn stop_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RouterError> {
    let request = parse_body(&body)?;
    let client_id = derive_client_id(&headers);

    let backend = state
        .router
        .lookup_backend(&client_id)
        .await
        .map_err(RouterError::Lookup)?;

    let upstream = state
        .upstream
        .forward(&backend, STOP_PATH, &request)
        .await
        .map_err(RouterError::UpstreamUnreachable)?;

    let (status, payload) = augment_response(upstream, &client_id).await?;

    if status.is_success() {
        if let Err(err) = state.router.clear_session(&backend, &client_id).await {
            error!(backend = %backend, client_id = %client_id, error = %err, "failed to clear session after successful stop");
        }
    }

    info!(backend = %backend, client_id = %client_id, status = %status, "stop request proxied");
    Ok((status, Json(Value::Object(payload))).into_response())
}

/// Read the upstream body fully, require a JSON object, and inject the
/// client id so the caller can adopt it for later calls.
async fn augment_response(
    upstream: reqwest::Response,
    client_id: &str,
) -> Result<(StatusCode, Map<String, Value>), RouterError> {
    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);

    let body = upstream.bytes().await.map_err(RouterError::UpstreamRead)?;
    let mut payload: Map<String, Value> =
        serde_json::from_slice(&body).map_err(RouterError::UpstreamParse)?;
    payload.insert(
        CLIENT_ID_FIELD.to_string(),
        Value::String(client_id.to_string()),
    );

    Ok((status, payload))
}

/// Probe every backend and report its status line. Purely informational;
/// results never change routing.
pub async fn health(State(state): State<AppState>) -> Json<BTreeMap<String, String>> {
    let mut results = BTreeMap::new();

    for backend in state.router.backends() {
        let report = match state.upstream.probe(backend, START_PATH).await {
            Ok(status) => format!("Status: {}", status_line(status)),
            Err(err) => format!("Error: {err}"),
        };
        results.insert(backend.clone(), report);
    }

    Json(results)
}

/// Full status line as backends' HTTP stacks report it: numeric code plus
/// the canonical reason phrase, when one exists.
fn status_line(status: reqwest::StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_u16()),
        None => status.as_u16().to_string(),
    }
}

/// Local liveness check for the router itself.
pub async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}
