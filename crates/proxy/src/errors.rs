//! Error taxonomy for the request path
//!
//! Each variant maps onto exactly one client-visible failure surface; the
//! `Display` string is the `error` field of the JSON body, and the wrapped
//! source becomes the `details` field where that surface carries one.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::routing::RoutingError;

/// A request-path failure, ready to render as a JSON error response.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Body was not valid JSON for the expected shape. No details are
    /// exposed to the caller.
    #[error("Invalid request body")]
    InvalidBody,

    /// Body parsed but failed a field check; the message is caller-facing.
    #[error("{0}")]
    Validation(&'static str),

    /// Backend selection failed: the store misbehaved or every backend is
    /// at the cap.
    #[error("Error assigning backend")]
    Assign(#[source] RoutingError),

    /// Stop-path lookup failed, including the unknown-client case.
    #[error("Error retrieving backend")]
    Lookup(#[source] RoutingError),

    /// The backend could not be reached (connect failure or timeout).
    #[error("Failed to reach backend service")]
    UpstreamUnreachable(#[source] reqwest::Error),

    /// The backend answered but its body could not be read.
    #[error("Error reading response body")]
    UpstreamRead(#[source] reqwest::Error),

    /// The backend answered but its body was not a JSON object.
    #[error("Error parsing response body")]
    UpstreamParse(#[source] serde_json::Error),
}

impl RouterError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidBody | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Assign(_) | Self::Lookup(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamRead(_) | Self::UpstreamParse(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            Self::InvalidBody | Self::Validation(_) => None,
            Self::Assign(source) | Self::Lookup(source) => Some(source.to_string()),
            Self::UpstreamUnreachable(source) | Self::UpstreamRead(source) => {
                Some(source.to_string())
            }
            Self::UpstreamParse(source) => Some(source.to_string()),
        }
    }
}

impl IntoResponse for RouterError {
    fn into_response(self) -> Response {
        let status = self.status();
        let details = self.details();

        if status.is_server_error() {
            error!(status = %status, error = %self, details = details.as_deref().unwrap_or(""), "request failed");
        }

        let mut body = json!({ "error": self.to_string() });
        if let Some(details) = details {
            body["details"] = details.into();
        }
        (status, Json(body)).into_response()
    }
}
