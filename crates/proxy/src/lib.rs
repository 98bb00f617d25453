//! Switchboard session router
//!
//! A stateful admission router in front of a fixed pool of backend workers
//! hosting long-lived conversational-AI sessions. It provides:
//!
//! - **Sticky routing**: a client's first successful start binds it to one
//!   backend; later calls follow the binding
//! - **Least-loaded selection** with a soft per-backend session cap
//! - **Shared state** in a Redis-compatible coordination store, so replicas
//!   and restarts need no coordination of their own
//! - **Lazy expiry**: liveness is a score range over creation times; stale
//!   entries are reclaimed in the background
//!
//! The binary lives in `main.rs`; everything here is library surface so the
//! integration tests can assemble the router against test doubles.

// ============================================================================
// Module Declarations
// ============================================================================

pub mod app;
pub mod errors;
pub mod handlers;
pub mod headers;
pub mod reclaim;
pub mod routing;
pub mod store;
pub mod upstream;

// ============================================================================
// Public API Re-exports
// ============================================================================

// Application state
pub use app::{build_router, AppState};

// Error taxonomy
pub use errors::RouterError;

// Request handling
pub use handlers::AgentRequest;

// Header middleware
pub use headers::HttpHeaders;

// Routing state
pub use routing::{derive_client_id, RoutingError, SessionRouter, CLIENT_ID_HEADER};

// Coordination store
pub use store::{RedisStore, SessionStore, StoreError};

// Backend client
pub use upstream::{BackendClient, DEFAULT_BACKEND_PORT};
