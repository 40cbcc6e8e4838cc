//! HTTP server exposing capability invocation and classification.
//!
//! Lets the external orchestrator (decision maker + session store) drive the
//! dispatch core over HTTP.
//!
//! # Endpoints
//!
//! - `GET  /health`               - Liveness probe
//! - `GET  /capabilities`         - Capability listing
//! - `POST /capabilities/execute` - Single invocation through the policy gate
//! - `POST /capabilities/batch`   - Batch invocation
//! - `POST /classify`             - Slide classification
//! - `POST /generate`             - Direct variant dispatch

pub mod routes;

pub use routes::{app_router, status_for, AppState};
