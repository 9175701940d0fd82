//! HTTP API surface.
//!
//! - `/api/v1/service` — signed Service API for the storefront backend
//! - `/api/v1/gateway` — buyer redirects and gateway notifications

pub mod extractors;
pub mod gateway;
pub mod service;

use crate::state::AppState;
use axum::Router;

/// Mount every API router under its versioned prefix.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1/service", service::router())
        .nest("/api/v1/gateway", gateway::router())
}
