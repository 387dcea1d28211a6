//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: infrastructure wiring (event store/bus, projections, dispatcher, queue consumer)
//! - `routes/`: HTTP routes + handlers (one file per domain area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses (spec §7)

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use crate::config::Config;

/// Build the full HTTP router and wire the background infrastructure
/// (projection dispatcher, queue consumer) that runs alongside it. There is
/// no auth/tenant layer here: spec.md has no such concept.
pub async fn build_app(config: &Config) -> (Router, Arc<services::AppServices>) {
    let app_services = Arc::new(services::build_services(config));

    let router = routes::router()
        .layer(Extension(app_services.clone()))
        .layer(ServiceBuilder::new());

    (router, app_services)
}
