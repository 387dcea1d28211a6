use axum::routing::get;
use axum::Router;

pub mod canister;
pub mod delivery;
pub mod system;

/// Full HTTP router for the canister service (spec §6).
pub fn router() -> Router {
    Router::new()
        .route("/ping", get(system::ping))
        .nest("/api/v1/canister", canister::router())
        .nest("/api/v1/delivery", delivery::router())
}
