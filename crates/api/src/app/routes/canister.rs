//! `/api/v1/canister` endpoints (spec §6).

use std::sync::Arc;

use axum::extract::{Extension, Path, Query};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use canister_core::AggregateId;
use canister_infra::envelope::OuterEnvelope;

use crate::app::dto::{canister_row_to_json, committed_to_json};
use crate::app::errors::{dispatch_error_to_response, json_error};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/events", post(post_events))
        .route("/:id", get(get_by_id))
        .route("/distribution", get(get_distribution))
}

#[derive(Debug, Deserialize)]
pub struct EventEnvelopeRequest {
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub data: JsonValue,
}

async fn post_events(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<EventEnvelopeRequest>,
) -> axum::response::Response {
    let outer = OuterEnvelope { event_type: body.event_type, data: body.data };

    let decoded = match canister_infra::envelope::decode_outer(&outer, AggregateId::new) {
        Ok(d) => d,
        Err(err) => return json_error(axum::http::StatusCode::BAD_REQUEST, "bad_input", err.to_string()),
    };

    match services.dispatch_with_deadline(decoded).await {
        Ok(committed) => (axum::http::StatusCode::CREATED, Json(committed_to_json(&committed))).into_response(),
        Err(err) => dispatch_error_to_response(err),
    }
}

async fn get_by_id(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: AggregateId = match id.parse() {
        Ok(id) => id,
        Err(_) => return json_error(axum::http::StatusCode::BAD_REQUEST, "bad_input", "invalid canister id"),
    };

    match services.canister_relational.get(id) {
        Some(row) => Json(canister_row_to_json(row)).into_response(),
        None => json_error(axum::http::StatusCode::NOT_FOUND, "not_found", "canister not found"),
    }
}

#[derive(Debug, Deserialize)]
pub struct DistributionQuery {
    pub organisation_id: String,
}

async fn get_distribution(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<DistributionQuery>,
) -> axum::response::Response {
    let rows = services.canister_relational.list_ready_for_use(&params.organisation_id);
    Json(rows.into_iter().map(canister_row_to_json).collect::<Vec<_>>()).into_response()
}
