//! `/api/v1/delivery` endpoints (spec §6).

use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use canister_core::AggregateId;
use canister_infra::envelope::OuterEnvelope;

use crate::app::dto::{committed_to_json, delivery_note_row_to_json};
use crate::app::errors::{dispatch_error_to_response, json_error};
use crate::app::routes::canister::EventEnvelopeRequest;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/events", post(post_events))
        .route("/:id", get(get_by_id))
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
        Err(_) => return json_error(axum::http::StatusCode::BAD_REQUEST, "bad_input", "invalid delivery note id"),
    };

    match services.delivery_relational.get_note(id) {
        Some(row) => {
            let items = services.delivery_relational.items_for(id);
            Json(delivery_note_row_to_json(row, items)).into_response()
        }
        None => json_error(axum::http::StatusCode::NOT_FOUND, "not_found", "delivery note not found"),
    }
}
