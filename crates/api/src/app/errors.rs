//! Maps `DispatchError` onto HTTP responses per spec §7's taxonomy table.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use canister_infra::command_dispatcher::DispatchError;

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::BadInput(msg) => json_error(StatusCode::BAD_REQUEST, "bad_input", msg),
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "aggregate not found"),
        DispatchError::AlreadyExists => json_error(StatusCode::CONFLICT, "already_exists", "aggregate already exists"),
        DispatchError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Transient(msg) => json_error(StatusCode::SERVICE_UNAVAILABLE, "transient", msg),
        DispatchError::Fatal(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "fatal", msg),
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
