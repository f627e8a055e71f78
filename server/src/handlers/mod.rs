pub mod news_handlers;
pub mod upload_handlers;

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

pub type ApiError = (StatusCode, Json<Value>);

pub fn server_error<E: std::fmt::Display>(err: E) -> ApiError {
    tracing::error!(%err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "Internal Server Error" })),
    )
}

pub fn not_found() -> ApiError {
    (StatusCode::NOT_FOUND, Json(json!({ "message": "Not found" })))
}

pub fn bad_request(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "message": message })))
}
