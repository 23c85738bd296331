use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Liveness check: the process is up and serving.
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}
