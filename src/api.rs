pub(crate) mod course;
pub(crate) mod health;
pub(crate) mod summary;

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::app::AppState;

#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    error: String,
}

pub(crate) fn error_response(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<ErrorBody>) {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/v1/course/lookup", post(course::lookup))
        .route("/v1/summary/generate", post(summary::generate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
