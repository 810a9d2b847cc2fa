use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use tracing::error;

use crate::api::{ErrorBody, error_response};
use crate::app::AppState;
use crate::catalog::CourseView;

#[derive(Debug, Deserialize)]
pub(crate) struct LookupCourseRequest {
    course_name: String,
    date: String,
    token: String,
}

/// Looks a lecture up by title and date. A lecture the database has never
/// seen is ingested from the campus live-course listing on the way, so a
/// successful lookup guarantees a course row exists for later summary
/// requests.
pub(crate) async fn lookup(
    State(state): State<AppState>,
    Json(request): Json<LookupCourseRequest>,
) -> Result<Json<CourseView>, (StatusCode, Json<ErrorBody>)> {
    let view = state
        .catalog()
        .lookup(&request.token, &request.date, &request.course_name)
        .await
        .map_err(|error| {
            error!(
                course_name = %request.course_name,
                date = %request.date,
                error = %format!("{error:#}"),
                "course lookup failed"
            );
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "course lookup failed")
        })?;

    let Some(view) = view else {
        return Err(error_response(StatusCode::NOT_FOUND, "course not found"));
    };
    Ok(Json(view))
}
