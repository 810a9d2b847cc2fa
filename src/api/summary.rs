use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::api::{ErrorBody, error_response};
use crate::app::AppState;
use crate::queue::Job;
use crate::store::SUMMARY_STATUS_GENERATING;
use crate::summary::{SummaryJob, SummaryTask};

#[derive(Debug, Deserialize)]
pub(crate) struct GenerateSummaryRequest {
    token: String,
    sub_id: i64,
    #[serde(default)]
    task: SummaryTask,
}

#[derive(Debug, Serialize)]
pub(crate) struct GenerateSummaryResponse {
    sub_id: i64,
    summary_status: &'static str,
}

/// Accepts a summary request and answers immediately; progress is observed
/// by polling the course row's `summary_status`.
pub(crate) async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateSummaryRequest>,
) -> Result<Json<GenerateSummaryResponse>, (StatusCode, Json<ErrorBody>)> {
    let course = state
        .courses()
        .find(request.sub_id)
        .await
        .map_err(|error| {
            error!(sub_id = request.sub_id, error = %format!("{error:#}"), "course lookup failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "course lookup failed")
        })?;

    let Some(course) = course else {
        return Err(error_response(StatusCode::NOT_FOUND, "course not found"));
    };
    if !course.has_video() {
        return Err(error_response(
            StatusCode::NOT_FOUND,
            "course has no recorded video",
        ));
    }

    let job = SummaryJob::new(
        request.token,
        request.sub_id,
        request.task,
        course.course_id,
        course.name,
        course.video,
        course.asr,
        state.summary_deps().clone(),
    );
    info!(
        sub_id = request.sub_id,
        task = request.task.as_str(),
        job_id = %job.id(),
        "summary job accepted"
    );
    state.summary_queue().add_job(Box::new(job)).await;

    Ok(Json(GenerateSummaryResponse {
        sub_id: request.sub_id,
        summary_status: SUMMARY_STATUS_GENERATING,
    }))
}
