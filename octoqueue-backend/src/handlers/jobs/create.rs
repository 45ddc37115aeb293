use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::Json;
use octoqueue_job_queue::{NewJob, StatusLabel};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::processor::ProcessingStatus;
use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub data: Map<String, Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub additional_labels: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub job_id: u64,
    pub status: &'static str,
    pub processing_status: ProcessingStatus,
}

/// POST /create-job
/// Validate and enqueue a job, then tell the processor work is waiting.
///
/// The processor must report a healthy cluster before anything is written.
/// The notification runs detached; the response reports it as scheduled.
pub async fn create_job(
    Extension(state): Extension<Arc<AppState>>,
    body: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateJobResponse>), ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let Some(processor) = &state.processor else {
        warn!("job refused: no processor host configured");
        return Err(ApiError::unavailable("Service host is undefined"));
    };
    processor
        .check_health()
        .await
        .map_err(|e| ApiError::unavailable(e.to_string()))?;

    let payload = request.data;
    if let Some(schema) = state.schema().await {
        schema
            .check(&Value::Object(payload.clone()))
            .inspect_err(|e| warn!(error = %e, "job data failed validation"))?;
    }

    let queue = state.queue().await?;
    let mut job = NewJob::new(payload).with_labels(request.additional_labels.unwrap_or_default());
    if let Some(title) = request.title {
        job = job.with_title(title);
    }
    let job_id = queue.enqueue(job).await?;
    info!(job_id, "job created");

    let (request_id, _ping) = processor.spawn_notify();
    info!(job_id, %request_id, host = processor.host(), "processor ping scheduled");

    Ok((
        StatusCode::CREATED,
        Json(CreateJobResponse {
            job_id,
            status: StatusLabel::Pending.as_str(),
            processing_status: ProcessingStatus::Scheduled,
        }),
    ))
}
