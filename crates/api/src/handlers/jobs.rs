//! Handlers for job submission, cancellation, results and worker messages.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use jobfront_core::error::CoreError;
use jobfront_core::job::Job;
use jobfront_core::store::JobStore;
use jobfront_events::{ClientEvent, JobEvent};
use jobfront_pipeline::Admission;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub admission: Admission,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job_id: String,
    pub canceled: bool,
}

#[derive(Debug, Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    /// Queued or processing right now.
    pub active: bool,
}

/// Log message relayed from the worker to the job's browsers.
#[derive(Debug, Deserialize)]
pub struct MessageLog {
    pub content: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub header: Option<String>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fetch a job or fail with `NotFound`.
fn find_job(store: &dyn JobStore, job_id: &str) -> AppResult<Job> {
    store.find_job(job_id)?.ok_or_else(|| {
        AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id.to_string(),
        })
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<DataResponse<JobView>>> {
    let job = find_job(state.job_store.as_ref(), &job_id)?;
    let active = state.job_queue.is_active(&job_id).await;
    Ok(Json(DataResponse {
        data: JobView { job, active },
    }))
}

/// POST /api/v1/jobs/{id}/submit
///
/// Queue-full is not an error: the response carries `"admission": "busy"`
/// and the job's browsers receive a `BUSY` status.
pub async fn submit_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let job = find_job(state.job_store.as_ref(), &job_id)?;
    let admission = state.job_queue.submit(&job).await;

    let status = match admission {
        Admission::Accepted => StatusCode::ACCEPTED,
        Admission::Busy => StatusCode::OK,
    };
    Ok((
        status,
        Json(DataResponse {
            data: SubmitResponse { job_id, admission },
        }),
    ))
}

/// POST /api/v1/jobs/{id}/cancel
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Json<DataResponse<CancelResponse>> {
    let canceled = state.job_queue.cancel(&job_id).await;
    Json(DataResponse {
        data: CancelResponse { job_id, canceled },
    })
}

/// POST /api/v1/jobs/{id}/messages
pub async fn post_message(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(input): Json<MessageLog>,
) -> AppResult<StatusCode> {
    find_job(state.job_store.as_ref(), &job_id)?;
    state.event_bus.publish(JobEvent::new(
        job_id,
        ClientEvent::MessageLog {
            content: input.content,
            level: input.level,
            header: input.header,
        },
    ));
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/results/{uuid}
///
/// Download a result archive announced by a `result` event.
pub async fn download_result(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let not_found = || {
        AppError::Core(CoreError::NotFound {
            entity: "Result",
            id: id.to_string(),
        })
    };
    let path = state.job_queue.result(&id).ok_or_else(not_found)?;
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(AppError::Core(e.into())),
    };
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{id}.zip"));

    Response::builder()
        .header(header::CONTENT_TYPE, "application/zip")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(Body::from(bytes))
        .map_err(|e| AppError::InternalError(e.to_string()))
}
