//! Handlers for interactive operations.
//!
//! The worker opens an interaction with a blocking POST to
//! `/api/v1/interactions/{job}/{interaction}/request`; the browser answers
//! with `/finish`. Page-mode content is proxied under `/interactive/...`.

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, RawQuery, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use jobfront_pipeline::InteractionRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FinishInteraction {
    #[serde(default)]
    pub result: Value,
}

#[derive(Debug, Serialize)]
pub struct KnownResponse {
    pub known: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub path: String,
}

/// POST /api/v1/interactions/{job_id}/{interaction_id}/request
///
/// Body: `{"mode": "page", "front_address": ...}` or
/// `{"mode": "dialog", "content": ..., "script": ...}`. Blocks until the
/// browser finishes the interaction and returns its result.
pub async fn request_interaction(
    State(state): State<AppState>,
    Path((job_id, interaction_id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> AppResult<Json<DataResponse<Value>>> {
    let mode = body
        .get("mode")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::BadRequest("missing interaction mode".into()))?
        .to_string();
    let request = InteractionRequest::from_parts(&mode, body)?;

    let result = state
        .interactions
        .request(&job_id, &interaction_id, request)
        .await?;
    Ok(Json(DataResponse { data: result }))
}

/// POST /api/v1/interactions/{job_id}/{interaction_id}/finish
pub async fn finish_interaction(
    State(state): State<AppState>,
    Path((job_id, interaction_id)): Path<(String, String)>,
    Json(input): Json<FinishInteraction>,
) -> AppResult<StatusCode> {
    state
        .interactions
        .finish(&job_id, &interaction_id, input.result)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/interactions/{job_id}/{interaction_id}
pub async fn known_interaction(
    State(state): State<AppState>,
    Path((job_id, interaction_id)): Path<(String, String)>,
) -> Json<DataResponse<KnownResponse>> {
    let known = state.interactions.is_known(&job_id, &interaction_id);
    Json(DataResponse {
        data: KnownResponse { known },
    })
}

/// GET /api/v1/interactions/{job_id}/{interaction_id}/list?path=...
pub async fn list_front(
    State(state): State<AppState>,
    Path((job_id, interaction_id)): Path<(String, String)>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<DataResponse<Vec<String>>>> {
    let entries = state
        .interactions
        .list(&job_id, &interaction_id, &query.path)
        .await?;
    Ok(Json(DataResponse { data: entries }))
}

/// GET /interactive/{job_id}/{interaction_id}/{*path}
pub async fn proxy_get(
    State(state): State<AppState>,
    Path((job_id, interaction_id, path)): Path<(String, String, String)>,
    RawQuery(query): RawQuery,
) -> AppResult<Response> {
    let content = state
        .interactions
        .get(&job_id, &interaction_id, &path, query.as_deref())
        .await?;

    let mut response = Response::builder();
    if let Some(content_type) = content.content_type {
        response = response.header(header::CONTENT_TYPE, content_type);
    }
    response
        .body(Body::from(content.body))
        .map_err(|e| AppError::InternalError(e.to_string()))
}

/// PUT /interactive/{job_id}/{interaction_id}/{*path}
pub async fn proxy_put(
    State(state): State<AppState>,
    Path((job_id, interaction_id, path)): Path<(String, String, String)>,
    body: Bytes,
) -> AppResult<StatusCode> {
    state
        .interactions
        .create(&job_id, &interaction_id, &path, body.to_vec())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /interactive/{job_id}/{interaction_id}/{*path}
pub async fn proxy_delete(
    State(state): State<AppState>,
    Path((job_id, interaction_id, path)): Path<(String, String, String)>,
) -> AppResult<StatusCode> {
    state
        .interactions
        .delete(&job_id, &interaction_id, &path)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
