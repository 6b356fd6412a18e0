//! Route definitions for the `/jobs` and `/results` resources.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /{id}            -> get_job
/// POST   /{id}/submit     -> submit_job
/// POST   /{id}/cancel     -> cancel_job
/// POST   /{id}/messages   -> post_message (worker log relay)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(jobs::get_job))
        .route("/{id}/submit", post(jobs::submit_job))
        .route("/{id}/cancel", post(jobs::cancel_job))
        .route("/{id}/messages", post(jobs::post_message))
}

/// Routes mounted at `/results`.
///
/// ```text
/// GET    /{uuid}          -> download_result
/// ```
pub fn results_router() -> Router<AppState> {
    Router::new().route("/{uuid}", get(jobs::download_result))
}
