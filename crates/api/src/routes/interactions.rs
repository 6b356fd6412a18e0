//! Route definitions for interactive operations.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::interactions;
use crate::state::AppState;

/// Routes mounted at `/interactions`.
///
/// ```text
/// GET    /{job}/{interaction}          -> known_interaction
/// POST   /{job}/{interaction}/finish   -> finish_interaction
/// GET    /{job}/{interaction}/list     -> list_front
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/{job_id}/{interaction_id}",
            get(interactions::known_interaction),
        )
        .route(
            "/{job_id}/{interaction_id}/finish",
            post(interactions::finish_interaction),
        )
        .route(
            "/{job_id}/{interaction_id}/list",
            get(interactions::list_front),
        )
}

/// The worker's blocking request route, at its full path.
///
/// Kept apart from [`router`] so it can be mounted outside the request
/// timeout: an interaction lasts as long as the user takes to answer.
///
/// ```text
/// POST   /api/v1/interactions/{job}/{interaction}/request -> request_interaction
/// ```
pub fn callback_router() -> Router<AppState> {
    Router::new().route(
        "/api/v1/interactions/{job_id}/{interaction_id}/request",
        post(interactions::request_interaction),
    )
}

/// Page-mode content proxied from the worker's interactive front.
///
/// ```text
/// GET    /interactive/{job}/{interaction}/{*path}  -> proxy_get
/// PUT    /interactive/{job}/{interaction}/{*path}  -> proxy_put
/// DELETE /interactive/{job}/{interaction}/{*path}  -> proxy_delete
/// ```
pub fn interactive_router() -> Router<AppState> {
    Router::new().route(
        "/interactive/{job_id}/{interaction_id}/{*path}",
        get(interactions::proxy_get)
            .put(interactions::proxy_put)
            .delete(interactions::proxy_delete),
    )
}
