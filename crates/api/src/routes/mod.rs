pub mod health;
pub mod interactions;
pub mod jobs;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                                              WebSocket (join/leave job groups)
///
/// /jobs/{id}                                       job record + active flag
/// /jobs/{id}/submit                                submit to the queue (POST)
/// /jobs/{id}/cancel                                cancel (POST)
/// /jobs/{id}/messages                              worker log relay (POST)
///
/// /results/{uuid}                                  download result archive
///
/// /interactions/{job}/{interaction}                is the interaction known
/// /interactions/{job}/{interaction}/finish         browser answer (POST)
/// /interactions/{job}/{interaction}/list           list front entries
/// ```
///
/// The worker's blocking `/interactions/{job}/{interaction}/request` route
/// lives in [`interactions::callback_router`].
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/jobs", jobs::router())
        .nest("/results", jobs::results_router())
        .nest("/interactions", interactions::router())
}
