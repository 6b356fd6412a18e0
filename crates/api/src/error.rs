use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use jobfront_core::error::CoreError;
use jobfront_pipeline::{FrontError, InteractionError};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] and [`InteractionError`] and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent JSON error
/// responses of the form `{"error": ..., "code": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `jobfront_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An interaction could not be opened, finished or proxied.
    #[error(transparent)]
    Interaction(#[from] InteractionError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Interaction(err) => classify_interaction_error(err),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

fn classify_core_error(err: &CoreError) -> (StatusCode, &'static str, String) {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Io(_) | CoreError::Malformed(_) | CoreError::Internal(_) => {
            tracing::error!(error = %err, "Internal core error");
            internal()
        }
    }
}

/// Map interaction failures to HTTP statuses.
///
/// Client errors reported by the worker's front keep their status so a
/// missing file stays a 404; anything else from the front is a 502.
fn classify_interaction_error(err: &InteractionError) -> (StatusCode, &'static str, String) {
    let message = err.to_string();
    match err {
        InteractionError::DuplicateInteraction(_) => {
            (StatusCode::CONFLICT, "DUPLICATE_INTERACTION", message)
        }
        InteractionError::UnknownInteraction(_) => {
            (StatusCode::NOT_FOUND, "UNKNOWN_INTERACTION", message)
        }
        InteractionError::UnknownJob(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", message),
        InteractionError::NoFront(_) => (StatusCode::NOT_FOUND, "NO_FRONT", message),
        InteractionError::UnknownMode(_) | InteractionError::InvalidPayload(_) => {
            (StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
        }
        InteractionError::Canceled(_) => (StatusCode::GONE, "INTERACTION_CANCELED", message),
        InteractionError::TimedOut(_) => {
            (StatusCode::GATEWAY_TIMEOUT, "INTERACTION_TIMEOUT", message)
        }
        InteractionError::Front(FrontError::Remote { status, body }) => {
            match StatusCode::from_u16(*status) {
                Ok(code) if code.is_client_error() => (code, "FRONT_ERROR", body.clone()),
                _ => {
                    tracing::warn!(status, "Interactive front failed");
                    (StatusCode::BAD_GATEWAY, "FRONT_ERROR", body.clone())
                }
            }
        }
        InteractionError::Front(FrontError::Request(e)) => {
            tracing::warn!(error = %e, "Interactive front unreachable");
            (
                StatusCode::BAD_GATEWAY,
                "FRONT_ERROR",
                "Interactive front is unreachable".to_string(),
            )
        }
    }
}
