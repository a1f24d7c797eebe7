//! HTTP API layer for the matching service.
//!
//! `POST /similarity-image` keeps the request and response shapes the intake
//! application already consumes: multipart field `image` in, `{ "matches":
//! [...] }` or `{ "error": ... }` out. The remaining routes are operational.

mod health;
mod reference;
mod similarity;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use bachpan_core::config::CatalogConfig;
use bachpan_core::{MatchError, MatchService};

pub use health::health;
pub use reference::{rebuild_reference, reference_status};
pub use similarity::similarity_image;

// ── Shared types ────────────────────────────────────────────────────────

/// Shared application state.
pub struct AppState {
    pub service: Arc<MatchService>,
    /// Catalog source used by explicit rebuilds.
    pub catalog: CatalogConfig,
}

/// Error body; the only shape clients of this API know about.
#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);

// ── Error helpers ───────────────────────────────────────────────────────

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

/// Map an engine error to its HTTP status.
pub(crate) fn match_error(err: &MatchError) -> ApiError {
    let status = match err {
        MatchError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        MatchError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        MatchError::TimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
        MatchError::BuildInProgress => StatusCode::CONFLICT,
        MatchError::EmbeddingFailed(_)
        | MatchError::BuildFailed(_)
        | MatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.to_string())
}

// ── Router ──────────────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/similarity-image", post(similarity_image))
        .route("/health", get(health))
        .route("/api/reference/status", get(reference_status))
        .route("/api/reference/rebuild", post(rebuild_reference))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}
