use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use bachpan_core::catalog;
use bachpan_core::reference::BuildReport;
use bachpan_core::ServiceState;

use super::{error_response, match_error, ApiError, AppState};

/// Response body for `GET /api/reference/status`.
#[derive(Serialize, Deserialize)]
pub struct ReferenceStatus {
    pub state: ServiceState,
    /// Entries in the current snapshot (0 before the first build).
    pub references: usize,
    pub dimensions: usize,
    pub provider_type: String,
    pub model_name: String,
    /// Uploads currently being processed.
    pub in_flight: usize,
    /// Report of the build behind the current snapshot.
    pub report: Option<BuildReport>,
}

/// `GET /api/reference/status`: lifecycle state and the last build report.
pub async fn reference_status(State(state): State<Arc<AppState>>) -> Json<ReferenceStatus> {
    let service = &state.service;
    let snapshot = service.snapshot();
    let embedder = service.embedder();

    Json(ReferenceStatus {
        state: service.state(),
        references: snapshot.as_ref().map_or(0, |s| s.set.len()),
        dimensions: snapshot.as_ref().map_or(0, |s| s.set.dimensions()),
        provider_type: embedder.provider_type().to_string(),
        model_name: embedder.model_name().to_string(),
        in_flight: service.in_flight(),
        report: snapshot.map(|s| s.report.clone()),
    })
}

/// `POST /api/reference/rebuild`: re-read the configured catalog and swap in
/// a freshly built reference set.
///
/// The previous set keeps serving queries until the new one is complete and
/// stays in place if the rebuild fails.
pub async fn rebuild_reference(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BuildReport>, ApiError> {
    let items = catalog::resolve(&state.catalog).map_err(|e| {
        log::error!("rebuild aborted: {e}");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
    })?;

    let service = &state.service;
    let result = if service.snapshot().is_some() {
        service.rebuild(items).await
    } else {
        service.initialize(items).await
    };

    result.map(Json).map_err(|e| {
        log::error!("rebuild failed: {e}");
        match_error(&e)
    })
}
