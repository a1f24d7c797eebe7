use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Response body for `GET /health`.
#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
}

/// `GET /health`: liveness only; readiness is reported by
/// `GET /api/reference/status`.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "success".into(),
        message: "Bachpan matching service is running".into(),
        timestamp: Utc::now().to_rfc3339(),
    })
}
