use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bachpan_core::MatchResult;

use super::{error_response, match_error, ApiError, AppState};

const IMAGE_FIELD: &str = "image";
const NO_IMAGE: &str = "No image file uploaded.";

#[derive(Deserialize, Debug, Default)]
pub struct MatchParams {
    /// Number of matches to return; server default when absent.
    pub k: Option<usize>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MatchResponse {
    pub matches: Vec<MatchResult>,
}

/// `POST /similarity-image`: rank reference images by similarity to the
/// uploaded `image` field.
pub async fn similarity_image(
    State(state): State<Arc<AppState>>,
    params: Result<Query<MatchParams>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<MatchResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let started = Instant::now();

    let Query(params) = params.map_err(|e| {
        error_response(StatusCode::BAD_REQUEST, format!("invalid query: {}", e.body_text()))
    })?;
    // A request that is not multipart carries no file, same as a missing field.
    let multipart = multipart.map_err(|_| error_response(StatusCode::BAD_REQUEST, NO_IMAGE))?;
    let image = read_image_field(multipart).await?;

    log::info!(
        "[{request_id}] similarity-image: {} bytes, k={:?}",
        image.len(),
        params.k
    );

    match state.service.match_image(&image, params.k).await {
        Ok(matches) => {
            log::info!(
                "[{request_id}] {} matches in {:?}",
                matches.len(),
                started.elapsed()
            );
            Ok(Json(MatchResponse { matches }))
        }
        Err(e) => {
            log::warn!("[{request_id}] match failed: {e}");
            Err(match_error(&e))
        }
    }
}

/// Pull the bytes of the `image` field, skipping any other fields.
async fn read_image_field(mut multipart: Multipart) -> Result<Bytes, ApiError> {
    let mut image = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| error_response(e.status(), e.body_text()))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| error_response(e.status(), e.body_text()))?;
        image = Some(bytes);
    }

    match image {
        Some(bytes) if !bytes.is_empty() => Ok(bytes),
        _ => Err(error_response(StatusCode::BAD_REQUEST, NO_IMAGE)),
    }
}
