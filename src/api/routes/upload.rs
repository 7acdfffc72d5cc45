//! Upload endpoint.

use axum::extract::{Multipart, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::Json;
use tracing::{debug, info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::auth::{bearer_token, UploadClaims};
use crate::job::UploadReceipt;

/// POST /upload -- accept a multipart upload with a bearer token carrying
/// the job specification; responds with the content hash and the expected
/// output filenames.
pub async fn upload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadReceipt>> {
    let claims = verify_request(&state, &headers)?;
    info!("Upload token verified for subject: {}", claims.sub);

    let mut filename: Option<String> = None;
    let mut data: Option<bytes::Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to parse multipart form: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        filename = field.file_name().map(str::to_string);
        data = Some(field.bytes().await.map_err(|e| {
            warn!("Failed to read upload body: {}", e);
            ApiError::bad_request(format!("Failed to read file from form: {}", e))
        })?);
        break;
    }

    let data = data.ok_or_else(|| ApiError::bad_request("Failed to get file from form"))?;
    let filename =
        filename.ok_or_else(|| ApiError::bad_request("Uploaded file part has no filename"))?;

    info!("File received: {}, size: {} bytes", filename, data.len());

    let receipt = state.manager.ingest(&filename, &data, &claims.job).await?;

    info!(
        "Upload completed: hash={}, files={:?}",
        receipt.hash, receipt.expected_files
    );
    Ok(Json(receipt))
}

fn verify_request(state: &AppState, headers: &HeaderMap) -> ApiResult<UploadClaims> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::unauthorized("Authorization header required"))?
        .to_str()
        .map_err(|_| ApiError::unauthorized("Invalid authorization header"))?;

    debug!("Verifying upload token");
    let token = bearer_token(header)?;
    Ok(state.verifier.verify(token)?)
}
