//! Outcome-store query endpoints.

use axum::extract::{Query, State};
use axum::Json;
use serde_json::json;
use tracing::error;

use super::status::HashParams;
use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;

/// GET /success?hash=... -- success-outcome lookup.
pub async fn success_query_handler(
    State(state): State<AppState>,
    Query(params): Query<HashParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let hash = require_hash(&params)?;

    let record = state.success.get(hash).await.map_err(|e| {
        error!("Failed to query success for hash {}: {}", hash, e);
        ApiError::internal("Internal server error")
    })?;

    let body = match record {
        Some(record) => json!({
            "hash": record.hash,
            "status": "success",
            "timestamp": record.timestamp,
            "file_count": record.file_count,
            "job_data": record.job_data,
        }),
        None => json!({
            "hash": hash,
            "status": "not_found",
            "message": "No success record found for this hash",
        }),
    };
    Ok(Json(body))
}

/// GET /success/list -- full scan of the success store (admin).
pub async fn success_list_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    let records = state.success.scan().await.map_err(|e| {
        error!("Failed to list success records: {}", e);
        ApiError::internal("Internal server error")
    })?;

    Ok(Json(json!({
        "records": records,
        "count": records.len(),
    })))
}

/// GET /failures?hash=... -- failure-outcome lookup.
///
/// Absence of a failure record reads as "processed successfully", matching
/// the polling pattern of callers that only watch this endpoint.
pub async fn failure_query_handler(
    State(state): State<AppState>,
    Query(params): Query<HashParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let hash = require_hash(&params)?;

    let record = state.failures.get(hash).await.map_err(|e| {
        error!("Failed to query failure for hash {}: {}", hash, e);
        ApiError::internal("Internal server error")
    })?;

    let body = match record {
        Some(record) => json!({
            "hash": record.hash,
            "status": "failed",
            "timestamp": record.timestamp,
            "error": record.error,
            "job_data": record.job_data,
        }),
        None => json!({
            "hash": hash,
            "status": "success",
            "message": "File processed successfully",
        }),
    };
    Ok(Json(body))
}

/// GET /failures/list -- full scan of the failure store (admin).
pub async fn failure_list_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    let records = state.failures.scan().await.map_err(|e| {
        error!("Failed to list failure records: {}", e);
        ApiError::internal("Internal server error")
    })?;

    Ok(Json(json!({
        "records": records,
        "count": records.len(),
    })))
}

fn require_hash(params: &HashParams) -> ApiResult<&str> {
    params
        .hash
        .as_deref()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ApiError::bad_request("hash parameter required"))
}
