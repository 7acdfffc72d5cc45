//! Job liveness and cancellation endpoints.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;

#[derive(Debug, Deserialize)]
pub struct HashParams {
    pub hash: Option<String>,
}

impl HashParams {
    fn require(&self) -> ApiResult<&str> {
        self.hash
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ApiError::bad_request("Missing hash parameter"))
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub hash: String,
    pub state: String,
}

/// GET /status?hash=... -- current state of a job.
pub async fn status_handler(
    State(state): State<AppState>,
    Query(params): Query<HashParams>,
) -> ApiResult<Json<StatusResponse>> {
    let hash = params.require()?;

    let job_state = state
        .manager
        .state_of(hash)
        .ok_or_else(|| ApiError::not_found(format!("Job with hash {} not found", hash)))?;

    Ok(Json(StatusResponse {
        hash: hash.to_string(),
        state: job_state.as_str().to_string(),
    }))
}

/// DELETE /cancel?hash=... -- cancel a pending job.
pub async fn cancel_handler(
    State(state): State<AppState>,
    Query(params): Query<HashParams>,
) -> ApiResult<StatusCode> {
    let hash = params.require()?;

    info!("Attempting to cancel job: {}", hash);
    state.manager.cancel(hash).await?;

    Ok(StatusCode::NO_CONTENT)
}
