//! Backend-credentials registration endpoints.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::store::credentials::generate_access_key;

/// POST /register -- store a credential map under a fresh access key.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(creds): Json<HashMap<String, String>>,
) -> ApiResult<Json<serde_json::Value>> {
    let access_key = generate_access_key();

    state.credentials.put(&access_key, &creds).await.map_err(|e| {
        error!("Failed to store credentials for key {}: {}", access_key, e);
        ApiError::internal("Failed to store credentials")
    })?;

    info!("Credentials stored for access key: {}", access_key);
    Ok(Json(json!({ "access_key": access_key })))
}

#[derive(Debug, Deserialize)]
pub struct DeregisterParams {
    pub access_key: Option<String>,
}

/// DELETE /register?access_key=... -- remove a stored credential map.
pub async fn deregister_handler(
    State(state): State<AppState>,
    Query(params): Query<DeregisterParams>,
) -> ApiResult<StatusCode> {
    let access_key = params
        .access_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing access_key parameter"))?;

    state.credentials.delete(access_key).await.map_err(|e| {
        error!("Failed to delete credentials for key {}: {}", access_key, e);
        ApiError::internal("Failed to delete credentials")
    })?;

    info!("Credentials deleted for access key: {}", access_key);
    Ok(StatusCode::NO_CONTENT)
}
