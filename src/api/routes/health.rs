//! Health and version endpoints.

use std::time::Duration;

use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::api::error::ApiResult;
use crate::api::server::AppState;

/// Format an uptime as `NdNhNmNs`.
fn format_uptime(uptime: Duration) -> String {
    let total = uptime.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    format!("{}d {}h {}m {}s", days, hours, minutes, seconds)
}

/// GET /health -- liveness plus per-store health probes.
pub async fn health_handler(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let success_ok = state.success.check_health().await.is_ok();
    let failures_ok = state.failures.check_health().await.is_ok();
    let credentials_ok = state.credentials.check_health().await.is_ok();

    let status = if success_ok && failures_ok && credentials_ok {
        "healthy"
    } else {
        "degraded"
    };

    Ok(Json(json!({
        "status": status,
        "timestamp": chrono::Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": format_uptime(state.start_time.elapsed()),
        "start_time": state.started_at.format("%Y-%m-%d %H:%M:%S %Z").to_string(),
        "stores": {
            "success": success_ok,
            "failures": failures_ok,
            "credentials": credentials_ok,
        },
    })))
}

/// GET /version -- build information.
pub async fn version_handler() -> Json<serde_json::Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "build_time": std::env::var("IMAGEMILL_BUILD_TIME")
            .unwrap_or_else(|_| "unknown".to_string()),
        "git_commit": std::env::var("IMAGEMILL_GIT_COMMIT")
            .unwrap_or_else(|_| "unknown".to_string()),
        "rustc_version": env!("IMAGEMILL_RUSTC_VERSION"),
    }))
}
