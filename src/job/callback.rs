//! Completion callbacks.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::json;
use tracing::{info, warn};

use super::spec::CombinedJob;
use crate::error::{Error, Result};

/// Timeout for the outbound callback request.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Notify the configured callback URL that a job completed.
///
/// The reported file count is `conversions.len() + 1`; when
/// `keep_original` already appended a copy step this double-counts. The
/// value is part of the wire contract and is kept as-is.
pub async fn send_completion_callback(hash: &str, job: &CombinedJob) -> Result<()> {
    if job.callback_url.is_empty() {
        return Ok(());
    }

    let payload = json!({
        "hash": hash,
        "status": "completed",
        "file_count": job.conversions.len() + 1,
        "timestamp": chrono::Utc::now().timestamp(),
        "job_data": job,
    });

    let mut headers = HeaderMap::new();
    for (name, value) in &job.callback_headers {
        let Ok(name) = name.parse::<HeaderName>() else {
            warn!("Skipping invalid callback header name: {}", name);
            continue;
        };
        let Ok(value) = value.parse::<HeaderValue>() else {
            warn!("Skipping invalid callback header value for {}", name);
            continue;
        };
        headers.insert(name, value);
    }

    let client = reqwest::Client::builder()
        .timeout(CALLBACK_TIMEOUT)
        .user_agent(concat!("imagemill/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::writer(format!("failed to build callback client: {}", e)))?;

    let response = client
        .post(&job.callback_url)
        .headers(headers)
        .json(&payload)
        .send()
        .await
        .map_err(|e| Error::writer(format!("callback request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(Error::writer(format!(
            "callback returned non-2xx status: {}",
            response.status().as_u16()
        )));
    }

    info!("Sent completion callback to {}", job.callback_url);
    Ok(())
}
