//! Response handling shared by the HTTP clients.

use std::time::Duration;

use serde::de::DeserializeOwned;

use readscore_core::error::ServiceError;

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, ServiceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ServiceError::Network(format!("failed to build HTTP client: {e}")))
}

pub(crate) fn send_error(e: reqwest::Error, timeout_secs: u64) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Timeout(timeout_secs)
    } else {
        ServiceError::Network(e.to_string())
    }
}

/// Map 401, 404 and other error statuses; pass successes through.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ServiceError> {
    let status = response.status().as_u16();
    if status < 400 {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);
    Err(match status {
        401 => ServiceError::Unauthorized(message),
        404 => ServiceError::NotFound(message),
        _ => ServiceError::Api { status, message },
    })
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ServiceError> {
    response
        .json()
        .await
        .map_err(|e| ServiceError::InvalidResponse(format!("failed to parse response: {e}")))
}

/// The `detail` string of an error body, or the trimmed body itself.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
