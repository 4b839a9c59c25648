//! Shared HTTP plumbing for provider and discovery adapters.
//!
//! One `reqwest::Client` is built per process and reused for connection
//! pooling. Requests are sent exactly once: retries, timeouts seen by the
//! breaker and admission control all live in the dependency guard.

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::OnceLock;
use std::time::Duration;

use crate::providers::ProviderError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Longest error body echoed into an error message.
const ERROR_BODY_LIMIT: usize = 512;

/// Process-wide HTTP client.
pub(crate) fn client() -> &'static Client {
    static CLIENT: OnceLock<Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .use_rustls_tls()
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client");
                Client::new()
            })
    })
}

/// Send `request` and map any failure to a classified [`ProviderError`].
pub(crate) async fn send(
    request: RequestBuilder,
    timeout: Duration,
    dependency: &str,
) -> Result<Response, ProviderError> {
    tracing::debug!(dependency, timeout_ms = timeout.as_millis() as u64, "Sending HTTP request");

    let response = request.timeout(timeout).send().await.map_err(|e| {
        if e.is_timeout() {
            ProviderError::Timeout(timeout)
        } else {
            ProviderError::Transport {
                message: e.to_string(),
                retryable: !e.is_builder(),
            }
        }
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(ProviderError::RateLimited { retry_after });
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::from_status(
        status.as_u16(),
        error_message(&body),
    ))
}

/// Decode a successful response body.
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    response
        .json::<T>()
        .await
        .map_err(|e| ProviderError::ParseError(e.to_string()))
}

/// Pull a readable message out of an error body.
///
/// Most APIs answer `{"error": {"message": ...}}` or `{"error": "..."}`;
/// anything else is echoed, truncated.
pub(crate) fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let error = &value["error"];
        if let Some(message) = error["message"].as_str().or_else(|| error.as_str()) {
            return message.to_string();
        }
        if let Some(message) = value["message"].as_str() {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    match trimmed.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
