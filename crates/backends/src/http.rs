//! Shared reqwest plumbing for the HTTP backends

use std::time::Duration;
use url::Url;
use voxchat_core::{Error, Result};

/// Build a reqwest client with a request timeout
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Build a reqwest client for long-lived streaming responses
///
/// `timeout` bounds connecting only. Pair with [`send_streaming`] to bound
/// the wait for response headers; the streamed body has no deadline.
pub(crate) fn build_streaming_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(timeout)
        .build()
        .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Send a streaming request, failing if no response head arrives within `timeout`
pub(crate) async fn send_streaming(
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<reqwest::Response> {
    match tokio::time::timeout(timeout, request.send()).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(Error::Generation(format!("HTTP request failed: {}", e))),
        Err(_) => Err(Error::Generation(format!(
            "no response within {}s",
            timeout.as_secs_f64()
        ))),
    }
}

/// Parse and check a backend base URL
pub(crate) fn parse_base_url(raw: &str) -> Result<Url> {
    if raw.is_empty() {
        return Err(Error::Config("base URL cannot be empty".to_string()));
    }

    let url = Url::parse(raw)
        .map_err(|e| Error::Config(format!("Invalid base URL {:?}: {}", raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::Config(format!(
            "Base URL must start with http:// or https://, got: {}",
            raw
        )));
    }

    Ok(url)
}

/// `base` + `path` without doubled slashes
pub(crate) fn endpoint(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Read an API key from the environment
pub(crate) fn api_key_from_env(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(Error::Config(format!(
            "API key not found: set the {} environment variable",
            var
        ))),
    }
}

/// Human readable description of a non-2xx response
pub(crate) async fn describe_failure(response: reqwest::Response) -> String {
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    format!(
        "HTTP {} {}: {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown"),
        error_text.trim()
    )
}
