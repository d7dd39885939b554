//! Shared reqwest plumbing for the UAA and CircleCI clients.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::errors::{Error, Result};

/// Build an HTTP client with a bounded per-call timeout.
pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))
}

/// Check the response status, mapping failures onto the crate error type.
///
/// `on_not_found` decides what a 404 means for the endpoint being called.
pub(crate) async fn ensure_success<F>(
    service: &str,
    response: Response,
    on_not_found: F,
) -> Result<Response>
where
    F: FnOnce() -> Error,
{
    let status = response.status();
    debug!(service, status = %status, "Response status");

    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 404 {
        return Err(on_not_found());
    }

    let error_text =
        response.text().await.unwrap_or_else(|_| "<unable to read error>".to_string());
    trace!(service, "Error response:\n{}", error_text);

    Err(Error::from_status(service, status.as_u16(), error_text))
}

/// Check the status and deserialize a JSON body.
pub(crate) async fn read_json<T, F>(service: &str, response: Response, on_not_found: F) -> Result<T>
where
    T: DeserializeOwned,
    F: FnOnce() -> Error,
{
    let response = ensure_success(service, response, on_not_found).await?;
    let status = response.status().as_u16();
    let body = response.text().await.map_err(|e| Error::from_reqwest(service, e))?;

    serde_json::from_str(&body).map_err(|e| {
        Error::unexpected(service, status, format!("Failed to deserialize response: {}", e))
    })
}
