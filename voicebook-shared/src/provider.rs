/// Shared plumbing for outbound provider calls
///
/// All provider clients (OAuth, spreadsheet, assistant) share one
/// `reqwest::Client` with a bounded timeout. A timed out call is reported as
/// [`ProviderError::Timeout`] and is never retried by the session or ledger
/// layers.

use crate::error::{Classify, ErrorKind};
use std::time::Duration;

/// Failure reported by a remote provider
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The call did not complete within the configured timeout
    #[error("Provider call timed out")]
    Timeout,

    /// Transport-level failure (DNS, TLS, connection reset)
    #[error("Provider request failed: {0}")]
    Http(String),

    /// Provider answered with a non-success status
    #[error("Provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body could not be decoded
    #[error("Failed to decode provider response: {0}")]
    Decode(String),

    /// Addressed resource does not exist on the provider side
    #[error("Provider resource not found: {0}")]
    NotFound(String),
}

impl ProviderError {
    /// Returns true when the provider reported the resource as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Http(err.to_string())
        }
    }
}

impl Classify for ProviderError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::ExternalService
    }

    fn code(&self) -> &'static str {
        match self {
            ProviderError::Timeout => "PROVIDER_TIMEOUT",
            ProviderError::NotFound(_) => "PROVIDER_NOT_FOUND",
            _ => "PROVIDER_ERROR",
        }
    }
}

/// Builds the HTTP client shared by all provider clients
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(concat!("voicebook/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(ProviderError::from)
}

/// Turns a non-success response into [`ProviderError::Status`]
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}
