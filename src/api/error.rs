//! Error taxonomy shared by the remote client and the cached access service.

use thiserror::Error;

/// Errors surfaced to callers of the data core.
///
/// Nothing in this crate retries on these; retry policy belongs to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
  /// Malformed endpoint or parameters. Not retryable.
  #[error("invalid request: {0}")]
  InvalidRequest(String),

  /// The server rejected the credentials (HTTP 401).
  #[error("authentication required")]
  Authentication,

  /// The server answered with an error message.
  #[error("server error: {0}")]
  Server(String),

  /// The payload did not match the expected shape.
  #[error("failed to decode response: {0}")]
  Decoding(String),

  /// Transport failure.
  #[error("network error: {0}")]
  Network(String),

  /// The operation was superseded or explicitly cancelled.
  #[error("request cancelled")]
  Cancelled,
}

impl ApiError {
  /// Whether a caller-driven retry (e.g. pull-to-refresh) can reasonably succeed.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Network(_) | Self::Cancelled)
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(e: serde_json::Error) -> Self {
    Self::Decoding(e.to_string())
  }
}
