//! Wire envelope returned by every remote API call.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use super::error::ApiError;

/// Outer wrapper around every API response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T = Value> {
  pub success: bool,
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub data: Option<T>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub errors: Option<Vec<String>>,
}

impl<T> ApiEnvelope<T> {
  pub fn ok(data: T) -> Self {
    Self {
      success: true,
      message: None,
      data: Some(data),
      errors: None,
    }
  }

  pub fn failure(message: impl Into<String>) -> Self {
    Self {
      success: false,
      message: Some(message.into()),
      data: None,
      errors: None,
    }
  }

  /// Best human-readable description of a failed envelope.
  pub fn error_message(&self) -> String {
    if let Some(errors) = self.errors.as_ref().filter(|e| !e.is_empty()) {
      return errors.join("; ");
    }
    self
      .message
      .clone()
      .unwrap_or_else(|| "request failed".to_string())
  }
}

impl ApiEnvelope<Value> {
  /// Unwrap the payload of a successful envelope into `T`.
  ///
  /// `success = false` becomes [`ApiError::Server`]; a missing payload or one
  /// with the wrong shape becomes [`ApiError::Decoding`].
  pub fn into_data<T: DeserializeOwned>(self) -> Result<T, ApiError> {
    if !self.success {
      return Err(ApiError::Server(self.error_message()));
    }
    let data = self.data.unwrap_or(Value::Null);
    serde_json::from_value(data).map_err(ApiError::from)
  }
}
