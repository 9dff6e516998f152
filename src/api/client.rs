//! Remote API contract and its HTTP implementation.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::api::error::ApiError;
use crate::api::types::ApiEnvelope;
use crate::config::{ApiConfig, Config};

/// HTTP verb of a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Post,
  Put,
  Delete,
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Get => "GET",
      Self::Post => "POST",
      Self::Put => "PUT",
      Self::Delete => "DELETE",
    };
    f.write_str(name)
  }
}

/// Contract of the remote HR API as consumed by the cache layer.
///
/// Implementations return the decoded envelope on any 2xx response and a typed
/// [`ApiError`] otherwise.
#[async_trait]
pub trait RemoteApi: Send + Sync {
  async fn request(
    &self,
    method: Method,
    endpoint: &str,
    body: Option<Value>,
  ) -> Result<ApiEnvelope, ApiError>;

  async fn get(&self, endpoint: &str) -> Result<ApiEnvelope, ApiError> {
    self.request(Method::Get, endpoint, None).await
  }

  async fn post(&self, endpoint: &str, body: Option<Value>) -> Result<ApiEnvelope, ApiError> {
    self.request(Method::Post, endpoint, body).await
  }

  async fn put(&self, endpoint: &str, body: Option<Value>) -> Result<ApiEnvelope, ApiError> {
    self.request(Method::Put, endpoint, body).await
  }

  async fn delete(&self, endpoint: &str) -> Result<ApiEnvelope, ApiError> {
    self.request(Method::Delete, endpoint, None).await
  }
}

/// reqwest-backed API client
#[derive(Clone)]
pub struct HttpRemoteApi {
  client: reqwest::Client,
  base_url: Url,
  token: Option<String>,
}

impl HttpRemoteApi {
  pub fn new(config: &ApiConfig, token: Option<String>) -> Result<Self, ApiError> {
    let base_url = parse_base_url(&config.base_url)?;

    let mut builder = reqwest::Client::builder();
    if let Some(secs) = config.timeout_secs {
      builder = builder.timeout(Duration::from_secs(secs));
    }
    let client = builder
      .build()
      .map_err(|e| ApiError::InvalidRequest(format!("Failed to create HTTP client: {}", e)))?;

    Ok(Self {
      client,
      base_url,
      token,
    })
  }

  /// Build from the loaded configuration, picking up the token from the environment.
  pub fn from_config(config: &Config) -> Result<Self, ApiError> {
    Self::new(&config.api, Config::get_api_token())
  }

  fn endpoint_url(&self, endpoint: &str) -> Result<Url, ApiError> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
      return Err(ApiError::InvalidRequest("empty endpoint".to_string()));
    }
    self
      .base_url
      .join(endpoint.trim_start_matches('/'))
      .map_err(|e| ApiError::InvalidRequest(format!("bad endpoint '{}': {}", endpoint, e)))
  }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
  async fn request(
    &self,
    method: Method,
    endpoint: &str,
    body: Option<Value>,
  ) -> Result<ApiEnvelope, ApiError> {
    let url = self.endpoint_url(endpoint)?;
    debug!(%method, %url, "Remote API request");

    let mut request = match method {
      Method::Get => self.client.get(url),
      Method::Post => self.client.post(url),
      Method::Put => self.client.put(url),
      Method::Delete => self.client.delete(url),
    }
    .header(ACCEPT, "application/json");

    if let Some(token) = &self.token {
      request = request.header(AUTHORIZATION, format!("Bearer {}", token));
    }
    if let Some(body) = body {
      let bytes = serde_json::to_vec(&body)
        .map_err(|e| ApiError::InvalidRequest(format!("Failed to encode body: {}", e)))?;
      request = request.header(CONTENT_TYPE, "application/json").body(bytes);
    }

    let response = request
      .send()
      .await
      .map_err(|e| ApiError::Network(e.to_string()))?;

    let status = response.status();
    let bytes = response
      .bytes()
      .await
      .map_err(|e| ApiError::Network(e.to_string()))?;

    envelope_from_response(status, &bytes)
  }
}

fn parse_base_url(raw: &str) -> Result<Url, ApiError> {
  // Without a trailing slash, Url::join would replace the last path segment.
  let normalized = if raw.ends_with('/') {
    raw.to_string()
  } else {
    format!("{}/", raw)
  };
  Url::parse(&normalized)
    .map_err(|e| ApiError::InvalidRequest(format!("bad base url '{}': {}", raw, e)))
}

/// Map an HTTP status and body to an envelope or a typed error.
fn envelope_from_response(status: StatusCode, body: &[u8]) -> Result<ApiEnvelope, ApiError> {
  if status == StatusCode::UNAUTHORIZED {
    return Err(ApiError::Authentication);
  }

  if !status.is_success() {
    let message = serde_json::from_slice::<ApiEnvelope>(body)
      .map(|envelope| envelope.error_message())
      .unwrap_or_else(|_| format!("HTTP {}", status));
    return Err(ApiError::Server(message));
  }

  serde_json::from_slice(body).map_err(ApiError::from)
}
