//! Cache key derivation.
//!
//! A key is `operation + "_" + join("_", params)`. Absent optional parameters
//! are rendered as a fixed sentinel instead of being dropped, so every distinct
//! parameter combination maps to a distinct key.

use sha2::{Digest, Sha256};
use std::fmt;

/// Sentinel for an absent optional parameter (search term, id, ...).
pub const NONE: &str = "none";

/// Sentinel for an absent filter, meaning "no filtering".
pub const ALL: &str = "all";

/// A derived cache key plus the resource tag it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  key: String,
  tag: String,
}

impl CacheKey {
  /// Start building a key for `operation`.
  pub fn builder(operation: &str) -> CacheKeyBuilder {
    CacheKeyBuilder {
      operation: operation.to_string(),
      params: Vec::new(),
    }
  }

  /// Build a key with no parameters.
  pub fn derive(operation: &str) -> Self {
    Self::builder(operation).build()
  }

  pub fn as_str(&self) -> &str {
    &self.key
  }

  /// Resource family used for tag invalidation.
  pub fn tag(&self) -> &str {
    &self.tag
  }

  /// Stable, fixed-length identifier for the durable record.
  pub fn record_id(&self) -> String {
    record_id(&self.key)
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.key)
  }
}

impl AsRef<str> for CacheKey {
  fn as_ref(&self) -> &str {
    &self.key
  }
}

/// Plain string keys are tagged with the text before their first `_`.
impl From<&str> for CacheKey {
  fn from(key: &str) -> Self {
    let tag = key.split('_').next().unwrap_or(key).to_string();
    Self {
      key: key.to_string(),
      tag,
    }
  }
}

impl From<String> for CacheKey {
  fn from(key: String) -> Self {
    Self::from(key.as_str())
  }
}

impl From<&CacheKey> for CacheKey {
  fn from(key: &CacheKey) -> Self {
    key.clone()
  }
}

/// SHA-256 hex of a key, used as the durable primary key.
pub(crate) fn record_id(key: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(key.as_bytes());
  hex::encode(hasher.finalize())
}

/// Accumulates normalized parameters in call order.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
  operation: String,
  params: Vec<String>,
}

impl CacheKeyBuilder {
  /// A required parameter (page number, id, ...).
  pub fn param(mut self, value: impl fmt::Display) -> Self {
    self.params.push(escape(value.to_string().trim()));
    self
  }

  /// An optional parameter; `None` or blank becomes [`NONE`].
  pub fn opt(self, value: Option<impl fmt::Display>) -> Self {
    self.opt_or(value, NONE)
  }

  /// An optional filter; `None` or blank becomes [`ALL`].
  pub fn filter(self, value: Option<impl fmt::Display>) -> Self {
    self.opt_or(value, ALL)
  }

  fn opt_or(mut self, value: Option<impl fmt::Display>, sentinel: &str) -> Self {
    let rendered = value
      .map(|v| v.to_string().trim().to_string())
      .filter(|v| !v.is_empty());
    match rendered {
      Some(v) => self.params.push(escape(&v)),
      None => self.params.push(sentinel.to_string()),
    }
    self
  }

  pub fn build(self) -> CacheKey {
    CacheKey {
      key: format!("{}_{}", self.operation, self.params.join("_")),
      tag: self.operation,
    }
  }
}

/// Keep the separator unambiguous: a literal `_` or `%` inside a value would
/// otherwise let two parameter lists join to the same string.
fn escape(value: &str) -> String {
  if !value.contains(['_', '%']) {
    return value.to_string();
  }
  value.replace('%', "%25").replace('_', "%5F")
}
