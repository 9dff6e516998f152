//! Core types for the caching system.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Version of the durable envelope layout. Records written with any other
/// version are treated as misses.
pub const SCHEMA_VERSION: u32 = 1;

/// TTL category chosen by the caller per resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ttl {
  /// Dashboards and other fast-moving summaries
  Short,
  /// Paginated lists
  Medium,
  /// Profiles and detail views
  Long,
  /// Rarely-changing reference data
  Extended,
}

impl FromStr for Ttl {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "short" => Ok(Self::Short),
      "medium" => Ok(Self::Medium),
      "long" => Ok(Self::Long),
      "extended" => Ok(Self::Extended),
      other => Err(format!("unknown ttl category '{}'", other)),
    }
  }
}

impl fmt::Display for Ttl {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Short => "short",
      Self::Medium => "medium",
      Self::Long => "long",
      Self::Extended => "extended",
    };
    f.write_str(name)
  }
}

/// Durations for each [`Ttl`] category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
  pub short: Duration,
  pub medium: Duration,
  pub long: Duration,
  pub extended: Duration,
}

impl TtlPolicy {
  pub fn duration(&self, ttl: Ttl) -> Duration {
    match ttl {
      Ttl::Short => self.short,
      Ttl::Medium => self.medium,
      Ttl::Long => self.long,
      Ttl::Extended => self.extended,
    }
  }
}

impl Default for TtlPolicy {
  fn default() -> Self {
    Self {
      short: Duration::minutes(5),
      medium: Duration::minutes(30),
      long: Duration::hours(24),
      extended: Duration::days(7),
    }
  }
}

/// A cached value with the metadata needed to decide expiry.
///
/// This is also the persisted envelope: `{ value, storedAt, ttlSeconds, schemaVersion }`.
/// TTLs are kept in whole seconds, rounded up, so a sub-second TTL lives for
/// one second rather than expiring on the spot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
  pub value: T,
  pub stored_at: DateTime<Utc>,
  pub ttl_seconds: i64,
  pub schema_version: u32,
}

impl<T> CacheEntry<T> {
  pub fn new(value: T, stored_at: DateTime<Utc>, ttl: Duration) -> Self {
    Self {
      value,
      stored_at,
      ttl_seconds: ceil_seconds(ttl),
      schema_version: SCHEMA_VERSION,
    }
  }

  pub fn ttl(&self) -> Duration {
    Duration::seconds(self.ttl_seconds)
  }

  /// Expired once strictly more than `ttl` has elapsed since it was stored.
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    now > self.expires_at()
  }

  pub fn expires_at(&self) -> DateTime<Utc> {
    self.stored_at + self.ttl()
  }
}

fn ceil_seconds(ttl: Duration) -> i64 {
  let millis = ttl.num_milliseconds();
  millis.div_euclid(1000) + i64::from(millis.rem_euclid(1000) > 0)
}

/// Result of a read that reports where the value came from.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult<T> {
  pub value: T,
  pub source: CacheSource,
}

impl<T> FetchResult<T> {
  pub fn from_network(value: T) -> Self {
    Self {
      value,
      source: CacheSource::Network,
    }
  }

  pub fn from_cache(value: T) -> Self {
    Self {
      value,
      source: CacheSource::Cache,
    }
  }

  pub fn is_cached(&self) -> bool {
    self.source == CacheSource::Cache
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Unexpired data from either cache tier
  Cache,
}

/// Snapshot of both cache tiers, computed on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatistics {
  pub memory_count: usize,
  pub memory_bytes: usize,
  /// Configured item budget of the memory tier
  pub memory_capacity: usize,
  pub disk_count: usize,
  pub disk_bytes: u64,
}
