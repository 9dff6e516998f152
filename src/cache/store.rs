//! Two-tier cache store: bounded memory in front of durable storage.

use chrono::Duration;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::key::CacheKey;
use super::memory::MemoryTier;
use super::storage::CacheStorage;
use super::types::{CacheEntry, CacheStatistics, SCHEMA_VERSION};

/// Default memory tier budgets.
pub const DEFAULT_MEMORY_ITEMS: usize = 256;
pub const DEFAULT_MEMORY_BYTES: usize = 8 * 1024 * 1024;

/// Key/value store with lazy TTL expiration across two tiers.
///
/// Reads check memory, then durable storage, promoting durable hits back into
/// memory. Expired entries are only noticed (and removed) when read, or by an
/// explicit [`CacheStore::sweep_expired`]. Durable failures are logged and
/// treated as misses; they never fail a read or write.
///
/// Writes and removals touch the durable tier before memory, and a durable hit
/// is only promoted if memory saw no mutation while it was being loaded. A
/// removal racing a read therefore cannot leave the removed value in memory.
pub struct CacheStore {
  memory: MemoryTier,
  storage: Box<dyn CacheStorage>,
  clock: Arc<dyn Clock>,
  /// Serializes mutations so both tiers apply them in the same order.
  writes: Mutex<()>,
}

impl CacheStore {
  /// Create a store over `storage` with default memory budgets and wall-clock time.
  pub fn new(storage: impl CacheStorage + 'static) -> Self {
    Self {
      memory: MemoryTier::new(DEFAULT_MEMORY_ITEMS, DEFAULT_MEMORY_BYTES),
      storage: Box::new(storage),
      clock: Arc::new(SystemClock),
      writes: Mutex::new(()),
    }
  }

  fn write_lock(&self) -> MutexGuard<'_, ()> {
    self.writes.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Set the memory tier's item and byte budgets.
  pub fn with_memory_limits(mut self, max_items: usize, max_bytes: usize) -> Self {
    self.memory = MemoryTier::new(max_items, max_bytes);
    self
  }

  /// Use `clock` for expiry decisions.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  /// Store `value` under `key` in both tiers, overwriting any previous entry.
  pub fn put<T: Serialize>(&self, key: impl Into<CacheKey>, value: &T, ttl: Duration) {
    self.put_if(key, value, ttl, || true);
  }

  /// Like [`CacheStore::put`], but `keep` is checked while no other mutation
  /// can run and the write is skipped if it returns false. Returns whether the
  /// value was stored.
  pub fn put_if<T: Serialize>(
    &self,
    key: impl Into<CacheKey>,
    value: &T,
    ttl: Duration,
    keep: impl FnOnce() -> bool,
  ) -> bool {
    let key: CacheKey = key.into();

    let value = match serde_json::to_value(value) {
      Ok(v) => v,
      Err(e) => {
        warn!(key = %key, error = %e, "Failed to serialize cache value");
        return false;
      }
    };

    let entry = CacheEntry::new(value, self.clock.now(), ttl);
    let envelope = match serde_json::to_vec(&entry) {
      Ok(bytes) => bytes,
      Err(e) => {
        warn!(key = %key, error = %e, "Failed to encode cache envelope");
        return false;
      }
    };

    let _writes = self.write_lock();
    if !keep() {
      debug!(key = %key, "Cache write skipped");
      return false;
    }

    if let Err(e) = self.storage.store(&key, &envelope) {
      warn!(key = %key, error = %e, "Durable cache write failed");
    }

    self.memory.insert(key.as_str(), entry, envelope.len());
    true
  }

  /// Look up an unexpired value for `key`.
  ///
  /// A stored value that no longer decodes as `T` is removed and reported as
  /// a miss.
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    let now = self.clock.now();

    if let Some(entry) = self.memory.get(key) {
      if entry.is_expired(now) {
        debug!(key, "Memory entry expired");
        self.remove(key);
        return None;
      }
      return self.decode(key, entry.value);
    }

    let generation = self.memory.generation();
    let envelope = match self.storage.load(key) {
      Ok(Some(bytes)) => bytes,
      Ok(None) => return None,
      Err(e) => {
        warn!(key, error = %e, "Durable cache read failed");
        return None;
      }
    };

    let entry = match decode_envelope(&envelope) {
      Some(entry) => entry,
      None => {
        debug!(key, "Discarding undecodable durable record");
        self.delete_durable(key);
        return None;
      }
    };

    if entry.is_expired(now) {
      debug!(key, expired_at = %entry.expires_at(), "Durable entry expired");
      self.delete_durable(key);
      return None;
    }

    let value = entry.value.clone();
    if !self.memory.promote(generation, key, entry, envelope.len()) {
      debug!(key, "Memory changed during durable read, not promoting");
    }

    self.decode(key, value)
  }

  fn decode<T: DeserializeOwned>(&self, key: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
      Ok(v) => Some(v),
      Err(e) => {
        debug!(key, error = %e, "Cached value has a different shape, dropping");
        self.remove(key);
        None
      }
    }
  }

  /// Returns whether the durable delete succeeded.
  fn delete_durable(&self, key: &str) -> bool {
    match self.storage.delete(key) {
      Ok(()) => true,
      Err(e) => {
        warn!(key, error = %e, "Durable cache delete failed");
        false
      }
    }
  }

  /// Remove `key` from both tiers. Idempotent.
  pub fn remove(&self, key: &str) {
    let _writes = self.write_lock();
    self.delete_durable(key);
    self.memory.remove(key);
  }

  /// Remove every entry whose key belongs to `tag`. Returns the number of
  /// durable records removed.
  pub fn invalidate_tag(&self, tag: &str) -> usize {
    let _writes = self.write_lock();
    match self.storage.delete_tag(tag) {
      Ok(keys) => {
        for key in &keys {
          self.memory.remove(key);
        }
        debug!(tag, removed = keys.len(), "Invalidated cache tag");
        keys.len()
      }
      Err(e) => {
        // Without the durable index we cannot tell which memory entries belong
        // to the tag, so fall back to dropping the whole memory tier.
        warn!(tag, error = %e, "Durable tag invalidation failed");
        self.memory.clear();
        0
      }
    }
  }

  /// Empty both tiers.
  pub fn clear(&self) {
    let _writes = self.write_lock();
    if let Err(e) = self.storage.clear() {
      warn!(error = %e, "Durable cache clear failed");
    }
    self.memory.clear();
    info!("Cache cleared");
  }

  /// Delete every expired or undecodable durable record in a single pass.
  /// The memory tier is left alone. Returns the number of records removed.
  pub fn sweep_expired(&self) -> usize {
    let now = self.clock.now();

    let records = match self.storage.records() {
      Ok(records) => records,
      Err(e) => {
        warn!(error = %e, "Durable cache sweep failed");
        return 0;
      }
    };

    let mut removed = 0;
    for record in records {
      let stale = match decode_envelope(&record.envelope) {
        Some(entry) => entry.is_expired(now),
        None => true,
      };
      if stale && self.delete_durable(&record.key) {
        removed += 1;
      }
    }

    info!(removed, "Swept expired cache records");
    removed
  }

  /// Sizes of both tiers, computed now.
  pub fn statistics(&self) -> CacheStatistics {
    let disk = self.storage.usage().unwrap_or_else(|e| {
      warn!(error = %e, "Failed to read durable cache usage");
      Default::default()
    });

    CacheStatistics {
      memory_count: self.memory.len(),
      memory_bytes: self.memory.bytes(),
      memory_capacity: self.memory.capacity(),
      disk_count: disk.count,
      disk_bytes: disk.bytes,
    }
  }
}

/// Decode a durable envelope, rejecting other schema versions.
fn decode_envelope(bytes: &[u8]) -> Option<CacheEntry<Value>> {
  serde_json::from_slice::<CacheEntry<Value>>(bytes)
    .ok()
    .filter(|entry| entry.schema_version == SCHEMA_VERSION)
}
