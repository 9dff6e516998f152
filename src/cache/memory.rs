//! Bounded in-memory cache tier.

use lru::LruCache;
use serde_json::Value;
use std::sync::Mutex;

use super::types::CacheEntry;

struct Slot {
  entry: CacheEntry<Value>,
  size: usize,
}

struct Inner {
  entries: LruCache<String, Slot>,
  bytes: usize,
  /// Bumped by every insert, remove and clear.
  generation: u64,
}

/// LRU tier with an item-count budget and a byte budget.
///
/// Eviction drops least-recently-used entries until both budgets hold, so the
/// eviction order is fully determined by the sequence of puts and gets.
///
/// Every mutation advances a generation counter. A reader that loaded a value
/// from elsewhere can hand back the generation it saw to [`MemoryTier::promote`],
/// which refuses the insert if anything changed in between.
pub struct MemoryTier {
  inner: Mutex<Inner>,
  max_items: usize,
  max_bytes: usize,
}

impl MemoryTier {
  pub fn new(max_items: usize, max_bytes: usize) -> Self {
    Self {
      inner: Mutex::new(Inner {
        entries: LruCache::unbounded(),
        bytes: 0,
        generation: 0,
      }),
      max_items,
      max_bytes,
    }
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Insert or overwrite `key`. Entries that alone exceed the byte budget are
  /// not kept in memory.
  pub fn insert(&self, key: &str, entry: CacheEntry<Value>, size: usize) {
    let mut inner = self.lock();
    inner.generation += 1;
    self.place(&mut inner, key, entry, size);
  }

  /// Insert `key` only if no mutation happened since `generation` was read.
  /// Returns whether the entry was inserted.
  pub fn promote(&self, generation: u64, key: &str, entry: CacheEntry<Value>, size: usize) -> bool {
    let mut inner = self.lock();
    if inner.generation != generation {
      return false;
    }
    self.place(&mut inner, key, entry, size);
    true
  }

  /// Current generation, for a later [`MemoryTier::promote`].
  pub fn generation(&self) -> u64 {
    self.lock().generation
  }

  fn place(&self, inner: &mut Inner, key: &str, entry: CacheEntry<Value>, size: usize) {
    if let Some(old) = inner.entries.pop(key) {
      inner.bytes -= old.size;
    }

    if self.max_items == 0 || size > self.max_bytes {
      return;
    }

    inner.entries.put(key.to_string(), Slot { entry, size });
    inner.bytes += size;

    while inner.entries.len() > self.max_items || inner.bytes > self.max_bytes {
      match inner.entries.pop_lru() {
        Some((_, evicted)) => inner.bytes -= evicted.size,
        None => break,
      }
    }
  }

  /// Look up `key`, marking it most recently used.
  pub fn get(&self, key: &str) -> Option<CacheEntry<Value>> {
    let mut inner = self.lock();
    inner.entries.get(key).map(|slot| slot.entry.clone())
  }

  pub fn remove(&self, key: &str) {
    let mut inner = self.lock();
    inner.generation += 1;
    if let Some(old) = inner.entries.pop(key) {
      inner.bytes -= old.size;
    }
  }

  pub fn clear(&self) {
    let mut inner = self.lock();
    inner.generation += 1;
    inner.entries.clear();
    inner.bytes = 0;
  }

  pub fn len(&self) -> usize {
    self.lock().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn bytes(&self) -> usize {
    self.lock().bytes
  }

  pub fn capacity(&self) -> usize {
    self.max_items
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Duration, Utc};
  use serde_json::json;

  fn entry(n: i64) -> CacheEntry<Value> {
    CacheEntry::new(json!(n), Utc::now(), Duration::minutes(5))
  }

  #[test]
  fn test_evicts_least_recently_used() {
    let tier = MemoryTier::new(2, 1024);
    tier.insert("a", entry(1), 10);
    tier.insert("b", entry(2), 10);

    // Touch "a" so "b" becomes the eviction candidate
    assert!(tier.get("a").is_some());
    tier.insert("c", entry(3), 10);

    assert!(tier.get("a").is_some());
    assert!(tier.get("b").is_none());
    assert!(tier.get("c").is_some());
    assert_eq!(tier.len(), 2);
  }

  #[test]
  fn test_byte_budget() {
    let tier = MemoryTier::new(10, 25);
    tier.insert("a", entry(1), 10);
    tier.insert("b", entry(2), 10);
    tier.insert("c", entry(3), 10);

    assert!(tier.get("a").is_none());
    assert_eq!(tier.len(), 2);
    assert_eq!(tier.bytes(), 20);
  }

  #[test]
  fn test_oversized_entry_skipped() {
    let tier = MemoryTier::new(10, 25);
    tier.insert("a", entry(1), 10);
    tier.insert("big", entry(2), 100);

    assert!(tier.get("big").is_none());
    assert!(tier.get("a").is_some());
  }

  #[test]
  fn test_overwrite_replaces_size() {
    let tier = MemoryTier::new(10, 100);
    tier.insert("a", entry(1), 10);
    tier.insert("a", entry(2), 30);

    assert_eq!(tier.len(), 1);
    assert_eq!(tier.bytes(), 30);
    assert_eq!(tier.get("a").map(|e| e.value), Some(json!(2)));
  }

  #[test]
  fn test_remove_and_clear() {
    let tier = MemoryTier::new(10, 100);
    tier.insert("a", entry(1), 10);
    tier.insert("b", entry(2), 10);

    tier.remove("a");
    tier.remove("a");
    assert_eq!(tier.bytes(), 10);

    tier.clear();
    assert!(tier.is_empty());
    assert_eq!(tier.bytes(), 0);
  }

  #[test]
  fn test_promote_refused_after_mutation() {
    let tier = MemoryTier::new(10, 100);
    let seen = tier.generation();
    tier.remove("a");

    assert!(!tier.promote(seen, "a", entry(1), 10));
    assert!(tier.get("a").is_none());

    let seen = tier.generation();
    assert!(tier.promote(seen, "a", entry(1), 10));
    assert_eq!(tier.get("a").map(|e| e.value), Some(json!(1)));
  }
}
