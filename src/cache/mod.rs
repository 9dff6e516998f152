//! Two-tier caching layer for API payloads.
//!
//! This module provides a payload-agnostic cache that:
//! - Keeps a bounded LRU tier in memory in front of a durable SQLite tier
//! - Expires entries lazily, at read time, against a per-entry TTL
//! - Derives keys deterministically from an operation name and its parameters
//! - Tags every key with its resource family for targeted invalidation

mod clock;
mod key;
mod memory;
mod storage;
mod store;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key::{CacheKey, CacheKeyBuilder, ALL, NONE};
pub use memory::MemoryTier;
pub use storage::{CacheStorage, DiskUsage, NoopStorage, SqliteStorage, StoredRecord};
pub use store::{CacheStore, DEFAULT_MEMORY_BYTES, DEFAULT_MEMORY_ITEMS};
pub use types::{CacheEntry, CacheSource, CacheStatistics, FetchResult, Ttl, TtlPolicy, SCHEMA_VERSION};
