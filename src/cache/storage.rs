//! Durable cache storage trait and SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::key::{record_id, CacheKey};

/// One persisted envelope together with the key it was stored under.
#[derive(Debug, Clone)]
pub struct StoredRecord {
  pub key: String,
  pub envelope: Vec<u8>,
}

/// Record count and total envelope size of the durable tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
  pub count: usize,
  pub bytes: u64,
}

/// Trait for durable cache backends.
///
/// Backends store opaque serialized envelopes; expiry and decoding are the
/// caller's concern. Every write for a key replaces its record atomically.
pub trait CacheStorage: Send + Sync {
  /// Load the envelope stored under `key`.
  fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

  /// Create or replace the record for `key`.
  fn store(&self, key: &CacheKey, envelope: &[u8]) -> Result<()>;

  /// Delete the record for `key` if present.
  fn delete(&self, key: &str) -> Result<()>;

  /// Delete every record carrying `tag`, returning the deleted keys.
  fn delete_tag(&self, tag: &str) -> Result<Vec<String>>;

  /// Delete all records.
  fn clear(&self) -> Result<()>;

  /// All records, for one-pass maintenance such as expiry sweeps.
  fn records(&self) -> Result<Vec<StoredRecord>>;

  /// Count and total size of stored envelopes.
  fn usage(&self) -> Result<DiskUsage>;
}

/// Storage implementation that doesn't persist anything.
/// Used when the durable tier is disabled - the memory tier still works.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn load(&self, _key: &str) -> Result<Option<Vec<u8>>> {
    Ok(None) // Always miss
  }

  fn store(&self, _key: &CacheKey, _envelope: &[u8]) -> Result<()> {
    Ok(()) // Discard
  }

  fn delete(&self, _key: &str) -> Result<()> {
    Ok(())
  }

  fn delete_tag(&self, _tag: &str) -> Result<Vec<String>> {
    Ok(Vec::new())
  }

  fn clear(&self) -> Result<()> {
    Ok(())
  }

  fn records(&self) -> Result<Vec<StoredRecord>> {
    Ok(Vec::new())
  }

  fn usage(&self) -> Result<DiskUsage> {
    Ok(DiskUsage::default())
  }
}

/// SQLite-based cache storage implementation.
///
/// A single connection behind a mutex serializes all writers, so concurrent
/// puts for the same key cannot interleave at the record level.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    Self::with_connection(conn)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("hrdata").join("cache.db"))
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One record per cache key; record_id is the SHA-256 hex of cache_key
CREATE TABLE IF NOT EXISTS cache_records (
    record_id TEXT PRIMARY KEY,
    cache_key TEXT NOT NULL,
    tag TEXT NOT NULL,
    envelope BLOB NOT NULL,
    written_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_cache_records_tag ON cache_records(tag);
"#;

impl CacheStorage for SqliteStorage {
  fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
    let conn = self.lock()?;

    conn
      .query_row(
        "SELECT envelope FROM cache_records WHERE record_id = ?",
        params![record_id(key)],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to load cache record {}: {}", key, e))
  }

  fn store(&self, key: &CacheKey, envelope: &[u8]) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cache_records (record_id, cache_key, tag, envelope, written_at)
         VALUES (?, ?, ?, ?, datetime('now'))",
        params![key.record_id(), key.as_str(), key.tag(), envelope],
      )
      .map_err(|e| eyre!("Failed to store cache record {}: {}", key, e))?;

    Ok(())
  }

  fn delete(&self, key: &str) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "DELETE FROM cache_records WHERE record_id = ?",
        params![record_id(key)],
      )
      .map_err(|e| eyre!("Failed to delete cache record {}: {}", key, e))?;

    Ok(())
  }

  fn delete_tag(&self, tag: &str) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let tx = conn
      .unchecked_transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let keys: Vec<String> = {
      let mut stmt = tx
        .prepare("SELECT cache_key FROM cache_records WHERE tag = ?")
        .map_err(|e| eyre!("Failed to prepare tag query: {}", e))?;

      let rows = stmt
        .query_map(params![tag], |row| row.get(0))
        .map_err(|e| eyre!("Failed to query tag {}: {}", tag, e))?;

      rows.filter_map(|r| r.ok()).collect()
    };

    tx.execute("DELETE FROM cache_records WHERE tag = ?", params![tag])
      .map_err(|e| eyre!("Failed to delete tag {}: {}", tag, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(keys)
  }

  fn clear(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute("DELETE FROM cache_records", [])
      .map_err(|e| eyre!("Failed to clear cache records: {}", e))?;

    Ok(())
  }

  fn records(&self) -> Result<Vec<StoredRecord>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT cache_key, envelope FROM cache_records")
      .map_err(|e| eyre!("Failed to prepare record scan: {}", e))?;

    let records = stmt
      .query_map([], |row| {
        Ok(StoredRecord {
          key: row.get(0)?,
          envelope: row.get(1)?,
        })
      })
      .map_err(|e| eyre!("Failed to scan cache records: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(records)
  }

  fn usage(&self) -> Result<DiskUsage> {
    let conn = self.lock()?;

    let (count, bytes): (i64, i64) = conn
      .query_row(
        "SELECT COUNT(*), COALESCE(SUM(LENGTH(envelope)), 0) FROM cache_records",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .map_err(|e| eyre!("Failed to compute cache usage: {}", e))?;

    Ok(DiskUsage {
      count: count as usize,
      bytes: bytes as u64,
    })
  }
}
