//! SQLite implementation of the cache storage contract.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::key::request_key;
use super::traits::{CacheEntryInfo, CacheStorage, CachedResponse, VaryKey};
use crate::http::{Request, Response};

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the storage at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open or create the storage at the given path.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("offline-agent").join("caches.db"))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Named stores, id preserves creation order
CREATE TABLE IF NOT EXISTS caches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One response per request key per store
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_name TEXT NOT NULL,
    request_key TEXT NOT NULL,
    url TEXT NOT NULL,
    vary TEXT NOT NULL,
    response_url TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_name, request_key)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_key ON cache_entries(request_key);
"#;

/// Columns read back by the match queries, in this order.
const ENTRY_COLUMNS: &str =
  "e.vary, e.response_url, e.status, e.status_text, e.headers, e.body, e.cached_at";

/// Raw column values of one entry, in `ENTRY_COLUMNS` order.
type EntryRow = (String, String, u16, String, String, Vec<u8>, String);

fn read_row(row: &Row<'_>) -> rusqlite::Result<EntryRow> {
  Ok((
    row.get(0)?,
    row.get(1)?,
    row.get(2)?,
    row.get(3)?,
    row.get(4)?,
    row.get(5)?,
    row.get(6)?,
  ))
}

/// A stored row before its vary key has been checked.
struct StoredEntry {
  vary: String,
  cached: CachedResponse,
}

impl StoredEntry {
  fn decode((vary, url, status, status_text, headers, body, cached_at): EntryRow) -> Result<Self> {
    let headers: Vec<(String, String)> = serde_json::from_str(&headers)
      .map_err(|e| eyre!("Failed to deserialize cached headers: {}", e))?;

    Ok(Self {
      vary,
      cached: CachedResponse {
        response: Response {
          url,
          status,
          status_text,
          headers,
          body,
        },
        cached_at: parse_datetime(&cached_at)?,
      },
    })
  }

  fn matches(&self, request: &Request) -> Result<bool> {
    let vary: VaryKey = serde_json::from_str(&self.vary)
      .map_err(|e| eyre!("Failed to deserialize vary key: {}", e))?;
    Ok(vary.matches(request))
  }
}

impl CacheStorage for SqliteStorage {
  fn open(&self, name: &str) -> Result<()> {
    self
      .lock()?
      .execute("INSERT OR IGNORE INTO caches (name) VALUES (?)", params![name])
      .map_err(|e| eyre!("Failed to open cache {}: {}", name, e))?;
    Ok(())
  }

  fn has(&self, name: &str) -> Result<bool> {
    let conn = self.lock()?;
    let found: Option<i64> = conn
      .query_row("SELECT id FROM caches WHERE name = ?", params![name], |row| {
        row.get(0)
      })
      .optional()
      .map_err(|e| eyre!("Failed to look up cache {}: {}", name, e))?;
    Ok(found.is_some())
  }

  fn keys(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM caches ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache name: {}", e))?;

    Ok(names)
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM cache_entries WHERE cache_name = ?",
      params![name],
    )
    .map_err(|e| eyre!("Failed to delete entries of cache {}: {}", name, e))?;

    let removed = tx
      .execute("DELETE FROM caches WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete cache {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()> {
    if request.method != reqwest::Method::GET {
      return Err(eyre!(
        "Refusing to cache {} {}: only GET requests can be stored",
        request.method,
        request.url
      ));
    }

    let vary = serde_json::to_string(&VaryKey::capture(request, response))
      .map_err(|e| eyre!("Failed to serialize vary key: {}", e))?;
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("INSERT OR IGNORE INTO caches (name) VALUES (?)", params![name])
      .map_err(|e| eyre!("Failed to open cache {}: {}", name, e))?;

    tx.execute(
      "INSERT OR REPLACE INTO cache_entries
         (cache_name, request_key, url, vary, response_url, status, status_text, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        name,
        request_key(request),
        request.url.as_str(),
        vary,
        response.url,
        response.status,
        response.status_text,
        headers,
        response.body,
      ],
    )
    .map_err(|e| eyre!("Failed to store response for {}: {}", request.url, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn match_in(&self, name: &str, request: &Request) -> Result<Option<CachedResponse>> {
    if request.method != reqwest::Method::GET {
      return Ok(None);
    }

    let conn = self.lock()?;
    let row = conn
      .query_row(
        &format!(
          "SELECT {} FROM cache_entries e WHERE e.cache_name = ? AND e.request_key = ?",
          ENTRY_COLUMNS
        ),
        params![name, request_key(request)],
        read_row,
      )
      .optional()
      .map_err(|e| eyre!("Failed to query cache {}: {}", name, e))?;

    match row {
      Some(row) => {
        let entry = StoredEntry::decode(row)?;
        Ok(entry.matches(request)?.then_some(entry.cached))
      }
      None => Ok(None),
    }
  }

  fn match_any(&self, request: &Request) -> Result<Option<CachedResponse>> {
    if request.method != reqwest::Method::GET {
      return Ok(None);
    }

    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(&format!(
        "SELECT {} FROM cache_entries e
         INNER JOIN caches c ON c.name = e.cache_name
         WHERE e.request_key = ?
         ORDER BY c.id",
        ENTRY_COLUMNS
      ))
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map(params![request_key(request)], read_row)
      .map_err(|e| eyre!("Failed to query caches: {}", e))?;

    for row in rows {
      let row = row.map_err(|e| eyre!("Failed to read cache entry: {}", e))?;
      let entry = StoredEntry::decode(row)?;
      if entry.matches(request)? {
        return Ok(Some(entry.cached));
      }
    }

    Ok(None)
  }

  fn entries(&self, name: &str) -> Result<Vec<CacheEntryInfo>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(
        "SELECT url, status, length(body), cached_at FROM cache_entries
         WHERE cache_name = ?
         ORDER BY url",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map(params![name], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, u16>(1)?,
          row.get::<_, i64>(2)?,
          row.get::<_, String>(3)?,
        ))
      })
      .map_err(|e| eyre!("Failed to list entries of cache {}: {}", name, e))?;

    let mut entries = Vec::new();
    for row in rows {
      let (url, status, size, cached_at) =
        row.map_err(|e| eyre!("Failed to read cache entry: {}", e))?;
      entries.push(CacheEntryInfo {
        url,
        status,
        size: size.max(0) as usize,
        cached_at: parse_datetime(&cached_at)?,
      });
    }

    Ok(entries)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
