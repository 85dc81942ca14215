//! Cache store trait plus SQLite and in-memory implementations.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::http::{Request, Response};

/// A response copy held by a cache store.
#[derive(Debug, Clone)]
pub struct Snapshot {
  /// The stored response, served byte-for-byte on hit
  pub response: Response,
  /// When the snapshot was captured
  pub cached_at: DateTime<Utc>,
}

/// Named cache stores keyed by request identity.
///
/// This is the platform cache-storage surface: stores are created lazily by
/// name, snapshots are matched by request identity, and a whole store can be
/// deleted when its version is superseded.
pub trait CacheStorage: Send + Sync {
  /// Open a named store, creating it if absent. Idempotent.
  fn open(&self, store: &str) -> Result<()>;

  /// All store names currently present.
  fn list_stores(&self) -> Result<Vec<String>>;

  /// Delete a store and every snapshot in it.
  fn delete_store(&self, store: &str) -> Result<()>;

  /// Match a request against one store.
  fn get(&self, store: &str, request: &Request) -> Result<Option<Snapshot>>;

  /// Match a request against every store; first hit in name order wins.
  fn get_any(&self, request: &Request) -> Result<Option<Snapshot>>;

  /// Store a response copy for a request.
  fn put(&self, store: &str, request: &Request, response: &Response) -> Result<()>;
}

/// SQLite-backed cache storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    Self::open_at(&path)
  }

  /// Open the store at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open a transient store, used by tests.
  pub fn in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open cache database: {}", e))?;

    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("offworker").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Named cache stores
CREATE TABLE IF NOT EXISTS stores (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Response snapshots keyed by request identity
CREATE TABLE IF NOT EXISTS snapshots (
    store TEXT NOT NULL,
    identity TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (store, identity)
);

CREATE INDEX IF NOT EXISTS idx_snapshots_identity ON snapshots(identity);
"#;

impl CacheStorage for SqliteStorage {
  fn open(&self, store: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO stores (name) VALUES (?)",
        params![store],
      )
      .map_err(|e| eyre!("Failed to open store {}: {}", store, e))?;

    Ok(())
  }

  fn list_stores(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM stores ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list stores: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn delete_store(&self, store: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM snapshots WHERE store = ?", params![store])
      .map_err(|e| eyre!("Failed to delete snapshots of {}: {}", store, e))?;
    conn
      .execute("DELETE FROM stores WHERE name = ?", params![store])
      .map_err(|e| eyre!("Failed to delete store {}: {}", store, e))?;

    Ok(())
  }

  fn get(&self, store: &str, request: &Request) -> Result<Option<Snapshot>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body, cached_at FROM snapshots
         WHERE store = ? AND identity = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(u16, String, Vec<u8>, String)> = stmt
      .query_row(params![store, request.identity()], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .ok();

    row.map(row_to_snapshot).transpose()
  }

  fn get_any(&self, request: &Request) -> Result<Option<Snapshot>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body, cached_at FROM snapshots
         WHERE identity = ? ORDER BY store LIMIT 1",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(u16, String, Vec<u8>, String)> = stmt
      .query_row(params![request.identity()], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .ok();

    row.map(row_to_snapshot).transpose()
  }

  fn put(&self, store: &str, request: &Request, response: &Response) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO stores (name) VALUES (?)",
        params![store],
      )
      .map_err(|e| eyre!("Failed to open store {}: {}", store, e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO snapshots (store, identity, method, url, status, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          store,
          request.identity(),
          request.method,
          request.url,
          response.status,
          headers,
          response.body,
        ],
      )
      .map_err(|e| eyre!("Failed to store snapshot: {}", e))?;

    Ok(())
  }
}

fn row_to_snapshot((status, headers, body, cached_at): (u16, String, Vec<u8>, String)) -> Result<Snapshot> {
  let headers: Vec<(String, String)> =
    serde_json::from_str(&headers).map_err(|e| eyre!("Failed to parse stored headers: {}", e))?;

  Ok(Snapshot {
    response: Response {
      status,
      headers,
      body,
    },
    cached_at: parse_datetime(&cached_at)?,
  })
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

/// Non-persistent cache storage. Backs tests and can stand in where no
/// durable cache is wanted.
#[derive(Default)]
pub struct MemoryStorage {
  stores: Mutex<BTreeMap<String, HashMap<String, Snapshot>>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheStorage for MemoryStorage {
  fn open(&self, store: &str) -> Result<()> {
    let mut stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    stores.entry(store.to_string()).or_default();
    Ok(())
  }

  fn list_stores(&self) -> Result<Vec<String>> {
    let stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(stores.keys().cloned().collect())
  }

  fn delete_store(&self, store: &str) -> Result<()> {
    let mut stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    stores.remove(store);
    Ok(())
  }

  fn get(&self, store: &str, request: &Request) -> Result<Option<Snapshot>> {
    let stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(
      stores
        .get(store)
        .and_then(|snapshots| snapshots.get(&request.identity()))
        .cloned(),
    )
  }

  fn get_any(&self, request: &Request) -> Result<Option<Snapshot>> {
    let stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let identity = request.identity();
    Ok(
      stores
        .values()
        .find_map(|snapshots| snapshots.get(&identity))
        .cloned(),
    )
  }

  fn put(&self, store: &str, request: &Request, response: &Response) -> Result<()> {
    let mut stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    stores.entry(store.to_string()).or_default().insert(
      request.identity(),
      Snapshot {
        response: response.clone(),
        cached_at: Utc::now(),
      },
    );

    Ok(())
  }
}
