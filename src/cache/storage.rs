//! SQLite-backed storage for one HTTP cache partition
//!
//! Each partition is a single SQLite file holding the responses of one
//! (widget type, duration) pair. Entries carry their own expiry, so a
//! request-level override can outlive or undercut the partition default.

use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::session::CachedResponse;
use crate::error::CacheError;

/// Schema version - increment to trigger nuke-and-rebuild
const SCHEMA_VERSION: i32 = 1;

/// How long a writer waits on a locked database before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type Result<T> = std::result::Result<T, CacheError>;

/// One partition's response store
pub struct PartitionStorage {
    conn: Connection,
    path: PathBuf,
}

impl PartitionStorage {
    /// Open or create the partition file at `path`
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // Check schema version - nuke if mismatched
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |r| r.get(0))
            .unwrap_or(0);

        if version != 0 && version != SCHEMA_VERSION {
            log::info!(
                "Partition schema version mismatch ({} != {}) for {}, rebuilding",
                version,
                SCHEMA_VERSION,
                path.display()
            );
            drop(conn);
            std::fs::remove_file(path).map_err(|e| CacheError::io(path, e))?;
            return Self::open_at(path);
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS responses (
                cache_key TEXT PRIMARY KEY NOT NULL,
                method TEXT NOT NULL,
                url TEXT NOT NULL,
                status INTEGER NOT NULL,
                headers TEXT NOT NULL,
                body BLOB NOT NULL,
                elapsed_ms INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_expires_at ON responses(expires_at);
            CREATE INDEX IF NOT EXISTS idx_url ON responses(url);
            "#,
        )?;

        if version != SCHEMA_VERSION {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a stored response if it has not expired at `now`
    pub fn get_at(&self, key: &str, now: i64) -> Result<Option<CachedResponse>> {
        let row = self
            .conn
            .query_row(
                "SELECT url, status, headers, body, elapsed_ms FROM responses
                 WHERE cache_key = ?1 AND expires_at > ?2",
                params![key, now],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u16>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((url, status, headers, body, elapsed_ms)) = row else {
            return Ok(None);
        };

        let headers: Vec<(String, String)> = match serde_json::from_str(&headers) {
            Ok(headers) => headers,
            Err(e) => {
                log::warn!("Dropping unreadable cache entry for {}: {}", url, e);
                self.conn
                    .execute("DELETE FROM responses WHERE cache_key = ?1", [key])?;
                return Ok(None);
            }
        };

        Ok(Some(CachedResponse {
            url,
            status,
            headers,
            body,
            elapsed: Duration::from_millis(elapsed_ms.max(0) as u64),
            from_cache: true,
        }))
    }

    /// Store a response that expires `ttl` after `now`
    pub fn put_at(
        &self,
        key: &str,
        method: &str,
        response: &CachedResponse,
        ttl: Duration,
        now: i64,
    ) -> Result<()> {
        let expires = now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));
        let headers = serde_json::to_string(&response.headers)
            .map_err(|e| CacheError::Storage(e.to_string()))?;

        self.conn.execute(
            "INSERT OR REPLACE INTO responses
             (cache_key, method, url, status, headers, body, elapsed_ms, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                key,
                method,
                response.url,
                response.status,
                headers,
                response.body,
                response.elapsed.as_millis() as i64,
                now,
                expires
            ],
        )?;
        Ok(())
    }

    /// Delete every stored response for `url`, whatever the method or body
    pub fn delete_url(&self, url: &str) -> Result<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM responses WHERE url = ?1", [url])?;
        Ok(deleted)
    }

    /// Delete entries that expired at or before `now`
    pub fn delete_expired_at(&self, now: i64) -> Result<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM responses WHERE expires_at <= ?1", [now])?;
        Ok(deleted)
    }

    /// Give freed pages back to the filesystem
    pub fn vacuum(&self) -> Result<()> {
        self.conn.execute_batch("VACUUM")?;
        Ok(())
    }

    /// Number of stored entries, expired or not
    #[cfg(test)]
    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM responses", [], |r| r.get(0))?;
        Ok(count as usize)
    }
}
