//! Response caching for widgets
//!
//! Two layers: durable SQLite partitions holding raw HTTP responses, one
//! per (widget type, duration), and an in-memory store for post-processed
//! widget data. Both are owned by a [`CacheContext`] that is built once and
//! shared with the server, the scheduler and the maintenance commands.

pub mod duration;
pub mod files;
pub mod key;
pub mod maintenance;
pub mod memory;
pub mod registry;
pub mod session;
pub mod storage;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::CacheError;

/// Leading token of every partition file name
pub const PURPOSE_TAG: &str = "requests";

/// Partition file extension
pub const PARTITION_EXTENSION: &str = "sqlite";

/// Minimum wall-clock time between expired-entry sweeps
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

// Re-export main types
pub use maintenance::{CacheFootprint, CacheMaintenance};
pub use memory::MemoryCache;
pub use registry::SessionRegistry;
pub use session::{CachedResponse, CachedSession, FetchRequest};

/// Shared cache state for one process
pub struct CacheContext {
    pub memory: MemoryCache<String, serde_json::Value>,
    pub sessions: SessionRegistry,
}

impl CacheContext {
    pub fn new(root: impl Into<PathBuf>, http: reqwest::Client) -> Self {
        Self {
            memory: MemoryCache::new(),
            sessions: SessionRegistry::new(root, http),
        }
    }

    pub fn shared(root: impl Into<PathBuf>, http: reqwest::Client) -> Arc<Self> {
        Arc::new(Self::new(root, http))
    }

    pub fn root(&self) -> &Path {
        self.sessions.root()
    }

    pub fn maintenance(&self) -> CacheMaintenance<'_> {
        CacheMaintenance::new(&self.sessions)
    }

    /// Periodic maintenance: sweep the memory store and, when due, every
    /// open partition.
    pub fn clear_expired(&self, now: i64) {
        let memory = self.memory.sweep_expired(now);
        if memory > 0 {
            log::debug!("Swept {} expired memory cache entries", memory);
        }
        if let Some(removed) = self.sessions.sweep_open_partitions(now)
            && removed > 0
        {
            log::info!("Swept {} expired responses from open partitions", removed);
        }
    }
}

/// Pick the cache root directory.
///
/// An explicit directory wins, then the per-user cache directory, then a
/// local `.cache` folder.
pub fn resolve_cache_root(explicit: Option<&Path>) -> Result<PathBuf, CacheError> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    if let Some(base) = dirs::cache_dir() {
        return Ok(base.join("informer"));
    }
    let cwd = std::env::current_dir().map_err(|_| CacheError::NoCacheDir)?;
    Ok(cwd.join(".cache"))
}
