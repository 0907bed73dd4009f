//! Process-wide registry of partition sessions
//!
//! Maps (widget type, duration) to a shared [`CachedSession`]. Lookups and
//! inserts happen under one mutex so concurrent first use of a partition
//! never opens it twice.

use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::session::CachedSession;
use super::storage::PartitionStorage;
use super::{PARTITION_EXTENSION, PURPOSE_TAG, SWEEP_INTERVAL};
use crate::error::CacheError;

/// Identity of one partition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionId {
    pub widget_type: String,
    pub duration_secs: u64,
}

impl PartitionId {
    pub fn new(widget_type: &str, duration_secs: u64) -> Self {
        Self {
            widget_type: widget_type.to_lowercase(),
            duration_secs,
        }
    }

    /// Deterministic file name, e.g. `requests-rss-3600.sqlite`
    pub fn file_name(&self) -> String {
        format!(
            "{}-{}-{}.{}",
            PURPOSE_TAG, self.widget_type, self.duration_secs, PARTITION_EXTENSION
        )
    }
}

/// Best-effort "at most once per interval" gate for expired-entry sweeps.
///
/// An unset timestamp counts as due.
#[derive(Debug)]
pub struct SweepThrottle {
    interval: Duration,
    last: Mutex<Option<i64>>,
}

impl SweepThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Claim the sweep if it is due at `now`, recording `now` when it is.
    pub fn try_claim(&self, now: i64) -> bool {
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        let interval = self.interval.as_secs() as i64;
        let due = match *last {
            None => true,
            Some(previous) => now - previous >= interval,
        };
        if due {
            *last = Some(now);
        }
        due
    }
}

/// Registry of open partition sessions under one cache root
pub struct SessionRegistry {
    root: PathBuf,
    http: reqwest::Client,
    sessions: Mutex<HashMap<PartitionId, Arc<CachedSession>>>,
    throttle: SweepThrottle,
}

impl SessionRegistry {
    pub fn new(root: impl Into<PathBuf>, http: reqwest::Client) -> Self {
        Self::with_sweep_interval(root, http, SWEEP_INTERVAL)
    }

    pub fn with_sweep_interval(
        root: impl Into<PathBuf>,
        http: reqwest::Client,
        interval: Duration,
    ) -> Self {
        Self {
            root: root.into(),
            http,
            sessions: Mutex::new(HashMap::new()),
            throttle: SweepThrottle::new(interval),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the partition file for `id`
    pub fn partition_path(&self, id: &PartitionId) -> PathBuf {
        self.root.join(id.file_name())
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<PartitionId, Arc<CachedSession>>> {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Get the session for (widget type, duration), opening it if needed.
    ///
    /// A registered session whose file vanished from disk is discarded and
    /// reopened. A newly opened partition is swept of expired entries when
    /// the sweep throttle allows it.
    pub fn get_session(
        &self,
        widget_type: &str,
        duration_secs: u64,
    ) -> Result<Arc<CachedSession>, CacheError> {
        let id = PartitionId::new(widget_type, duration_secs);

        let session = {
            let mut sessions = self.sessions();
            if let Some(existing) = sessions.get(&id) {
                if existing.backing_file_exists() {
                    return Ok(Arc::clone(existing));
                }
                log::debug!("Partition file for {:?} vanished, reopening", id);
                sessions.remove(&id);
            }

            let storage = PartitionStorage::open_at(&self.partition_path(&id))?;
            let session = Arc::new(CachedSession::new(
                id.widget_type.clone(),
                Duration::from_secs(duration_secs),
                self.http.clone(),
                storage,
            ));
            sessions.insert(id, Arc::clone(&session));
            session
        };

        if self.throttle.try_claim(Utc::now().timestamp()) {
            if let Err(e) = session.delete_expired() {
                log::warn!("Failed to sweep {}: {}", session.path().display(), e);
            }
        }

        Ok(session)
    }

    /// Sweep every open partition if the throttle allows it.
    ///
    /// Returns the number of entries removed, or `None` when not yet due.
    pub fn sweep_open_partitions(&self, now: i64) -> Option<usize> {
        if !self.throttle.try_claim(now) {
            return None;
        }

        let open: Vec<Arc<CachedSession>> = self.sessions().values().cloned().collect();
        let mut removed = 0;
        for session in open.iter().filter(|s| s.backing_file_exists()) {
            match session.delete_expired() {
                Ok(n) => removed += n,
                Err(e) => log::warn!("Failed to sweep {}: {}", session.path().display(), e),
            }
        }
        Some(removed)
    }

    /// Number of registered sessions
    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> SessionRegistry {
        SessionRegistry::new(dir.path(), reqwest::Client::new())
    }

    #[test]
    fn test_partition_file_name() {
        let id = PartitionId::new("RSS", 3600);
        assert_eq!(id.widget_type, "rss");
        assert_eq!(id.file_name(), "requests-rss-3600.sqlite");
    }

    #[test]
    fn test_same_triple_reuses_handle() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        let first = registry.get_session("rss", 3600).unwrap();
        let second = registry.get_session("rss", 3600).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert!(dir.path().join("requests-rss-3600.sqlite").exists());
    }

    #[test]
    fn test_vanished_file_gets_new_handle() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        let first = registry.get_session("rss", 3600).unwrap();
        let second = registry.get_session("rss", 3600).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        std::fs::remove_file(dir.path().join("requests-rss-3600.sqlite")).unwrap();

        let third = registry.get_session("rss", 3600).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert!(dir.path().join("requests-rss-3600.sqlite").exists());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_distinct_durations_get_distinct_partitions() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        let short = registry.get_session("chucknorris", 300).unwrap();
        let long = registry.get_session("chucknorris", 86400).unwrap();

        assert!(!Arc::ptr_eq(&short, &long));
        assert_eq!(short.duration(), Duration::from_secs(300));
        assert_eq!(long.duration(), Duration::from_secs(86400));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_concurrent_first_use_opens_once() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(registry(&dir));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.get_session("xkcd", 21600).unwrap())
            })
            .collect();
        let sessions: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(sessions.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_throttle() {
        let throttle = SweepThrottle::new(Duration::from_secs(600));
        assert!(throttle.try_claim(1_000));
        assert!(!throttle.try_claim(1_000));
        assert!(!throttle.try_claim(1_599));
        assert!(throttle.try_claim(1_600));
        assert!(!throttle.try_claim(1_700));
    }

    #[test]
    fn test_sweep_open_partitions_respects_throttle() {
        let dir = TempDir::new().unwrap();
        let registry = SessionRegistry::with_sweep_interval(
            dir.path(),
            reqwest::Client::new(),
            Duration::from_secs(600),
        );
        let now = Utc::now().timestamp();

        // Opening the first partition claims the sweep.
        registry.get_session("rss", 3600).unwrap();
        assert_eq!(registry.sweep_open_partitions(now), None);
        assert_eq!(registry.sweep_open_partitions(now + 600), Some(0));
    }
}
