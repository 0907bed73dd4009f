//! Out-of-band cache maintenance: list, clean, prune, remove invalid
//!
//! Every operation is best-effort over the files it touches. A failure on
//! one file is recorded in the report and the batch carries on.

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::duration::{human_readable, parse_seconds};
use super::files::{self, CacheFileMeta, PartitionDuration};
use super::registry::SessionRegistry;
use crate::error::CacheError;

/// The cache durations a configured widget can produce partitions for
#[derive(Debug, Clone, PartialEq)]
pub struct CacheFootprint {
    pub widget_type: String,
    /// The configured `cache` code, if any
    pub duration: Option<String>,
    /// Partition duration used when no valid code is configured
    pub fallback_seconds: u64,
    /// Extra codes for sub-resources cached on a different schedule
    pub alternates: Vec<String>,
}

impl CacheFootprint {
    /// `(widget type, human duration)` pairs this widget may have on disk.
    ///
    /// An unparsable primary code falls back to `fallback_seconds`; an
    /// unparsable alternate is skipped.
    pub fn valid_keys(&self) -> Vec<(String, String)> {
        let widget_type = self.widget_type.to_lowercase();
        let primary = self
            .duration
            .as_deref()
            .and_then(|code| parse_seconds(code).ok())
            .unwrap_or(self.fallback_seconds);

        std::iter::once(primary)
            .chain(self.alternates.iter().filter_map(|code| parse_seconds(code).ok()))
            .map(|secs| (widget_type.clone(), human_readable(secs)))
            .collect()
    }
}

/// One file acted upon
#[derive(Debug, Clone, Serialize)]
pub struct FileAction {
    pub path: PathBuf,
    pub widget_type: String,
    pub duration: String,
    pub size_bytes: u64,
}

impl From<&CacheFileMeta> for FileAction {
    fn from(meta: &CacheFileMeta) -> Self {
        Self {
            path: meta.path.clone(),
            widget_type: meta.widget_type.clone(),
            duration: meta.duration.human(),
            size_bytes: meta.size_bytes,
        }
    }
}

/// A file that could not be processed
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub error: String,
}

/// Files currently in the cache
#[derive(Debug, Default, Serialize)]
pub struct ListReport {
    pub files: Vec<CacheFileMeta>,
    pub malformed: Vec<String>,
    pub total_bytes: u64,
}

impl ListReport {
    pub fn count(&self) -> usize {
        self.files.len()
    }
}

/// Outcome of deleting partition files
#[derive(Debug, Default, Serialize)]
pub struct RemovalReport {
    pub removed: Vec<FileAction>,
    pub failed: Vec<FileFailure>,
    pub malformed: Vec<String>,
    pub total_bytes: u64,
}

impl RemovalReport {
    pub fn count(&self) -> usize {
        self.removed.len()
    }

    fn remove(&mut self, meta: &CacheFileMeta) {
        log::info!("Removing {}", meta.path.display());
        match std::fs::remove_file(&meta.path) {
            Ok(()) => {
                self.total_bytes += meta.size_bytes;
                self.removed.push(FileAction::from(meta));
            }
            Err(e) => {
                let err = CacheError::io(&meta.path, e);
                log::warn!("Unable to remove cache file: {}", err);
                self.failed.push(FileFailure {
                    path: meta.path.clone(),
                    size_bytes: meta.size_bytes,
                    error: err.to_string(),
                });
            }
        }
    }
}

/// A partition whose file shrank after evicting expired entries
#[derive(Debug, Clone, Serialize)]
pub struct PrunedPartition {
    pub path: PathBuf,
    pub widget_type: String,
    pub duration: String,
    pub size_before: u64,
    pub size_after: u64,
}

impl PrunedPartition {
    pub fn reclaimed(&self) -> u64 {
        self.size_before - self.size_after
    }
}

/// Outcome of pruning valid partitions
#[derive(Debug, Default, Serialize)]
pub struct PruneReport {
    pub pruned: Vec<PrunedPartition>,
    pub failed: Vec<FileFailure>,
    pub malformed: Vec<String>,
    pub total_bytes: u64,
}

impl PruneReport {
    pub fn count(&self) -> usize {
        self.pruned.len()
    }
}

/// Maintenance operations over one cache root
pub struct CacheMaintenance<'a> {
    sessions: &'a SessionRegistry,
}

impl<'a> CacheMaintenance<'a> {
    pub fn new(sessions: &'a SessionRegistry) -> Self {
        Self { sessions }
    }

    fn root(&self) -> &Path {
        self.sessions.root()
    }

    fn malformed(errors: Vec<CacheError>) -> Vec<String> {
        errors.into_iter().map(|e| e.to_string()).collect()
    }

    /// Every partition with its size and modification time
    pub fn list(&self, widget_type: Option<&str>) -> Result<ListReport, CacheError> {
        let scanned = files::scan(self.root(), widget_type)?;
        let total_bytes = scanned.partitions.iter().map(|f| f.size_bytes).sum();
        Ok(ListReport {
            files: scanned.partitions,
            malformed: Self::malformed(scanned.malformed),
            total_bytes,
        })
    }

    /// Like [`list`](Self::list), but fails on the first malformed file
    pub fn list_strict(&self, widget_type: Option<&str>) -> Result<ListReport, CacheError> {
        let files = files::list_partitions(self.root(), widget_type)?;
        let total_bytes = files.iter().map(|f| f.size_bytes).sum();
        Ok(ListReport {
            files,
            malformed: Vec::new(),
            total_bytes,
        })
    }

    /// Delete every partition, or only those of one widget type
    pub fn clean(&self, widget_type: Option<&str>) -> Result<RemovalReport, CacheError> {
        let scanned = files::scan(self.root(), widget_type)?;
        let mut report = RemovalReport {
            malformed: Self::malformed(scanned.malformed),
            ..Default::default()
        };
        for meta in &scanned.partitions {
            report.remove(meta);
        }
        Ok(report)
    }

    /// Evict expired entries from every partition of a known widget type.
    ///
    /// Only partitions whose file size decreased are reported.
    pub fn prune<S: AsRef<str>>(&self, known_types: &[S]) -> Result<PruneReport, CacheError> {
        let known: HashSet<String> = known_types
            .iter()
            .map(|t| t.as_ref().to_lowercase())
            .collect();
        let scanned = files::scan(self.root(), None)?;
        let mut report = PruneReport {
            malformed: Self::malformed(scanned.malformed),
            ..Default::default()
        };

        for meta in &scanned.partitions {
            let PartitionDuration::Seconds(secs) = meta.duration else {
                log::debug!("Skipping {}: duration is not numeric", meta.path.display());
                continue;
            };
            if !known.contains(&meta.widget_type) {
                log::debug!("Skipping {}: unknown widget type", meta.path.display());
                continue;
            }

            let pruned = self
                .sessions
                .get_session(&meta.widget_type, secs)
                .and_then(|session| session.delete_expired())
                .and_then(|_| file_size(&meta.path));

            match pruned {
                Ok(size_after) if size_after < meta.size_bytes => {
                    log::info!(
                        "Pruned {} ({} -> {} bytes)",
                        meta.path.display(),
                        meta.size_bytes,
                        size_after
                    );
                    let entry = PrunedPartition {
                        path: meta.path.clone(),
                        widget_type: meta.widget_type.clone(),
                        duration: meta.duration.human(),
                        size_before: meta.size_bytes,
                        size_after,
                    };
                    report.total_bytes += entry.reclaimed();
                    report.pruned.push(entry);
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!("Unable to prune {}: {}", meta.path.display(), e);
                    report.failed.push(FileFailure {
                        path: meta.path.clone(),
                        size_bytes: meta.size_bytes,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Delete partitions that no configured widget can produce
    pub fn remove_invalid(&self, footprints: &[CacheFootprint]) -> Result<RemovalReport, CacheError> {
        let valid: HashSet<(String, String)> =
            footprints.iter().flat_map(CacheFootprint::valid_keys).collect();

        let scanned = files::scan(self.root(), None)?;
        let mut report = RemovalReport {
            malformed: Self::malformed(scanned.malformed),
            ..Default::default()
        };

        for meta in &scanned.partitions {
            let key = (meta.widget_type.clone(), meta.duration.human());
            if !valid.contains(&key) {
                report.remove(meta);
            }
        }
        Ok(report)
    }
}

fn file_size(path: &Path) -> Result<u64, CacheError> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| CacheError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::session::CachedResponse;
    use crate::cache::storage::PartitionStorage;
    use std::time::Duration;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> SessionRegistry {
        SessionRegistry::new(dir.path(), reqwest::Client::new())
    }

    fn touch(dir: &Path, name: &str, bytes: usize) {
        std::fs::write(dir.join(name), vec![1u8; bytes]).unwrap();
    }

    fn footprint(widget: &str, duration: Option<&str>, fallback: u64, alternates: &[&str]) -> CacheFootprint {
        CacheFootprint {
            widget_type: widget.to_string(),
            duration: duration.map(String::from),
            fallback_seconds: fallback,
            alternates: alternates.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_footprint_valid_keys() {
        let fp = footprint("ChuckNorris", Some("5m"), 60, &["1d", "bogus"]);
        assert_eq!(
            fp.valid_keys(),
            vec![
                ("chucknorris".to_string(), "5m".to_string()),
                ("chucknorris".to_string(), "1d".to_string()),
            ]
        );
    }

    #[test]
    fn test_footprint_falls_back_to_timeout() {
        assert_eq!(
            footprint("xkcd", None, 3600, &[]).valid_keys(),
            vec![("xkcd".to_string(), "1h".to_string())]
        );
        assert_eq!(
            footprint("xkcd", Some("later"), 3600, &[]).valid_keys(),
            vec![("xkcd".to_string(), "1h".to_string())]
        );
    }

    #[test]
    fn test_list_reports_totals() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "requests-rss-3600.sqlite", 100);
        touch(dir.path(), "requests-xkcd-21600.sqlite", 50);
        touch(dir.path(), "junk.sqlite", 5);

        let registry = registry(&dir);
        let report = CacheMaintenance::new(&registry).list(None).unwrap();

        assert_eq!(report.count(), 2);
        assert_eq!(report.total_bytes, 150);
        assert_eq!(report.malformed.len(), 1);
    }

    #[test]
    fn test_list_empty_root() {
        let dir = TempDir::new().unwrap();
        let registry = SessionRegistry::new(dir.path().join("missing"), reqwest::Client::new());
        let report = CacheMaintenance::new(&registry).list(None).unwrap();
        assert_eq!(report.count(), 0);
        assert_eq!(report.total_bytes, 0);
    }

    #[test]
    fn test_clean_all() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "requests-rss-3600.sqlite", 100);
        touch(dir.path(), "requests-xkcd-21600.sqlite", 50);

        let registry = registry(&dir);
        let report = CacheMaintenance::new(&registry).clean(None).unwrap();

        assert_eq!(report.count(), 2);
        assert_eq!(report.total_bytes, 150);
        assert!(report.failed.is_empty());
        assert!(!dir.path().join("requests-rss-3600.sqlite").exists());
    }

    #[test]
    fn test_clean_by_widget_type() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "requests-rss-3600.sqlite", 100);
        touch(dir.path(), "requests-xkcd-21600.sqlite", 50);

        let registry = registry(&dir);
        let report = CacheMaintenance::new(&registry).clean(Some("xkcd")).unwrap();

        assert_eq!(report.count(), 1);
        assert_eq!(report.removed[0].widget_type, "xkcd");
        assert_eq!(report.removed[0].duration, "6h");
        assert!(dir.path().join("requests-rss-3600.sqlite").exists());
    }

    #[test]
    fn test_clean_nothing_to_do() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let report = CacheMaintenance::new(&registry).clean(Some("rss")).unwrap();
        assert_eq!(report.count(), 0);
    }

    #[test]
    fn test_remove_invalid_keeps_configured_partitions() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "requests-chucknorris-86400.sqlite", 64);
        touch(dir.path(), "requests-rss-3600.sqlite", 32);
        touch(dir.path(), "requests-rss-60.sqlite", 16);

        let registry = registry(&dir);
        let report = CacheMaintenance::new(&registry)
            .remove_invalid(&[footprint("rss", Some("1h"), 60, &[])])
            .unwrap();

        assert!(!dir.path().join("requests-chucknorris-86400.sqlite").exists());
        assert!(!dir.path().join("requests-rss-60.sqlite").exists());
        assert!(dir.path().join("requests-rss-3600.sqlite").exists());
        assert_eq!(report.count(), 2);
        assert_eq!(report.total_bytes, 80);
    }

    #[test]
    fn test_remove_invalid_honours_alternates_and_equivalent_codes() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "requests-chucknorris-300.sqlite", 1);
        touch(dir.path(), "requests-chucknorris-86400.sqlite", 1);

        let registry = registry(&dir);
        let report = CacheMaintenance::new(&registry)
            .remove_invalid(&[footprint("chucknorris", Some("300s"), 60, &["24h"])])
            .unwrap();

        assert_eq!(report.count(), 0);
        assert!(dir.path().join("requests-chucknorris-300.sqlite").exists());
        assert!(dir.path().join("requests-chucknorris-86400.sqlite").exists());
    }

    #[test]
    fn test_prune_reports_only_shrunk_partitions() {
        let dir = TempDir::new().unwrap();
        let expired_path = dir.path().join("requests-xkcd-21600.sqlite");
        let fresh_path = dir.path().join("requests-chucknorris-300.sqlite");
        let stranger_path = dir.path().join("requests-gone-300.sqlite");
        let now = chrono::Utc::now().timestamp();

        let big = CachedResponse {
            url: "https://xkcd.com/info.0.json".to_string(),
            status: 200,
            headers: vec![],
            body: vec![7u8; 256 * 1024],
            elapsed: Duration::ZERO,
            from_cache: false,
        };
        for (path, ttl) in [
            (&expired_path, Duration::from_secs(1)),
            (&fresh_path, Duration::from_secs(3600)),
            (&stranger_path, Duration::from_secs(1)),
        ] {
            let storage = PartitionStorage::open_at(path).unwrap();
            storage.put_at("k", "GET", &big, ttl, now - 10).unwrap();
        }
        let stranger_before = std::fs::metadata(&stranger_path).unwrap().len();

        let registry = registry(&dir);
        let report = CacheMaintenance::new(&registry)
            .prune(&["xkcd", "chucknorris"])
            .unwrap();

        assert_eq!(report.count(), 1);
        assert_eq!(report.pruned[0].path, expired_path);
        assert!(report.pruned[0].size_after < report.pruned[0].size_before);
        assert_eq!(report.total_bytes, report.pruned[0].reclaimed());
        assert_eq!(std::fs::metadata(&stranger_path).unwrap().len(), stranger_before);
    }
}
