//! Discovery of partition files under the cache root
//!
//! Partition identity is encoded in the file name
//! (`requests-<widget>-<seconds>.sqlite`), so listing the directory is
//! enough to know which partitions exist.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use super::duration::human_readable;
use super::PARTITION_EXTENSION;
use crate::error::CacheError;

/// SQLite side files living next to a partition
const SIDECAR_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

/// Duration token of a partition file name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PartitionDuration {
    Seconds(u64),
    Raw(String),
}

impl PartitionDuration {
    fn parse(token: &str) -> Self {
        token
            .parse()
            .map(PartitionDuration::Seconds)
            .unwrap_or_else(|_| PartitionDuration::Raw(token.to_string()))
    }

    /// Human form used to compare against configured durations
    pub fn human(&self) -> String {
        match self {
            PartitionDuration::Seconds(secs) => human_readable(*secs),
            PartitionDuration::Raw(raw) => raw.clone(),
        }
    }
}

impl fmt::Display for PartitionDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.human())
    }
}

/// Metadata about one partition file
#[derive(Debug, Clone, Serialize)]
pub struct CacheFileMeta {
    pub path: PathBuf,
    pub tool: String,
    pub widget_type: String,
    pub duration: PartitionDuration,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
}

/// Result of scanning the cache root without failing on bad names
#[derive(Debug, Default)]
pub struct PartitionScan {
    pub partitions: Vec<CacheFileMeta>,
    pub malformed: Vec<CacheError>,
}

/// Split a partition file name into `(tool, widget type, duration)`.
pub fn decode_partition_name(path: &Path) -> Result<(String, String, PartitionDuration), CacheError> {
    let malformed = || CacheError::MalformedCacheFile(path.to_path_buf());

    let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(malformed)?;
    let stem = name
        .strip_suffix(&format!(".{}", PARTITION_EXTENSION))
        .unwrap_or(name);

    let tokens: Vec<&str> = stem.split('-').collect();
    match tokens.as_slice() {
        [tool, widget_type, duration]
            if !tool.is_empty() && !widget_type.is_empty() && !duration.is_empty() =>
        {
            Ok((
                tool.to_string(),
                widget_type.to_string(),
                PartitionDuration::parse(duration),
            ))
        }
        _ => Err(malformed()),
    }
}

fn is_sidecar(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| SIDECAR_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)))
}

fn read_meta(path: &Path) -> Result<CacheFileMeta, CacheError> {
    let (tool, widget_type, duration) = decode_partition_name(path)?;
    let metadata = std::fs::metadata(path).map_err(|e| CacheError::io(path, e))?;
    let last_modified = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .map_err(|e| CacheError::io(path, e))?;

    Ok(CacheFileMeta {
        path: path.to_path_buf(),
        tool,
        widget_type,
        duration,
        size_bytes: metadata.len(),
        last_modified,
    })
}

/// Scan `root` for partitions, collecting malformed files separately.
///
/// A missing root yields an empty scan. Results are sorted by path.
pub fn scan(root: &Path, widget_type: Option<&str>) -> Result<PartitionScan, CacheError> {
    let mut result = PartitionScan::default();

    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(result),
        Err(e) => return Err(CacheError::io(root, e)),
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && !is_sidecar(path))
        .collect();
    paths.sort();

    let filter = widget_type.map(str::to_lowercase);
    for path in paths {
        match read_meta(&path) {
            Ok(meta) => {
                if filter.as_deref().is_none_or(|w| meta.widget_type == w) {
                    result.partitions.push(meta);
                }
            }
            Err(e) => {
                log::warn!("{}", e);
                result.malformed.push(e);
            }
        }
    }

    Ok(result)
}

/// List partitions under `root`, failing on the first malformed file.
pub fn list_partitions(root: &Path, widget_type: Option<&str>) -> Result<Vec<CacheFileMeta>, CacheError> {
    let mut scanned = scan(root, widget_type)?;
    if !scanned.malformed.is_empty() {
        return Err(scanned.malformed.remove(0));
    }
    Ok(scanned.partitions)
}
