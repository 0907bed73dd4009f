//! Display model implementations for table output

use std::path::Path;

use tabled::Tabled;

use crate::cache::files::CacheFileMeta;
use crate::cache::maintenance::{FileAction, PrunedPartition};
use crate::output::{format_local_time, format_size};
use crate::widgets::{ArgumentSpec, WidgetKind};

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn or_dash(value: String) -> String {
    if value.is_empty() { "-".to_string() } else { value }
}

/// Partition file row for `cache list`
#[derive(Debug, Clone, Tabled)]
pub struct CacheFileDisplay {
    #[tabled(rename = "FILE")]
    pub file: String,

    #[tabled(rename = "WIDGET")]
    pub widget_type: String,

    #[tabled(rename = "DURATION")]
    pub duration: String,

    #[tabled(rename = "SIZE")]
    pub size: String,

    #[tabled(rename = "MODIFIED")]
    pub modified: String,
}

impl From<&CacheFileMeta> for CacheFileDisplay {
    fn from(meta: &CacheFileMeta) -> Self {
        Self {
            file: file_name(&meta.path),
            widget_type: meta.widget_type.clone(),
            duration: meta.duration.human(),
            size: format_size(meta.size_bytes),
            modified: format_local_time(meta.last_modified),
        }
    }
}

/// Deleted partition row for `cache clean` and `cache prune`
#[derive(Debug, Clone, Tabled)]
pub struct RemovedDisplay {
    #[tabled(rename = "FILE")]
    pub file: String,

    #[tabled(rename = "WIDGET")]
    pub widget_type: String,

    #[tabled(rename = "DURATION")]
    pub duration: String,

    #[tabled(rename = "SIZE")]
    pub size: String,
}

impl From<&FileAction> for RemovedDisplay {
    fn from(action: &FileAction) -> Self {
        Self {
            file: file_name(&action.path),
            widget_type: action.widget_type.clone(),
            duration: action.duration.clone(),
            size: format_size(action.size_bytes),
        }
    }
}

/// Shrunk partition row for `cache prune`
#[derive(Debug, Clone, Tabled)]
pub struct PrunedDisplay {
    #[tabled(rename = "FILE")]
    pub file: String,

    #[tabled(rename = "BEFORE")]
    pub before: String,

    #[tabled(rename = "AFTER")]
    pub after: String,

    #[tabled(rename = "RECLAIMED")]
    pub reclaimed: String,
}

impl From<&PrunedPartition> for PrunedDisplay {
    fn from(entry: &PrunedPartition) -> Self {
        Self {
            file: file_name(&entry.path),
            before: format_size(entry.size_before),
            after: format_size(entry.size_after),
            reclaimed: format_size(entry.reclaimed()),
        }
    }
}

/// Registered widget type row for `widgets`
#[derive(Debug, Clone, Tabled)]
pub struct WidgetKindDisplay {
    #[tabled(rename = "TYPE")]
    pub name: String,

    #[tabled(rename = "CACHE")]
    pub default_cache: String,

    #[tabled(rename = "ALTERNATES")]
    pub alternates: String,

    #[tabled(rename = "DESCRIPTION")]
    pub description: String,
}

impl From<&WidgetKind> for WidgetKindDisplay {
    fn from(kind: &WidgetKind) -> Self {
        Self {
            name: kind.name.to_string(),
            default_cache: kind.default_cache.unwrap_or("-").to_string(),
            alternates: or_dash(kind.alternate_durations.join(", ")),
            description: kind.description.to_string(),
        }
    }
}

/// Widget argument row for `widgets <TYPE>`
#[derive(Debug, Clone, Tabled)]
pub struct ArgumentDisplay {
    #[tabled(rename = "ARGUMENT")]
    pub name: String,

    #[tabled(rename = "TYPE")]
    pub kind: String,

    #[tabled(rename = "DEFAULT")]
    pub default: String,
}

impl From<&ArgumentSpec> for ArgumentDisplay {
    fn from(arg: &ArgumentSpec) -> Self {
        let kind = if arg.fields.is_empty() {
            arg.kind.to_string()
        } else {
            let fields: Vec<String> = arg
                .fields
                .iter()
                .map(|(name, kind)| format!("{}: {}", name, kind))
                .collect();
            format!("{} of {{{}}}", arg.kind, fields.join(", "))
        };
        Self {
            name: arg.name.to_string(),
            kind,
            default: arg.default.unwrap_or("required").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widgets::{chucknorris, sitestatus};

    #[test]
    fn test_widget_kind_display() {
        let row = WidgetKindDisplay::from(&chucknorris::KIND);
        assert_eq!(row.name, "chucknorris");
        assert_eq!(row.default_cache, "5m");
        assert_eq!(row.alternates, "1d");
    }

    #[test]
    fn test_argument_display_nested_fields() {
        let urls = sitestatus::KIND
            .arguments
            .iter()
            .find(|a| a.name == "urls")
            .unwrap();
        let row = ArgumentDisplay::from(urls);
        assert_eq!(row.kind, "list of {name: str, url: str, status_accept: list}");
        assert_eq!(row.default, "required");
    }

    #[test]
    fn test_removed_display_uses_file_name() {
        let action = FileAction {
            path: Path::new("/var/cache/informer/requests-rss-3600.sqlite").to_path_buf(),
            widget_type: "rss".to_string(),
            duration: "1h".to_string(),
            size_bytes: 2048,
        };
        let row = RemovedDisplay::from(&action);
        assert_eq!(row.file, "requests-rss-3600.sqlite");
        assert_eq!(row.size, "2.00 KB");
    }
}
