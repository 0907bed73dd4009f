//! Table output formatting

use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Rows},
};

/// Format data as a table
pub fn format_table<T: Tabled>(data: &[T]) -> String {
    if data.is_empty() {
        return "No results found.".to_string();
    }

    let mut table = Table::new(data);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::maintenance::{FileAction, PrunedPartition};
    use crate::models::{PrunedDisplay, RemovedDisplay, WidgetKindDisplay};
    use crate::widgets::{chucknorris, xkcd};
    use std::path::PathBuf;

    fn removed(widget_type: &str, seconds: u64, duration: &str, size_bytes: u64) -> RemovedDisplay {
        RemovedDisplay::from(&FileAction {
            path: PathBuf::from(format!("/cache/requests-{}-{}.sqlite", widget_type, seconds)),
            widget_type: widget_type.to_string(),
            duration: duration.to_string(),
            size_bytes,
        })
    }

    #[test]
    fn test_format_table_empty() {
        let rows: Vec<RemovedDisplay> = vec![];
        assert_eq!(format_table(&rows), "No results found.");
    }

    #[test]
    fn test_removed_files_table() {
        let rows = vec![
            removed("chucknorris", 86400, "1d", 2048),
            removed("rss", 3600, "1h", 10),
        ];

        let result = format_table(&rows);

        for header in ["FILE", "WIDGET", "DURATION", "SIZE"] {
            assert!(result.contains(header), "missing {}", header);
        }
        assert!(result.contains("requests-chucknorris-86400.sqlite"));
        assert!(!result.contains("/cache/"));
        assert!(result.contains("2.00 KB"));
        assert!(result.contains("10 bytes"));
        assert!(result.starts_with('╭'));
        assert!(result.contains('╰'));
    }

    #[test]
    fn test_pruned_partitions_table() {
        let rows = vec![PrunedDisplay::from(&PrunedPartition {
            path: PathBuf::from("/cache/requests-xkcd-21600.sqlite"),
            widget_type: "xkcd".to_string(),
            duration: "6h".to_string(),
            size_before: 4096,
            size_after: 1024,
        })];

        let result = format_table(&rows);

        assert!(result.contains("RECLAIMED"));
        assert!(result.contains("4.00 KB"));
        assert!(result.contains("3.00 KB"));
    }

    #[test]
    fn test_widget_kinds_table() {
        let rows: Vec<WidgetKindDisplay> = [&chucknorris::KIND, &xkcd::KIND]
            .into_iter()
            .map(WidgetKindDisplay::from)
            .collect();

        let result = format_table(&rows);

        assert!(result.contains("ALTERNATES"));
        assert!(result.contains("chucknorris"));
        assert!(result.contains("1d"));
        // one header line, two rows, three borders
        assert_eq!(result.lines().count(), 6);
    }
}
