//! Lobsters tag feeds

use serde::Deserialize;
use serde_json::Value;

use super::rss::{CACHE_TYPE, FeedOptions, Rss, SESSION_TIMEOUT_SECS};
use super::{ArgumentSpec, Widget, WidgetKind, parse_params};
use crate::error::WidgetError;

const BASE_URL: &str = "https://lobste.rs/t";

pub static KIND: WidgetKind = WidgetKind {
    name: "lobsters",
    cache_type: CACHE_TYPE,
    description: "Stories from a Lobsters tag",
    default_cache: Some("1h"),
    session_timeout_secs: SESSION_TIMEOUT_SECS,
    alternate_durations: &[],
    arguments: &[
        ArgumentSpec::new("tag", "str", None),
        ArgumentSpec::new("name", "str", None),
        ArgumentSpec::new("limit", "int", Some("10")),
        ArgumentSpec::new("show", "int", Some("3")),
        ArgumentSpec::new("images", "bool", Some("false")),
        ArgumentSpec::new("imagesmall", "bool", Some("false")),
        ArgumentSpec::new("showname", "bool", Some("true")),
        ArgumentSpec::cache("1h"),
    ],
    build,
};

#[derive(Debug, Deserialize)]
struct Params {
    tag: Option<String>,
    #[serde(flatten)]
    options: FeedOptions,
}

fn feed_url(tag: &str) -> String {
    format!("{}/{}.rss", BASE_URL, tag.trim())
}

fn build(params: Value) -> Result<Box<dyn Widget>, WidgetError> {
    let params: Params = parse_params(&KIND, params)?;
    let urls = params
        .tag
        .filter(|v| !v.trim().is_empty())
        .map(|v| feed_url(&v))
        .into_iter()
        .collect();
    Ok(Box::new(Rss::new(&KIND, urls, params.options, "tag")?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_feed_url() {
        assert_eq!(feed_url("rust"), "https://lobste.rs/t/rust.rss");
    }

    #[test]
    fn test_shares_rss_partitions() {
        let widget = build(json!({"tag": "rust", "cache": "2h"})).unwrap();
        assert_eq!(widget.kind().name, "lobsters");
        let footprint = widget.footprint();
        assert_eq!(footprint.widget_type, "rss");
        assert_eq!(footprint.duration.as_deref(), Some("2h"));
    }

    #[test]
    fn test_tag_required() {
        match build(json!({"limit": 5})) {
            Err(WidgetError::Init { message, .. }) => assert!(message.contains("'tag'")),
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("expected missing tag to fail"),
        }
    }
}
