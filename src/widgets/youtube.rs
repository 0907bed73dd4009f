//! YouTube channel uploads

use serde::Deserialize;
use serde_json::Value;

use super::rss::{CACHE_TYPE, FeedOptions, Rss, SESSION_TIMEOUT_SECS};
use super::{ArgumentSpec, Widget, WidgetKind, parse_params};
use crate::error::{FetchError, WidgetError};

const FEED_URL: &str = "https://www.youtube.com/feeds/videos.xml";

pub static KIND: WidgetKind = WidgetKind {
    name: "youtube",
    cache_type: CACHE_TYPE,
    description: "Latest videos of a YouTube channel",
    default_cache: Some("1h"),
    session_timeout_secs: SESSION_TIMEOUT_SECS,
    alternate_durations: &[],
    arguments: &[
        ArgumentSpec::new("channel_id", "str", None),
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
    channel_id: Option<String>,
    #[serde(flatten)]
    options: FeedOptions,
}

fn feed_url(channel_id: String) -> Result<String, FetchError> {
    Ok(FetchError::url_with_params(FEED_URL, &[("channel_id", channel_id.trim())])?.to_string())
}

fn build(params: Value) -> Result<Box<dyn Widget>, WidgetError> {
    let params: Params = parse_params(&KIND, params)?;
    let urls = params
        .channel_id
        .filter(|v| !v.trim().is_empty())
        .map(feed_url)
        .transpose()?
        .into_iter()
        .collect();
    Ok(Box::new(Rss::new(&KIND, urls, params.options, "channel_id")?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_feed_url() {
        assert_eq!(
            feed_url("UC_x5XG1OV2P6uZZ5FSM9Ttw".to_string()).unwrap(),
            "https://www.youtube.com/feeds/videos.xml?channel_id=UC_x5XG1OV2P6uZZ5FSM9Ttw"
        );
    }

    #[test]
    fn test_shares_rss_partitions() {
        let widget = build(json!({"channel_id": "UC123", "cache": "2h"})).unwrap();
        assert_eq!(widget.kind().name, "youtube");
        let footprint = widget.footprint();
        assert_eq!(footprint.widget_type, "rss");
        assert_eq!(footprint.duration.as_deref(), Some("2h"));
    }

    #[test]
    fn test_channel_id_required() {
        match build(json!({"limit": 5})) {
            Err(WidgetError::Init { message, .. }) => assert!(message.contains("'channel_id'")),
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("expected missing channel_id to fail"),
        }
    }
}
