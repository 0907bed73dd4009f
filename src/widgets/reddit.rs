//! Subreddit feeds

use serde::Deserialize;
use serde_json::Value;

use super::rss::{CACHE_TYPE, FeedOptions, Rss, SESSION_TIMEOUT_SECS};
use super::{ArgumentSpec, Widget, WidgetKind, parse_params};
use crate::error::WidgetError;

const BASE_URL: &str = "https://www.reddit.com/r";

pub static KIND: WidgetKind = WidgetKind {
    name: "reddit",
    cache_type: CACHE_TYPE,
    description: "Posts from a subreddit",
    default_cache: Some("1h"),
    session_timeout_secs: SESSION_TIMEOUT_SECS,
    alternate_durations: &[],
    arguments: &[
        ArgumentSpec::new("subreddit", "str", None),
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
    subreddit: Option<String>,
    #[serde(flatten)]
    options: FeedOptions,
}

fn feed_url(subreddit: &str) -> String {
    format!("{}/{}.rss", BASE_URL, subreddit.trim())
}

fn build(params: Value) -> Result<Box<dyn Widget>, WidgetError> {
    let params: Params = parse_params(&KIND, params)?;
    let urls = params
        .subreddit
        .filter(|v| !v.trim().is_empty())
        .map(|v| feed_url(&v))
        .into_iter()
        .collect();
    Ok(Box::new(Rss::new(&KIND, urls, params.options, "subreddit")?))
}
