//! RSS and Atom feeds
//!
//! The `reddit`, `youtube` and `lobsters` widgets are the same widget with a
//! derived feed URL; they share the `rss` cache namespace.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::cmp::Reverse;

use super::feed::{self, FeedEntry};
use super::{ArgumentSpec, FETCH_TIMEOUT, Widget, WidgetContext, WidgetKind, parse_params, validate_cache};
use crate::cache::FetchRequest;
use crate::error::{FetchError, WidgetError};

pub const CACHE_TYPE: &str = "rss";

/// Feeds are cached for at least ten minutes, whatever `cache` says
pub const SESSION_TIMEOUT_SECS: u64 = 600;

const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "gif", "png", "svg"];

pub static KIND: WidgetKind = WidgetKind {
    name: "rss",
    cache_type: CACHE_TYPE,
    description: "Items from one or more RSS or Atom feeds",
    default_cache: Some("1h"),
    session_timeout_secs: SESSION_TIMEOUT_SECS,
    alternate_durations: &[],
    arguments: &[
        ArgumentSpec::new("url", "str|list", None),
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

fn default_limit() -> i64 {
    10
}

fn default_show() -> i64 {
    3
}

fn default_true() -> bool {
    true
}

fn default_cache() -> String {
    "1h".to_string()
}

/// Display and caching options shared by every feed widget
#[derive(Debug, Clone, Deserialize)]
pub struct FeedOptions {
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default = "default_show")]
    show: i64,
    #[serde(default)]
    images: bool,
    #[serde(default)]
    imagesmall: bool,
    #[serde(default = "default_true")]
    showname: bool,
    #[serde(default = "default_cache")]
    cache: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedUrls {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct Params {
    url: Option<FeedUrls>,
    #[serde(flatten)]
    options: FeedOptions,
}

/// One rendered feed item
#[derive(Debug, Serialize)]
struct FeedItem {
    title: String,
    link: Option<String>,
    img_url: Option<String>,
    pub_date: Option<String>,
    pub_ts: i64,
    elapsed: Option<String>,
    tags: Vec<String>,
    views: Option<String>,
    /// Source feed title, set when several feeds are merged
    feed_title: Option<String>,
    shown: bool,
}

pub struct Rss {
    kind: &'static WidgetKind,
    urls: Vec<String>,
    options: FeedOptions,
}

fn build(params: Value) -> Result<Box<dyn Widget>, WidgetError> {
    Ok(Box::new(Rss::from_params(params)?))
}

/// Accepts RFC 2822 (`pubDate`) and RFC 3339 (`published`) dates
fn parse_published(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc2822(text.trim())
        .or_else(|_| DateTime::parse_from_rfc3339(text.trim()))
        .ok()
}

/// Approximate age from minutes up to weeks, in the largest whole unit
pub fn elapsed_since(published: DateTime<FixedOffset>, now: DateTime<Utc>) -> String {
    let minutes = (now - published.with_timezone(&Utc)).num_minutes();
    let (hours, minutes) = (minutes / 60, minutes % 60);
    let (days, hours) = (hours / 24, hours % 24);
    let (weeks, days) = (days / 7, days % 7);

    if weeks > 0 {
        format!("{}w", weeks)
    } else if days > 0 {
        format!("{}d", days)
    } else if hours > 0 {
        format!("{}h", hours)
    } else {
        format!("{}m", minutes)
    }
}

/// Shorten a count: 1234 -> "1.2K", 1234567 -> "1.2M"
pub fn short_value(value: &str) -> String {
    let Ok(count) = value.parse::<u64>() else {
        return value.to_string();
    };
    let digits = value.len();
    let short = if digits > 9 {
        format!("{:.1}B", (count / 10_000_000) as f64 / 100.0)
    } else if digits > 6 {
        format!("{:.1}M", (count / 10_000) as f64 / 100.0)
    } else {
        format!("{:.1}K", (count / 10) as f64 / 100.0)
    };
    short.replace(".0", "")
}

/// Uppercase the first letter of every word, lowercase the rest
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

fn tags(entry: &FeedEntry) -> Vec<String> {
    let mut tags: Vec<String> = entry
        .categories
        .iter()
        .flat_map(|term| term.split('/'))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(title_case)
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

fn has_image_extension(url: &str) -> bool {
    let path = url.split('?').next().unwrap_or_default().to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(&format!(".{}", ext)))
}

impl Rss {
    pub fn from_params(params: Value) -> Result<Self, WidgetError> {
        let params: Params = parse_params(&KIND, params)?;
        let urls = match params.url {
            Some(FeedUrls::One(url)) => vec![url],
            Some(FeedUrls::Many(urls)) => urls,
            None => Vec::new(),
        };
        Self::new(&KIND, urls, params.options, "url")
    }

    /// Build a feed widget of `kind` reading `urls`; `source` names the
    /// parameter the URLs came from, for error messages.
    pub(super) fn new(
        kind: &'static WidgetKind,
        urls: Vec<String>,
        options: FeedOptions,
        source: &str,
    ) -> Result<Self, WidgetError> {
        validate_cache(kind, &options.cache)?;

        let urls: Vec<String> = urls.into_iter().filter(|u| !u.trim().is_empty()).collect();
        if urls.is_empty() {
            return Err(WidgetError::Init {
                widget: kind.name.to_string(),
                message: format!("Missing '{}' parameter. It is required.", source),
            });
        }
        if options.limit <= 0 {
            return Err(WidgetError::Init {
                widget: kind.name.to_string(),
                message: format!("Invalid argument: limit={} (must be greater than 0).", options.limit),
            });
        }

        Ok(Self { kind, urls, options })
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    async fn fetch_feed(&self, ctx: &WidgetContext, url: &str) -> Result<feed::Feed, WidgetError> {
        let req = FetchRequest::get(url)
            .timeout(FETCH_TIMEOUT)
            .header("Accept", ACCEPT);
        let resp = ctx.web_fetch(self, req, None).await?;
        let parsed = feed::parse(&resp.text()).map_err(|e| FetchError::InvalidResponse {
            url: url.to_string(),
            message: format!("Failed to parse the feed: {}", e),
        })?;
        Ok(parsed)
    }

    fn item(&self, entry: &FeedEntry, feed_title: Option<&str>, now: DateTime<Utc>) -> FeedItem {
        let published = entry.published.as_deref().and_then(parse_published);
        let img_url = if self.options.images {
            entry
                .thumbnail
                .clone()
                .or_else(|| entry.media_content.clone())
                .filter(|url| has_image_extension(url))
        } else {
            None
        };

        FeedItem {
            title: entry.title.clone().unwrap_or_else(|| "NO TITLE".to_string()),
            link: entry.link.clone(),
            img_url,
            pub_date: published.map(|dt| dt.format("%Y-%m-%d %-I:%M%p").to_string().to_lowercase()),
            pub_ts: published.map(|dt| dt.timestamp()).unwrap_or_default(),
            elapsed: published.map(|dt| elapsed_since(dt, now)),
            tags: tags(entry),
            views: entry.views.as_deref().map(short_value),
            feed_title: feed_title.map(str::to_string),
            shown: false,
        }
    }
}

#[async_trait]
impl Widget for Rss {
    fn kind(&self) -> &'static WidgetKind {
        self.kind
    }

    fn cache_duration(&self) -> Option<&str> {
        Some(&self.options.cache)
    }

    async fn fetch_data(&self, ctx: &WidgetContext) -> Result<Value, WidgetError> {
        let results = join_all(self.urls.iter().map(|url| self.fetch_feed(ctx, url))).await;

        let limit = self.options.limit as usize;
        let merged = self.urls.len() > 1;
        let now = Utc::now();
        let mut titles: Vec<String> = Vec::new();
        let mut items = Vec::new();
        let mut errors = Vec::new();

        for (url, result) in self.urls.iter().zip(results) {
            let parsed = match result {
                Ok(parsed) => parsed,
                Err(e) => {
                    errors.push((url, e));
                    continue;
                }
            };
            if let Some(title) = parsed.title.as_deref().filter(|t| !t.is_empty())
                && !titles.iter().any(|t| t == title)
            {
                titles.push(title.to_string());
            }
            let feed_title = parsed.title.as_deref().filter(|_| merged);
            items.extend(parsed.entries.iter().take(limit).map(|e| self.item(e, feed_title, now)));
        }

        if !errors.is_empty() && errors.len() == self.urls.len() {
            return Err(errors.swap_remove(0).1);
        }
        for (url, e) in &errors {
            log::debug!("[{}] Issue retrieving feed {}: {}", self.kind.name, url, e);
        }

        items.sort_by_key(|item| Reverse(item.pub_ts));
        items.truncate(limit);
        for (idx, item) in items.iter_mut().enumerate() {
            item.shown = (idx as i64) < self.options.show;
        }

        let name = self.options.showname.then(|| {
            self.options.name.clone().unwrap_or_else(|| {
                if titles.is_empty() {
                    "Unknown Title".to_string()
                } else {
                    titles.join(" / ")
                }
            })
        });

        Ok(json!({
            "name": name,
            "items": items,
            "has_more_to_show": self.options.show < self.options.limit,
            "display": {
                "images": self.options.images,
                "imagesmall": self.options.imagesmall,
            },
        }))
    }
}
