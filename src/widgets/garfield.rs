//! Garfield comic strips
//!
//! Strips are looked up on a per-month archive page; the image URL is
//! scraped from the `<img ... alt="garfield D/M/YYYY"/>` tag of the day.

use async_trait::async_trait;
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ArgumentSpec, FETCH_TIMEOUT, Widget, WidgetContext, WidgetKind, parse_params, random_between, validate_cache};
use crate::cache::FetchRequest;
use crate::error::{FetchError, WidgetError};

const BASE_URL: &str = "http://pt.jikos.cz/garfield";

const IMAGE_PATTERN: &str = r#"<img src="([^"]+)" alt="garfield (\d+)/(\d+)/(\d+)"/>"#;

/// New strips show up some time after midnight
const PUBLISH_DELAY_HOURS: i64 = 4;

pub static KIND: WidgetKind = WidgetKind {
    name: "garfield",
    cache_type: "garfield",
    description: "A Garfield strip: latest, random or a given date",
    default_cache: Some("6h"),
    session_timeout_secs: 600,
    alternate_durations: &[],
    arguments: &[
        ArgumentSpec::new("title", "bool", Some("true")),
        ArgumentSpec::new("random", "bool", Some("false")),
        ArgumentSpec::new("date", "str", None),
        ArgumentSpec::cache("6h"),
    ],
    build,
};

fn default_true() -> bool {
    true
}

fn default_cache() -> String {
    "6h".to_string()
}

#[derive(Debug, Deserialize)]
struct Params {
    #[serde(default = "default_true")]
    title: bool,
    #[serde(default)]
    random: bool,
    #[serde(default)]
    date: Option<String>,
    #[serde(default = "default_cache")]
    cache: String,
}

pub struct Garfield {
    params: Params,
    base_url: String,
}

fn build(params: Value) -> Result<Box<dyn Widget>, WidgetError> {
    Ok(Box::new(Garfield::from_params(params)?))
}

/// First published strip
pub fn earliest_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1978, 6, 19).unwrap_or_default()
}

pub fn latest_date() -> NaiveDate {
    (Utc::now() - ChronoDuration::hours(PUBLISH_DELAY_HOURS)).date_naive()
}

/// Resolve the configured `date` against the archive's range
fn requested_date(text: &str, earliest: NaiveDate, latest: NaiveDate) -> Result<NaiveDate, String> {
    let date = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .map_err(|_| format!("Unable to parse the supplied date: '{}'", text))?;
    if date < earliest || date > latest {
        return Err(format!(
            "Invalid Garfield date specified. The date must be between {} and {}.",
            earliest.format("%Y-%m-%d"),
            latest.format("%Y-%m-%d")
        ));
    }
    Ok(date)
}

fn random_date(earliest: NaiveDate, latest: NaiveDate) -> NaiveDate {
    let span = (latest - earliest).num_days().max(0) as u64;
    earliest + ChronoDuration::days(random_between(0, span) as i64)
}

/// Image URL of the strip for `date` on a month archive page
fn find_strip(page: &str, date: NaiveDate) -> Result<Option<String>, regex::Error> {
    let pattern = Regex::new(IMAGE_PATTERN)?;
    let wanted = (date.day(), date.month(), date.year());
    let url = pattern
        .captures_iter(page)
        .filter(|caps| {
            let day = caps[2].parse::<u32>().ok();
            let month = caps[3].parse::<u32>().ok();
            let year = caps[4].parse::<i32>().ok();
            (day, month, year) == (Some(wanted.0), Some(wanted.1), Some(wanted.2))
        })
        .last()
        .map(|caps| caps[1].to_string());
    Ok(url)
}

impl Garfield {
    pub fn from_params(params: Value) -> Result<Self, WidgetError> {
        let params: Params = parse_params(&KIND, params)?;
        validate_cache(&KIND, &params.cache)?;
        Ok(Self {
            params,
            base_url: BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn strip_url(&self, ctx: &WidgetContext, date: NaiveDate) -> Result<Result<String, String>, WidgetError> {
        let month_url = format!("{}/{}/{}/", self.base_url, date.year(), date.month());
        log::debug!("[garfield] Retrieving page {}", month_url);

        let resp = ctx
            .web_fetch(self, FetchRequest::get(&month_url).timeout(FETCH_TIMEOUT), None)
            .await?;
        let found = find_strip(&resp.text(), date).map_err(|e| FetchError::InvalidResponse {
            url: month_url,
            message: e.to_string(),
        })?;

        Ok(found.ok_or_else(|| {
            format!(
                "Failed to retrieve Garfield for {}. Unable to find a suitable URL.",
                date.format("%Y-%m-%d")
            )
        }))
    }
}

#[async_trait]
impl Widget for Garfield {
    fn kind(&self) -> &'static WidgetKind {
        &KIND
    }

    fn cache_duration(&self) -> Option<&str> {
        Some(&self.params.cache)
    }

    async fn fetch_data(&self, ctx: &WidgetContext) -> Result<Value, WidgetError> {
        let (earliest, latest) = (earliest_date(), latest_date());

        let (date, problem) = match self.params.date.as_deref().filter(|d| !d.trim().is_empty()) {
            Some(text) => match requested_date(text, earliest, latest) {
                Ok(date) => (date, None),
                Err(message) => (latest, Some(message)),
            },
            None if self.params.random => (random_date(earliest, latest), None),
            None => (latest, None),
        };

        let mut data = json!({
            "year": date.year(),
            "month": date.month(),
            "day": date.day(),
            "title": self.params.title,
        });
        // the strip is only looked up when the date itself is usable
        let outcome = match problem {
            Some(message) => Err(message),
            None => self.strip_url(ctx, date).await?,
        };
        match outcome {
            Ok(url) => data["url"] = Value::from(url),
            Err(message) => data["error"] = Value::from(message),
        }
        Ok(data)
    }
}
