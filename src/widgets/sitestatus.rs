//! Site availability checks

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::{
    ArgumentSpec, DEFAULT_SESSION_TIMEOUT_SECS, FETCH_TIMEOUT, Widget, WidgetContext, WidgetKind,
    parse_params, random_between, validate_cache,
};
use crate::cache::FetchRequest;
use crate::cache::duration::parse_seconds;
use crate::error::{FetchError, WidgetError};

/// Always counted as up
const STATUS_OK: u16 = 200;

pub static KIND: WidgetKind = WidgetKind {
    name: "sitestatus",
    cache_type: "sitestatus",
    description: "Check that one or more sites respond",
    default_cache: Some("1m"),
    session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
    alternate_durations: &[],
    arguments: &[
        ArgumentSpec::new("name", "str", Some("Site Status")),
        ArgumentSpec {
            name: "urls",
            kind: "list",
            default: None,
            fields: &[("name", "str"), ("url", "str"), ("status_accept", "list")],
        },
        ArgumentSpec::cache("1m"),
    ],
    build,
};

fn default_name() -> String {
    "Site Status".to_string()
}

fn default_cache() -> String {
    "1m".to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct UrlEntry {
    #[serde(default)]
    name: Option<String>,
    url: String,
    #[serde(default)]
    status_accept: Vec<u16>,
}

#[derive(Debug, Deserialize)]
struct Params {
    #[serde(default = "default_name")]
    name: String,
    urls: Vec<UrlEntry>,
    #[serde(default = "default_cache")]
    cache: String,
}

/// Result of checking one URL
#[derive(Debug, Serialize)]
struct SiteCheck {
    name: Option<String>,
    url: String,
    /// Status code, or "Err" when no response came back
    status_code: Value,
    ok: bool,
    /// Seconds, two decimals
    elapsed: Option<String>,
    domain: String,
    uri: Option<String>,
}

pub struct SiteStatus {
    params: Params,
}

fn build(params: Value) -> Result<Box<dyn Widget>, WidgetError> {
    Ok(Box::new(SiteStatus::from_params(params)?))
}

/// Split `https://host/path` into `("host", Some("path"))`
fn split_url(url: &str) -> (String, Option<String>) {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    match without_scheme.split_once('/') {
        Some((domain, uri)) if !uri.is_empty() => (domain.to_string(), Some(uri.to_string())),
        Some((domain, _)) => (domain.to_string(), None),
        None => (without_scheme.to_string(), None),
    }
}

impl SiteStatus {
    pub fn from_params(params: Value) -> Result<Self, WidgetError> {
        let mut params: Params = parse_params(&KIND, params)?;
        validate_cache(&KIND, &params.cache)?;

        for entry in &mut params.urls {
            if !entry.status_accept.contains(&STATUS_OK) {
                entry.status_accept.push(STATUS_OK);
            }
            entry.status_accept.sort_unstable();
        }

        Ok(Self { params })
    }

    pub fn name(&self) -> &str {
        &self.params.name
    }

    async fn check(&self, ctx: &WidgetContext, entry: &UrlEntry, cache_secs: u64) -> SiteCheck {
        // Spread expiries so checks of many sites don't all refresh at once.
        let low = ((cache_secs as f64 / 1.15) as u64).max(1);
        let expire = random_between(low, cache_secs.max(1));

        let req = FetchRequest::get(&entry.url)
            .timeout(FETCH_TIMEOUT)
            .expire_after(Duration::from_secs(expire))
            .allow_status(entry.status_accept.iter().copied());

        let (status_code, ok, elapsed) = match ctx.web_fetch(self, req, None).await {
            Ok(resp) => (
                Value::from(resp.status),
                true,
                Some(format!("{:.2}", resp.elapsed.as_secs_f64())),
            ),
            Err(WidgetError::Fetch(FetchError::Status { status, .. })) => (Value::from(status), false, None),
            Err(e) => {
                log::debug!("[sitestatus] {} failed: {}", entry.url, e);
                (Value::from("Err"), false, None)
            }
        };

        let (domain, uri) = split_url(&entry.url);
        SiteCheck {
            name: entry.name.clone(),
            url: entry.url.clone(),
            status_code,
            ok,
            elapsed,
            domain,
            uri,
        }
    }
}

#[async_trait]
impl Widget for SiteStatus {
    fn kind(&self) -> &'static WidgetKind {
        &KIND
    }

    fn cache_duration(&self) -> Option<&str> {
        Some(&self.params.cache)
    }

    async fn fetch_data(&self, ctx: &WidgetContext) -> Result<Value, WidgetError> {
        let cache_secs = parse_seconds(&self.params.cache)?;

        let checks = join_all(
            self.params
                .urls
                .iter()
                .filter(|entry| !entry.url.is_empty())
                .map(|entry| self.check(ctx, entry, cache_secs)),
        )
        .await;

        Ok(serde_json::json!({
            "name": self.params.name,
            "sites": checks,
        }))
    }
}
