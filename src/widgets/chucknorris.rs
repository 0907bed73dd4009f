//! Random Chuck Norris jokes from api.chucknorris.io

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{
    ArgumentSpec, DEFAULT_SESSION_TIMEOUT_SECS, FETCH_TIMEOUT, Widget, WidgetContext, WidgetKind,
    parse_params, random_between, validate_cache,
};
use crate::cache::FetchRequest;
use crate::error::{FetchError, WidgetError};

const BASE_URL: &str = "https://api.chucknorris.io";

/// The category list barely changes; it lives in its own partition.
const CATEGORIES_CACHE: &str = "1d";

pub static KIND: WidgetKind = WidgetKind {
    name: "chucknorris",
    cache_type: "chucknorris",
    description: "A random Chuck Norris joke",
    default_cache: Some("5m"),
    session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
    alternate_durations: &[CATEGORIES_CACHE],
    arguments: &[
        ArgumentSpec::new("explicit", "bool", Some("false")),
        ArgumentSpec::cache("5m"),
    ],
    build,
};

fn default_cache() -> String {
    "5m".to_string()
}

#[derive(Debug, Deserialize)]
struct Params {
    #[serde(default)]
    explicit: bool,
    #[serde(default = "default_cache")]
    cache: String,
}

pub struct ChuckNorris {
    params: Params,
    base_url: String,
}

fn build(params: Value) -> Result<Box<dyn Widget>, WidgetError> {
    Ok(Box::new(ChuckNorris::from_params(params)?))
}

impl ChuckNorris {
    pub fn from_params(params: Value) -> Result<Self, WidgetError> {
        let params: Params = parse_params(&KIND, params)?;
        validate_cache(&KIND, &params.cache)?;
        Ok(Self {
            params,
            base_url: BASE_URL.to_string(),
        })
    }

    /// Point the widget at another API host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn categories(&self, ctx: &WidgetContext) -> Vec<String> {
        let req = FetchRequest::get(format!("{}/jokes/categories", self.base_url)).timeout(FETCH_TIMEOUT);
        let categories = match ctx.web_fetch(self, req, Some(CATEGORIES_CACHE)).await {
            Ok(resp) => resp.json::<Vec<String>>().unwrap_or_default(),
            Err(e) => {
                log::debug!("[chucknorris] No categories: {}", e);
                Vec::new()
            }
        };

        categories
            .into_iter()
            .filter(|c| self.params.explicit || c != "explicit")
            .collect()
    }
}

#[async_trait]
impl Widget for ChuckNorris {
    fn kind(&self) -> &'static WidgetKind {
        &KIND
    }

    fn cache_duration(&self) -> Option<&str> {
        Some(&self.params.cache)
    }

    fn cache_key(&self) -> Option<String> {
        Some(KIND.name.to_string())
    }

    async fn fetch_data(&self, ctx: &WidgetContext) -> Result<Value, WidgetError> {
        let categories = self.categories(ctx).await;

        let mut url = format!("{}/jokes/random", self.base_url);
        if !categories.is_empty() {
            let pick = random_between(0, categories.len() as u64 - 1) as usize;
            url = FetchError::url_with_params(&url, &[("category", categories[pick].as_str())])?.to_string();
        }

        let resp = ctx
            .web_fetch(self, FetchRequest::get(url).timeout(FETCH_TIMEOUT), None)
            .await?;
        Ok(resp.json()?)
    }
}
