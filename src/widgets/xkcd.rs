//! Latest xkcd comic

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{ArgumentSpec, Widget, WidgetContext, WidgetKind, parse_params, validate_cache};
use crate::cache::FetchRequest;
use crate::error::WidgetError;

const URL: &str = "https://xkcd.com/info.0.json";

pub static KIND: WidgetKind = WidgetKind {
    name: "xkcd",
    cache_type: "xkcd",
    description: "The latest xkcd comic",
    default_cache: Some("6h"),
    // at least an hour of HTTP caching even with a bad `cache` code
    session_timeout_secs: 3600,
    alternate_durations: &[],
    arguments: &[ArgumentSpec::cache("6h")],
    build,
};

fn default_cache() -> String {
    "6h".to_string()
}

#[derive(Debug, Deserialize)]
struct Params {
    #[serde(default = "default_cache")]
    cache: String,
}

pub struct Xkcd {
    params: Params,
    url: String,
}

fn build(params: Value) -> Result<Box<dyn Widget>, WidgetError> {
    Ok(Box::new(Xkcd::from_params(params)?))
}

impl Xkcd {
    pub fn from_params(params: Value) -> Result<Self, WidgetError> {
        let params: Params = parse_params(&KIND, params)?;
        validate_cache(&KIND, &params.cache)?;
        Ok(Self {
            params,
            url: URL.to_string(),
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl Widget for Xkcd {
    fn kind(&self) -> &'static WidgetKind {
        &KIND
    }

    fn cache_duration(&self) -> Option<&str> {
        Some(&self.params.cache)
    }

    async fn fetch_data(&self, ctx: &WidgetContext) -> Result<Value, WidgetError> {
        let resp = ctx.web_fetch(self, FetchRequest::get(&self.url), None).await?;
        Ok(resp.json()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheContext;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fetch_comic_forwards_user_agent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/info.0.json")
            .match_header("user-agent", "informer-test")
            .with_status(200)
            .with_body(r#"{"num": 2950, "title": "Cache Invalidation"}"#)
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = WidgetContext::new(
            CacheContext::shared(dir.path(), reqwest::Client::new()),
            Some("informer-test".to_string()),
        );
        let widget = Xkcd::from_params(json!({}))
            .unwrap()
            .with_url(format!("{}/info.0.json", server.url()));

        let data = widget.fetch_data(&ctx).await.unwrap();

        assert_eq!(data["num"], 2950);
        assert!(widget.cache_key().is_none());
        mock.assert_async().await;
        assert!(dir.path().join("requests-xkcd-21600.sqlite").exists());
    }
}
