//! Ron Swanson quotes

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{
    ArgumentSpec, DEFAULT_SESSION_TIMEOUT_SECS, FETCH_TIMEOUT, Widget, WidgetContext, WidgetKind,
    parse_params, validate_cache,
};
use crate::cache::FetchRequest;
use crate::error::WidgetError;

const BASE_URL: &str = "https://ron-swanson-quotes.herokuapp.com";

pub static KIND: WidgetKind = WidgetKind {
    name: "ronswanson",
    cache_type: "ronswanson",
    description: "Random Ron Swanson quotes",
    default_cache: Some("5m"),
    session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
    alternate_durations: &[],
    arguments: &[
        ArgumentSpec::new("number", "int", Some("1")),
        ArgumentSpec::cache("5m"),
    ],
    build,
};

fn default_number() -> u32 {
    1
}

fn default_cache() -> String {
    "5m".to_string()
}

#[derive(Debug, Deserialize)]
struct Params {
    #[serde(default = "default_number")]
    number: u32,
    #[serde(default = "default_cache")]
    cache: String,
}

pub struct RonSwanson {
    params: Params,
    base_url: String,
}

fn build(params: Value) -> Result<Box<dyn Widget>, WidgetError> {
    Ok(Box::new(RonSwanson::from_params(params)?))
}

impl RonSwanson {
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
}

#[async_trait]
impl Widget for RonSwanson {
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
        let url = format!("{}/v2/quotes/{}", self.base_url, self.params.number);
        let resp = ctx
            .web_fetch(self, FetchRequest::get(url).timeout(FETCH_TIMEOUT), None)
            .await?;

        let quotes = match resp.json::<Value>()? {
            Value::Array(quotes) => Value::Array(quotes),
            single => Value::Array(vec![single]),
        };
        Ok(json!({ "quotes": quotes }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheContext;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fetch_quotes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/quotes/2")
            .with_status(200)
            .with_body(r#"["Never half-ass two things.","Fishing relaxes me."]"#)
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = WidgetContext::new(CacheContext::shared(dir.path(), reqwest::Client::new()), None);
        let widget = RonSwanson::from_params(json!({"number": 2}))
            .unwrap()
            .with_base_url(server.url());

        let data = widget.fetch_data(&ctx).await.unwrap();

        assert_eq!(data["quotes"].as_array().unwrap().len(), 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_repeat_fetch_served_from_partition() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/quotes/1")
            .with_status(200)
            .with_body(r#"["I know more than you."]"#)
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = WidgetContext::new(CacheContext::shared(dir.path(), reqwest::Client::new()), None);
        let widget = RonSwanson::from_params(json!({})).unwrap().with_base_url(server.url());

        let first = widget.fetch_data(&ctx).await.unwrap();
        let second = widget.fetch_data(&ctx).await.unwrap();

        assert_eq!(first, second);
        assert!(dir.path().join("requests-ronswanson-300.sqlite").exists());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_single_quote_is_wrapped() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/quotes/1")
            .with_status(200)
            .with_body(r#""Clear alcohols are for rich women on diets.""#)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = WidgetContext::new(CacheContext::shared(dir.path(), reqwest::Client::new()), None);
        let widget = RonSwanson::from_params(json!({})).unwrap().with_base_url(server.url());

        let data = widget.fetch_data(&ctx).await.unwrap();
        assert_eq!(data["quotes"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/quotes/1")
            .with_status(502)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = WidgetContext::new(CacheContext::shared(dir.path(), reqwest::Client::new()), None);
        let widget = RonSwanson::from_params(json!({})).unwrap().with_base_url(server.url());

        assert!(matches!(
            widget.fetch_data(&ctx).await,
            Err(WidgetError::Fetch(_))
        ));
    }

    #[test]
    fn test_negative_number_rejected() {
        assert!(RonSwanson::from_params(json!({"number": -3})).is_err());
    }
}
