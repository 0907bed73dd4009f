//! GitHub repository summary

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{
    ArgumentSpec, DEFAULT_SESSION_TIMEOUT_SECS, Widget, WidgetContext, WidgetKind, parse_params,
    validate_cache,
};
use crate::cache::FetchRequest;
use crate::error::WidgetError;

const BASE_URL: &str = "https://api.github.com";

const REPO_DATE_FIELDS: [&str; 3] = ["created_at", "updated_at", "pushed_at"];
const RELEASE_DATE_FIELDS: [&str; 3] = ["created_at", "updated_at", "published_at"];
const RELEASE_FIELDS: [&str; 6] = [
    "name",
    "tag_name",
    "reactions",
    "created_at",
    "published_at",
    "updated_at",
];
const AUTHOR_FIELDS: [&str; 2] = ["login", "avatar_url"];

pub static KIND: WidgetKind = WidgetKind {
    name: "github",
    cache_type: "github",
    description: "GitHub repository information",
    default_cache: Some("1h"),
    session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
    alternate_durations: &[],
    arguments: &[
        ArgumentSpec::new("owner", "str", None),
        ArgumentSpec::new("repository", "str", None),
        ArgumentSpec::new("description", "bool", Some("false")),
        ArgumentSpec::new("license", "bool", Some("false")),
        ArgumentSpec::new("avatar", "bool", Some("true")),
        ArgumentSpec::new("showrelease", "bool", Some("true")),
        ArgumentSpec::new("stats", "bool", Some("true")),
        ArgumentSpec::cache("1h"),
    ],
    build,
};

fn default_true() -> bool {
    true
}

fn default_cache() -> String {
    "1h".to_string()
}

#[derive(Debug, Deserialize)]
struct Params {
    owner: Option<String>,
    repository: Option<String>,
    #[serde(default)]
    description: bool,
    #[serde(default)]
    license: bool,
    #[serde(default = "default_true")]
    avatar: bool,
    #[serde(default = "default_true")]
    showrelease: bool,
    #[serde(default = "default_true")]
    stats: bool,
    #[serde(default = "default_cache")]
    cache: String,
}

pub struct GitHub {
    owner: String,
    repository: String,
    params: Params,
    base_url: String,
}

fn build(params: Value) -> Result<Box<dyn Widget>, WidgetError> {
    Ok(Box::new(GitHub::from_params(params)?))
}

/// Add a `<field>_ts` unix timestamp next to each RFC 3339 date field
pub(super) fn add_timestamps(data: &mut Map<String, Value>, fields: &[&str]) {
    for field in fields {
        let ts = data
            .get(*field)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.timestamp());
        if let Some(ts) = ts {
            data.insert(format!("{}_ts", field), Value::from(ts));
        }
    }
}

pub(super) fn pick(source: &Map<String, Value>, fields: &[&str]) -> Map<String, Value> {
    source
        .iter()
        .filter(|(k, _)| fields.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn summarize_release(mut release: Map<String, Value>) -> Value {
    let author = release
        .get("author")
        .and_then(Value::as_object)
        .map(|a| pick(a, &AUTHOR_FIELDS))
        .unwrap_or_default();

    let mut summary = pick(&release, &RELEASE_FIELDS);
    add_timestamps(&mut release, &RELEASE_DATE_FIELDS);
    for field in RELEASE_DATE_FIELDS {
        let key = format!("{}_ts", field);
        if let Some(ts) = release.remove(&key) {
            summary.insert(key, ts);
        }
    }
    summary.insert("author".to_string(), Value::Object(author));
    Value::Object(summary)
}

impl GitHub {
    pub fn from_params(params: Value) -> Result<Self, WidgetError> {
        let params: Params = parse_params(&KIND, params)?;
        validate_cache(&KIND, &params.cache)?;

        let (Some(owner), Some(repository)) = (params.owner.clone(), params.repository.clone()) else {
            return Err(WidgetError::Init {
                widget: KIND.name.to_string(),
                message: "Required parameters: owner, repository".to_string(),
            });
        };

        Ok(Self {
            owner,
            repository,
            params,
            base_url: BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn repo_url(&self) -> String {
        format!("{}/repos/{}/{}", self.base_url, self.owner, self.repository)
    }

    async fn latest_release(&self, ctx: &WidgetContext) -> Option<Value> {
        let req = FetchRequest::get(format!("{}/releases", self.repo_url()));
        let releases = match ctx.web_fetch(self, req, None).await {
            Ok(resp) => resp.json::<Vec<Map<String, Value>>>().ok()?,
            Err(e) => {
                log::debug!("[github] Releases unavailable for {}/{}: {}", self.owner, self.repository, e);
                return None;
            }
        };
        // newest first
        releases.into_iter().next().map(summarize_release)
    }
}

#[async_trait]
impl Widget for GitHub {
    fn kind(&self) -> &'static WidgetKind {
        &KIND
    }

    fn cache_duration(&self) -> Option<&str> {
        Some(&self.params.cache)
    }

    async fn fetch_data(&self, ctx: &WidgetContext) -> Result<Value, WidgetError> {
        let resp = ctx.web_fetch(self, FetchRequest::get(self.repo_url()), None).await?;
        let mut data: Map<String, Value> = resp.json()?;

        add_timestamps(&mut data, &REPO_DATE_FIELDS);
        let stars = data.remove("stargazers_count").unwrap_or(Value::Null);
        data.insert("stars_count".to_string(), stars);
        let issues = data.remove("open_issues").unwrap_or(Value::Null);
        data.insert("open_issues_count".to_string(), issues);

        if self.params.showrelease
            && let Some(release) = self.latest_release(ctx).await
        {
            data.insert("latest_release".to_string(), release);
        }

        let display = serde_json::json!({
            "description": self.params.description,
            "license": self.params.license,
            "avatar": self.params.avatar,
            "stats": self.params.stats,
        });
        data.insert("display".to_string(), display);

        Ok(Value::Object(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheContext;
    use serde_json::json;
    use tempfile::TempDir;

    const REPO: &str = r#"{
        "full_name": "owner/repo",
        "stargazers_count": 42,
        "open_issues": 3,
        "created_at": "2020-01-01T00:00:00Z",
        "pushed_at": "not a date"
    }"#;

    #[test]
    fn test_owner_and_repository_required() {
        assert!(matches!(
            GitHub::from_params(json!({"owner": "rust-lang"})),
            Err(WidgetError::Init { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_repository_with_release() {
        let mut server = mockito::Server::new_async().await;
        let repo = server
            .mock("GET", "/repos/owner/repo")
            .with_status(200)
            .with_body(REPO)
            .expect(1)
            .create_async()
            .await;
        let releases = server
            .mock("GET", "/repos/owner/repo/releases")
            .with_status(200)
            .with_body(
                r#"[
                    {"name": "v2", "tag_name": "v2.0.0", "published_at": "2024-05-01T12:00:00Z",
                     "author": {"login": "dev", "avatar_url": "https://a/1", "id": 7}, "body": "notes"},
                    {"name": "v1", "tag_name": "v1.0.0"}
                ]"#,
            )
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = WidgetContext::new(CacheContext::shared(dir.path(), reqwest::Client::new()), None);
        let widget = GitHub::from_params(json!({"owner": "owner", "repository": "repo"}))
            .unwrap()
            .with_base_url(server.url());

        let data = widget.fetch_data(&ctx).await.unwrap();

        assert_eq!(data["stars_count"], 42);
        assert_eq!(data["open_issues_count"], 3);
        assert!(data.get("stargazers_count").is_none());
        assert_eq!(data["created_at_ts"], 1577836800);
        assert!(data.get("pushed_at_ts").is_none());

        let release = &data["latest_release"];
        assert_eq!(release["tag_name"], "v2.0.0");
        assert_eq!(release["published_at_ts"], 1714564800);
        assert_eq!(release["author"], json!({"login": "dev", "avatar_url": "https://a/1"}));
        assert!(release.get("body").is_none());

        repo.assert_async().await;
        releases.assert_async().await;
    }

    #[tokio::test]
    async fn test_release_failure_is_tolerated() {
        let mut server = mockito::Server::new_async().await;
        let _repo = server
            .mock("GET", "/repos/owner/repo")
            .with_status(200)
            .with_body(REPO)
            .create_async()
            .await;
        let _releases = server
            .mock("GET", "/repos/owner/repo/releases")
            .with_status(404)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = WidgetContext::new(CacheContext::shared(dir.path(), reqwest::Client::new()), None);
        let widget = GitHub::from_params(json!({"owner": "owner", "repository": "repo"}))
            .unwrap()
            .with_base_url(server.url());

        let data = widget.fetch_data(&ctx).await.unwrap();
        assert!(data.get("latest_release").is_none());
        assert_eq!(data["display"]["avatar"], true);
    }
}
