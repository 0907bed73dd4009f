//! Gitea repository summary

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::github::{add_timestamps, pick};
use super::{ArgumentSpec, DEFAULT_SESSION_TIMEOUT_SECS, Widget, WidgetContext, WidgetKind, parse_params, validate_cache};
use crate::cache::FetchRequest;
use crate::error::WidgetError;

const API_PATH: &str = "/api/v1/repos";

const REPO_DATE_FIELDS: [&str; 3] = ["created_at", "updated_at", "archived_at"];
const RELEASE_DATE_FIELDS: [&str; 2] = ["created_at", "published_at"];
const RELEASE_FIELDS: [&str; 6] = [
    "name",
    "tag_name",
    "created_at",
    "created_at_ts",
    "published_at",
    "published_at_ts",
];
const AUTHOR_FIELDS: [&str; 2] = ["login", "avatar_url"];

pub static KIND: WidgetKind = WidgetKind {
    name: "gitea",
    cache_type: "gitea",
    description: "Gitea repository information",
    default_cache: Some("1h"),
    session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
    alternate_durations: &[],
    arguments: &[
        ArgumentSpec::new("url", "str", None),
        ArgumentSpec::new("token", "str", None),
        ArgumentSpec::new("owner", "str", None),
        ArgumentSpec::new("repository", "str", None),
        ArgumentSpec::new("description", "bool", Some("false")),
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
    url: Option<String>,
    token: Option<String>,
    owner: Option<String>,
    repository: Option<String>,
    #[serde(default)]
    description: bool,
    #[serde(default = "default_true")]
    avatar: bool,
    #[serde(default = "default_true")]
    showrelease: bool,
    #[serde(default = "default_true")]
    stats: bool,
    #[serde(default = "default_cache")]
    cache: String,
}

pub struct Gitea {
    repo_url: String,
    token: String,
    params: Params,
}

fn build(params: Value) -> Result<Box<dyn Widget>, WidgetError> {
    Ok(Box::new(Gitea::from_params(params)?))
}

impl Gitea {
    pub fn from_params(params: Value) -> Result<Self, WidgetError> {
        let params: Params = parse_params(&KIND, params)?;
        validate_cache(&KIND, &params.cache)?;

        let (Some(url), Some(token), Some(owner), Some(repository)) = (
            params.url.as_deref(),
            params.token.clone(),
            params.owner.as_deref(),
            params.repository.as_deref(),
        ) else {
            return Err(WidgetError::Init {
                widget: KIND.name.to_string(),
                message: "Required parameters: url, token, owner, repository".to_string(),
            });
        };

        let repo_url = format!("{}{}/{}/{}", url.trim_end_matches('/'), API_PATH, owner, repository);
        Ok(Self {
            repo_url,
            token,
            params,
        })
    }

    fn request(&self, url: String) -> FetchRequest {
        FetchRequest::get(url).header("Authorization", format!("token {}", self.token))
    }

    /// The oldest entry of the release list, as Gitea returns it
    async fn latest_release(&self, ctx: &WidgetContext) -> Option<Value> {
        let req = self.request(format!("{}/releases", self.repo_url));
        let releases = match ctx.web_fetch(self, req, None).await {
            Ok(resp) => resp.json::<Vec<Map<String, Value>>>().ok()?,
            Err(e) => {
                log::debug!("[gitea] Releases unavailable for {}: {}", self.repo_url, e);
                return None;
            }
        };
        let mut release = releases.into_iter().last()?;
        add_timestamps(&mut release, &RELEASE_DATE_FIELDS);

        let author = release
            .get("author")
            .and_then(Value::as_object)
            .map(|a| pick(a, &AUTHOR_FIELDS))
            .unwrap_or_default();
        let mut summary = pick(&release, &RELEASE_FIELDS);
        summary.insert("author".to_string(), Value::Object(author));
        Some(Value::Object(summary))
    }
}

#[async_trait]
impl Widget for Gitea {
    fn kind(&self) -> &'static WidgetKind {
        &KIND
    }

    fn cache_duration(&self) -> Option<&str> {
        Some(&self.params.cache)
    }

    async fn fetch_data(&self, ctx: &WidgetContext) -> Result<Value, WidgetError> {
        let resp = ctx.web_fetch(self, self.request(self.repo_url.clone()), None).await?;
        let mut data: Map<String, Value> = resp.json()?;

        add_timestamps(&mut data, &REPO_DATE_FIELDS);
        let private = data.get("private").and_then(Value::as_bool) == Some(true);
        data.insert("visibility".to_string(), Value::from(if private { "private" } else { "public" }));
        let fork = data.remove("fork").and_then(|v| v.as_bool()) == Some(true);
        data.insert("allow_forking".to_string(), Value::from(fork));

        if self.params.showrelease
            && let Some(release) = self.latest_release(ctx).await
        {
            data.insert("latest_release".to_string(), release);
        }

        data.insert(
            "display".to_string(),
            json!({
                "description": self.params.description,
                "avatar": self.params.avatar,
                "stats": self.params.stats,
            }),
        );

        Ok(Value::Object(data))
    }
}
