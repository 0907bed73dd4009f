//! Dashboard widgets
//!
//! Each widget type is described by a static [`WidgetKind`] and collected
//! into a [`WidgetRegistry`] at startup. Widgets fetch their data through a
//! [`WidgetContext`], which routes outbound requests through the cache
//! partition matching the widget's configured duration.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::hash::{BuildHasher, RandomState};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::cache::duration::parse_seconds;
use crate::cache::{CacheContext, CacheFootprint, CachedResponse, FetchRequest};
use crate::config::WidgetConfig;
use crate::error::{CacheError, WidgetError};

pub mod chucknorris;
pub mod feed;
pub mod garfield;
pub mod gitea;
pub mod github;
pub mod lobsters;
pub mod openmeteo;
pub mod reddit;
pub mod ronswanson;
pub mod rss;
pub mod sitestatus;
pub mod xkcd;
pub mod youtube;

/// Partition duration used when a widget has no usable `cache` code
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 60;

/// Request timeout shared by the built-in widgets
pub(crate) const FETCH_TIMEOUT: Duration = crate::cache::session::DEFAULT_TIMEOUT;

/// Sent upstream when the dashboard request carried no User-Agent
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36";

/// A configurable widget parameter, shown by `informer widgets`
#[derive(Debug)]
pub struct ArgumentSpec {
    pub name: &'static str,
    pub kind: &'static str,
    pub default: Option<&'static str>,
    /// Fields of list entries, for list-valued parameters
    pub fields: &'static [(&'static str, &'static str)],
}

impl ArgumentSpec {
    pub const fn new(name: &'static str, kind: &'static str, default: Option<&'static str>) -> Self {
        Self {
            name,
            kind,
            default,
            fields: &[],
        }
    }

    pub const fn cache(default: &'static str) -> Self {
        Self::new("cache", "duration", Some(default))
    }
}

/// Factory building a widget from its configuration parameters
pub type BuildFn = fn(Value) -> Result<Box<dyn Widget>, WidgetError>;

/// Static description of a widget type
pub struct WidgetKind {
    /// Lowercased type name used in the configuration
    pub name: &'static str,
    /// Memory bucket and partition namespace; shared by feed variants
    pub cache_type: &'static str,
    pub description: &'static str,
    pub default_cache: Option<&'static str>,
    pub session_timeout_secs: u64,
    /// Durations used for sub-resources cached on another schedule
    pub alternate_durations: &'static [&'static str],
    pub arguments: &'static [ArgumentSpec],
    pub build: BuildFn,
}

impl WidgetKind {
    /// Partitions a widget of this kind with the given `cache` code may use
    pub fn footprint(&self, cache_duration: Option<&str>) -> CacheFootprint {
        CacheFootprint {
            widget_type: self.cache_type.to_string(),
            duration: cache_duration.or(self.default_cache).map(str::to_string),
            fallback_seconds: self.session_timeout_secs,
            alternates: self.alternate_durations.iter().map(|d| d.to_string()).collect(),
        }
    }
}

impl std::fmt::Debug for WidgetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetKind")
            .field("name", &self.name)
            .field("cache_type", &self.cache_type)
            .field("default_cache", &self.default_cache)
            .field("session_timeout_secs", &self.session_timeout_secs)
            .field("alternate_durations", &self.alternate_durations)
            .finish()
    }
}

/// A configured widget instance
#[async_trait]
pub trait Widget: Send + Sync {
    fn kind(&self) -> &'static WidgetKind;

    /// The configured `cache` duration code
    fn cache_duration(&self) -> Option<&str>;

    /// Key under which post-processed data is kept in the memory cache.
    /// `None` opts out.
    fn cache_key(&self) -> Option<String> {
        None
    }

    /// Fetch the data the dashboard shows for this widget
    async fn fetch_data(&self, ctx: &WidgetContext) -> Result<Value, WidgetError>;

    /// Partitions this widget may have on disk
    fn footprint(&self) -> CacheFootprint {
        self.kind().footprint(self.cache_duration())
    }
}

/// Decode widget parameters, reporting failures against the widget type
pub(crate) fn parse_params<T: DeserializeOwned>(kind: &WidgetKind, params: Value) -> Result<T, WidgetError> {
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params
    };
    serde_json::from_value(params).map_err(|e| WidgetError::InvalidArgument {
        widget: kind.name.to_string(),
        message: e.to_string(),
    })
}

/// Reject a malformed `cache` code at construction time
pub(crate) fn validate_cache(kind: &WidgetKind, code: &str) -> Result<(), WidgetError> {
    parse_seconds(code)
        .map(|_| ())
        .map_err(|_| WidgetError::InvalidDuration {
            widget: kind.name.to_string(),
            code: code.to_string(),
        })
}

/// Shorten a duration code for memory caching.
///
/// Durations above two minutes are halved and expressed in whole minutes,
/// halving again until the result is under 120 minutes. Shorter codes are
/// returned unchanged.
pub fn short_duration_code(code: &str) -> Result<String, CacheError> {
    let seconds = parse_seconds(code)?;
    if seconds <= 120 {
        return Ok(code.to_string());
    }

    let half_minutes = |minutes_in_seconds: u64| minutes_in_seconds / 2 / 60;
    let mut minutes = half_minutes(seconds);
    while minutes >= 120 {
        minutes = half_minutes(minutes * 60);
    }
    Ok(format!("{}m", minutes))
}

/// Pseudo-random value in `low..=high`
pub(crate) fn random_between(low: u64, high: u64) -> u64 {
    if high <= low {
        return low;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let roll = RandomState::new().hash_one(nanos);
    low + roll % (high - low + 1)
}

/// Explicit table of the built-in widget types
pub struct WidgetRegistry {
    kinds: BTreeMap<&'static str, &'static WidgetKind>,
}

impl WidgetRegistry {
    pub fn builtin() -> Self {
        Self::from_kinds(&[
            &chucknorris::KIND,
            &garfield::KIND,
            &gitea::KIND,
            &github::KIND,
            &lobsters::KIND,
            &openmeteo::KIND,
            &reddit::KIND,
            &ronswanson::KIND,
            &rss::KIND,
            &sitestatus::KIND,
            &xkcd::KIND,
            &youtube::KIND,
        ])
    }

    pub fn from_kinds(kinds: &[&'static WidgetKind]) -> Self {
        Self {
            kinds: kinds.iter().map(|k| (k.name, *k)).collect(),
        }
    }

    pub fn get(&self, widget_type: &str) -> Option<&'static WidgetKind> {
        self.kinds.get(widget_type.to_lowercase().as_str()).copied()
    }

    /// Registered kinds, sorted by name
    pub fn kinds(&self) -> impl Iterator<Item = &'static WidgetKind> + '_ {
        self.kinds.values().copied()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.kinds.keys().copied().collect()
    }

    /// Distinct partition namespaces, sorted
    pub fn cache_types(&self) -> Vec<&'static str> {
        let mut types: Vec<&'static str> = self.kinds.values().map(|k| k.cache_type).collect();
        types.sort_unstable();
        types.dedup();
        types
    }

    /// Partitions the configured widgets may use.
    ///
    /// A widget whose parameters do not build still keeps the partitions its
    /// type and `cache` code point at. Unknown types keep nothing.
    pub fn footprints<'a>(&self, widgets: impl IntoIterator<Item = &'a WidgetConfig>) -> Vec<CacheFootprint> {
        widgets
            .into_iter()
            .filter_map(|config| {
                let Some(kind) = self.get(&config.kind) else {
                    log::warn!("Widget {} has unknown type '{}'", config.id, config.kind);
                    return None;
                };
                let footprint = match (kind.build)(config.params_value()) {
                    Ok(widget) => widget.footprint(),
                    Err(e) => {
                        log::warn!("Widget {} ({}): {}", config.id, kind.name, e);
                        kind.footprint(config.params.get("cache").and_then(Value::as_str))
                    }
                };
                Some(footprint)
            })
            .collect()
    }

    /// Build a widget of `widget_type` from its parameters
    pub fn build(&self, widget_type: &str, params: Value) -> Result<Box<dyn Widget>, WidgetError> {
        let kind = self
            .get(widget_type)
            .ok_or_else(|| WidgetError::UnknownType(widget_type.to_string()))?;
        (kind.build)(params)
    }
}

/// What a widget sees while fetching: the shared cache and the caller's
/// User-Agent.
#[derive(Clone)]
pub struct WidgetContext {
    cache: Arc<CacheContext>,
    user_agent: String,
}

impl WidgetContext {
    pub fn new(cache: Arc<CacheContext>, user_agent: Option<String>) -> Self {
        Self {
            cache,
            user_agent: user_agent
                .filter(|ua| !ua.is_empty())
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn cache(&self) -> &Arc<CacheContext> {
        &self.cache
    }

    /// Partition duration for a request: the explicit code, else the
    /// widget's `cache` code, else the widget type's session timeout.
    pub fn partition_seconds(&self, widget: &dyn Widget, cache_duration: Option<&str>) -> u64 {
        cache_duration
            .or_else(|| widget.cache_duration())
            .and_then(|code| parse_seconds(code).ok())
            .unwrap_or(widget.kind().session_timeout_secs)
    }

    /// Perform `req` through the widget's cache partition.
    pub async fn web_fetch(
        &self,
        widget: &dyn Widget,
        req: FetchRequest,
        cache_duration: Option<&str>,
    ) -> Result<CachedResponse, WidgetError> {
        let seconds = self.partition_seconds(widget, cache_duration);
        let session = self.cache.sessions.get_session(widget.kind().cache_type, seconds)?;

        let req = if req.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("user-agent")) {
            req
        } else {
            req.header("User-Agent", self.user_agent.as_str())
        };

        let response = session.request(&req).await?;
        Ok(response)
    }

    pub fn cache_get(&self, widget: &dyn Widget, key: &str) -> Option<Value> {
        let kind = widget.kind();
        let hit = self.cache.memory.get(kind.cache_type, &key.to_string());
        if hit.is_some() {
            log::debug!("[{}] Retrieved cache [{}]", kind.name, key);
        }
        hit
    }

    pub fn cache_set(&self, widget: &dyn Widget, key: &str, value: Value, code: &str) -> Result<bool, WidgetError> {
        Ok(self
            .cache
            .memory
            .set(widget.kind().cache_type, key.to_string(), value, code)?)
    }

    /// Store for roughly half of `code`; see [`short_duration_code`]
    pub fn cache_set_short(
        &self,
        widget: &dyn Widget,
        key: &str,
        value: Value,
        code: &str,
    ) -> Result<bool, WidgetError> {
        let short = short_duration_code(code)?;
        self.cache_set(widget, key, value, &short)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> WidgetContext {
        WidgetContext::new(CacheContext::shared(dir.path(), reqwest::Client::new()), None)
    }

    #[test]
    fn test_short_duration_code() {
        assert_eq!(short_duration_code("1m").unwrap(), "1m");
        assert_eq!(short_duration_code("120s").unwrap(), "120s");
        assert_eq!(short_duration_code("3m").unwrap(), "1m");
        assert_eq!(short_duration_code("5m").unwrap(), "2m");
        assert_eq!(short_duration_code("1h").unwrap(), "30m");
        assert_eq!(short_duration_code("6h").unwrap(), "90m");
        assert_eq!(short_duration_code("1d").unwrap(), "90m");
        assert!(short_duration_code("soon").is_err());
    }

    #[test]
    fn test_random_between_bounds() {
        for _ in 0..100 {
            let value = random_between(52, 60);
            assert!((52..=60).contains(&value));
        }
        assert_eq!(random_between(5, 5), 5);
        assert_eq!(random_between(9, 3), 9);
    }

    #[test]
    fn test_registry_builtin() {
        let registry = WidgetRegistry::builtin();
        assert_eq!(
            registry.names(),
            vec![
                "chucknorris",
                "garfield",
                "gitea",
                "github",
                "lobsters",
                "openmeteo",
                "reddit",
                "ronswanson",
                "rss",
                "sitestatus",
                "xkcd",
                "youtube"
            ]
        );
        assert_eq!(registry.get("XKCD").unwrap().name, "xkcd");
        assert_eq!(registry.get("Reddit").unwrap().cache_type, "rss");
        let cache_types = registry.cache_types();
        assert_eq!(cache_types.len(), registry.names().len() - 3);
        assert!(!cache_types.contains(&"youtube"));
        assert!(registry.get("quote").is_none());
    }

    #[test]
    fn test_footprints_from_config() {
        let config = crate::config::Config::parse(
            r#"
pages:
  - name: Home
    columns:
      - widgets:
          - type: chucknorris
          - type: xkcd
            cache: 2h
          - type: github
            cache: 30m
          - type: rss
            url: https://example.com/feed
          - type: youtube
          - type: quote
"#,
        )
        .unwrap();

        let footprints = WidgetRegistry::builtin().footprints(config.all_widgets());
        assert_eq!(footprints.len(), 5);

        let keys: Vec<_> = footprints.iter().flat_map(CacheFootprint::valid_keys).collect();
        assert!(keys.contains(&("chucknorris".to_string(), "5m".to_string())));
        assert!(keys.contains(&("chucknorris".to_string(), "1d".to_string())));
        assert!(keys.contains(&("xkcd".to_string(), "2h".to_string())));
        // github without owner/repository does not build but keeps its partition
        assert!(keys.contains(&("github".to_string(), "30m".to_string())));
        // feed variants keep the shared rss partition, even when incomplete
        assert!(keys.contains(&("rss".to_string(), "1h".to_string())));
        assert!(!keys.iter().any(|(t, _)| t == "youtube" || t == "quote"));
    }

    #[test]
    fn test_registry_unknown_type() {
        let registry = WidgetRegistry::builtin();
        match registry.build("nope", json!({})) {
            Err(WidgetError::UnknownType(t)) => assert_eq!(t, "nope"),
            other => panic!("expected unknown type, got {:?}", other.map(|w| w.kind().name)),
        }
    }

    #[test]
    fn test_build_rejects_bad_cache_code() {
        let registry = WidgetRegistry::builtin();
        assert!(matches!(
            registry.build("xkcd", json!({"cache": "often"})),
            Err(WidgetError::InvalidDuration { .. })
        ));
    }

    #[test]
    fn test_footprint_uses_configured_cache() {
        let widget = WidgetRegistry::builtin()
            .build("chucknorris", json!({"cache": "10m"}))
            .unwrap();
        let footprint = widget.footprint();
        assert_eq!(footprint.widget_type, "chucknorris");
        assert_eq!(footprint.duration.as_deref(), Some("10m"));
        assert_eq!(footprint.alternates, vec!["1d".to_string()]);
    }

    #[test]
    fn test_partition_seconds_resolution() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let widget = WidgetRegistry::builtin().build("xkcd", json!({})).unwrap();

        assert_eq!(ctx.partition_seconds(widget.as_ref(), None), 21600);
        assert_eq!(ctx.partition_seconds(widget.as_ref(), Some("1d")), 86400);
        assert_eq!(ctx.partition_seconds(widget.as_ref(), Some("bogus")), 3600);
    }

    #[test]
    fn test_memory_cache_helpers() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let widget = WidgetRegistry::builtin().build("ronswanson", json!({})).unwrap();

        assert!(ctx.cache_get(widget.as_ref(), "ronswanson").is_none());
        assert!(ctx
            .cache_set_short(widget.as_ref(), "ronswanson", json!({"quotes": ["a"]}), "5m")
            .unwrap());
        assert_eq!(
            ctx.cache_get(widget.as_ref(), "ronswanson"),
            Some(json!({"quotes": ["a"]}))
        );
    }

    #[test]
    fn test_default_user_agent() {
        let dir = TempDir::new().unwrap();
        let cache = CacheContext::shared(dir.path(), reqwest::Client::new());
        assert_eq!(WidgetContext::new(Arc::clone(&cache), None).user_agent(), DEFAULT_USER_AGENT);
        assert_eq!(WidgetContext::new(Arc::clone(&cache), Some(String::new())).user_agent(), DEFAULT_USER_AGENT);
        assert_eq!(WidgetContext::new(cache, Some("curl/8".to_string())).user_agent(), "curl/8");
    }
}
