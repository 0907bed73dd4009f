//! Error types for Informer

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Informer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the application
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Widget(#[from] WidgetError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Interactive prompt error: {0}")]
    Dialoguer(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Server error: {0}")]
    Server(String),
}

impl From<dialoguer::Error> for Error {
    fn from(err: dialoguer::Error) -> Self {
        Error::Dialoguer(err.to_string())
    }
}

/// Cache-related errors (duration codes, partitions, cache files)
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Invalid cache duration '{0}' (expected <n>s, <n>m, <n>h or <n>d)")]
    InvalidDuration(String),

    #[error("Malformed cache file: {}", .0.display())]
    MalformedCacheFile(PathBuf),

    #[error("Cache file error for {}: {message}", path.display())]
    PartitionIo { path: PathBuf, message: String },

    #[error("Cache storage error: {0}")]
    Storage(String),

    #[error("Could not determine a cache directory")]
    NoCacheDir,
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        CacheError::Storage(err.to_string())
    }
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        CacheError::PartitionIo {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Outbound HTTP failures. Always recoverable by the caller.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Failed to fetch {url}: {message}")]
    Network { url: String, message: String },

    #[error("Got status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

impl FetchError {
    /// Map a reqwest failure for `url` onto a fetch error
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        let url = url.to_string();
        if err.is_timeout() {
            FetchError::Timeout { url }
        } else if err.is_connect() {
            FetchError::Network {
                url,
                message: "Failed to connect".to_string(),
            }
        } else {
            FetchError::Network {
                url,
                message: err.to_string(),
            }
        }
    }

    /// Build `base` with `params` appended as an encoded query string
    pub fn url_with_params<K, V>(base: &str, params: &[(K, V)]) -> std::result::Result<reqwest::Url, FetchError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        reqwest::Url::parse_with_params(base, params.iter().map(|(k, v)| (k.as_ref(), v.as_ref()))).map_err(|e| {
            FetchError::InvalidUrl {
                url: base.to_string(),
                message: e.to_string(),
            }
        })
    }

    /// The URL that failed
    pub fn url(&self) -> &str {
        match self {
            FetchError::Timeout { url }
            | FetchError::Network { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::InvalidResponse { url, .. }
            | FetchError::InvalidUrl { url, .. } => url,
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to load the configuration file: '{}'. Use --config to point at a custom file.", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Widget construction and data errors
#[derive(Debug, Error)]
pub enum WidgetError {
    #[error("Invalid widget type '{0}'.")]
    UnknownType(String),

    #[error("Parameter is invalid in the configuration file: {message} (widget: '{widget}')")]
    InvalidArgument { widget: String, message: String },

    #[error("Invalid cache duration '{code}' (widget: '{widget}')")]
    InvalidDuration { widget: String, code: String },

    #[error("{message} (widget: '{widget}')")]
    Init { widget: String, message: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}
