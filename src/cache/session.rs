//! Cached HTTP sessions backed by a partition
//!
//! A [`CachedSession`] serves a request from its partition when a fresh
//! response exists for the request signature, and otherwise performs the
//! call and stores the response for the TTL in effect.

use chrono::Utc;
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::key::request_key;
use super::storage::PartitionStorage;
use crate::error::{CacheError, FetchError};

/// Default hard timeout for an outbound request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// An outbound request description
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Duration,
    /// Per-request TTL; the partition duration applies when unset
    pub expire_after: Option<Duration>,
    pub allowed_status: Vec<u16>,
}

impl FetchRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: DEFAULT_TIMEOUT,
            expire_after: None,
            allowed_status: vec![200],
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn expire_after(mut self, ttl: Duration) -> Self {
        self.expire_after = Some(ttl);
        self
    }

    pub fn allow_status(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.allowed_status = codes.into_iter().collect();
        self
    }
}

/// A response, either fresh from the network or replayed from a partition
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub elapsed: Duration,
    pub from_cache: bool,
}

impl CachedResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, FetchError> {
        serde_json::from_slice(&self.body).map_err(|e| FetchError::InvalidResponse {
            url: self.url.clone(),
            message: format!("Failed to parse response: {}", e),
        })
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Handle on one (widget type, duration) partition.
///
/// The SQLite connection is guarded by a mutex that is never held across
/// an await point; the network call happens outside the lock.
pub struct CachedSession {
    widget_type: String,
    duration: Duration,
    http: reqwest::Client,
    storage: Mutex<PartitionStorage>,
}

impl CachedSession {
    pub fn new(
        widget_type: impl Into<String>,
        duration: Duration,
        http: reqwest::Client,
        storage: PartitionStorage,
    ) -> Self {
        Self {
            widget_type: widget_type.into(),
            duration,
            http,
            storage: Mutex::new(storage),
        }
    }

    /// Default TTL for responses stored through this session
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn path(&self) -> PathBuf {
        self.storage().path().to_path_buf()
    }

    fn storage(&self) -> MutexGuard<'_, PartitionStorage> {
        self.storage.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Perform `req`, serving it from the partition when possible.
    ///
    /// A status outside `req.allowed_status` purges every entry stored for
    /// the URL and fails, so failure responses are never served later.
    pub async fn request(&self, req: &FetchRequest) -> Result<CachedResponse, FetchError> {
        let key = request_key(req.method.as_str(), &req.url, req.body.as_deref());

        let response = match self.lookup(&key) {
            Some(cached) => {
                log::debug!("Cache hit [{}]: {} {}", self.widget_type, req.method, req.url);
                cached
            }
            None => {
                let fresh = self.send(req).await?;
                let ttl = req.expire_after.unwrap_or(self.duration);
                if let Err(e) = self
                    .storage()
                    .put_at(&key, req.method.as_str(), &fresh, ttl, Utc::now().timestamp())
                {
                    log::warn!("Failed to cache response for {}: {}", req.url, e);
                }
                fresh
            }
        };

        if !req.allowed_status.contains(&response.status) {
            log::debug!(
                "Received status {}, deleting cache for {}",
                response.status,
                req.url
            );
            if let Err(e) = self.storage().delete_url(&req.url) {
                log::warn!("Failed to purge cache for {}: {}", req.url, e);
            }
            return Err(FetchError::Status {
                url: req.url.clone(),
                status: response.status,
            });
        }

        Ok(response)
    }

    /// Purge entries whose TTL has lapsed. Returns the number removed.
    pub fn delete_expired(&self) -> Result<usize, CacheError> {
        let storage = self.storage();
        let removed = storage.delete_expired_at(Utc::now().timestamp())?;
        if removed > 0 {
            storage.vacuum()?;
            log::debug!(
                "Removed {} expired response(s) from {}",
                removed,
                storage.path().display()
            );
        }
        Ok(removed)
    }

    /// Whether the backing file is still on disk
    pub fn backing_file_exists(&self) -> bool {
        Path::exists(self.storage().path())
    }

    fn lookup(&self, key: &str) -> Option<CachedResponse> {
        match self.storage().get_at(key, Utc::now().timestamp()) {
            Ok(hit) => hit,
            Err(e) => {
                log::warn!("Cache lookup failed for [{}]: {}", self.widget_type, e);
                None
            }
        }
    }

    async fn send(&self, req: &FetchRequest) -> Result<CachedResponse, FetchError> {
        log::debug!("web_fetch {} {}", req.method, req.url);

        let mut builder = self
            .http
            .request(req.method.clone(), &req.url)
            .timeout(req.timeout);
        for (name, value) in &req.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &req.body {
            builder = builder.body(body.clone());
        }

        let started = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&req.url, e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(&req.url, e))?
            .to_vec();

        Ok(CachedResponse {
            url: req.url.clone(),
            status,
            headers,
            body,
            elapsed: started.elapsed(),
            from_cache: false,
        })
    }
}
