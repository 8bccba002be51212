use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::sleep;

use bibweave_core::CacheConfig;

use crate::error::{Result, ScienceError};

pub const USER_AGENT: &str = concat!("bibweave/", env!("CARGO_PKG_VERSION"));

/// Upper bound on a server-requested `Retry-After` wait.
const MAX_RETRY_AFTER_SECS: u64 = 30;

// ─── RateLimitedClient ────────────────────────────────────────────────────────

pub struct RateLimitedClient {
    client: reqwest::Client,
    min_interval: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
    max_retries: u32,
}

impl RateLimitedClient {
    pub fn new(min_interval: Duration, max_retries: u32, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            min_interval,
            last_request: Arc::new(Mutex::new(None)),
            max_retries,
        })
    }

    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(t) = *last {
            let elapsed = t.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub async fn get(&self, url: &str) -> Result<String> {
        self.get_with_headers(url, HeaderMap::new()).await
    }

    /// `Ok(None)` on 404, so callers can tell "not found" from a failure.
    pub async fn get_optional(&self, url: &str, headers: HeaderMap) -> Result<Option<String>> {
        match self.get_with_headers(url, headers).await {
            Ok(body) => Ok(Some(body)),
            Err(ScienceError::ApiError(_, message)) if message.starts_with("HTTP 404") => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn get_with_headers(&self, url: &str, headers: HeaderMap) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            self.wait_for_rate_limit().await;
            let resp = self.client.get(url).headers(headers.clone()).send().await;
            match resp {
                Ok(r) if r.status() == 429 => {
                    let wait = r
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(5)
                        .min(MAX_RETRY_AFTER_SECS);
                    if attempt >= self.max_retries {
                        return Err(ScienceError::RateLimit(host_of(url), wait));
                    }
                    tracing::debug!(url, wait, "rate limited, backing off");
                    sleep(Duration::from_secs(wait)).await;
                    attempt += 1;
                }
                Ok(r) if !r.status().is_success() => {
                    let status = r.status().as_u16();
                    let body = r.text().await.unwrap_or_default();
                    return Err(ScienceError::ApiError(
                        url.to_string(),
                        format!("HTTP {status}: {}", truncate(&body, 200)),
                    ));
                }
                Ok(r) => return r.text().await.map_err(ScienceError::Http),
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(ScienceError::Http(e));
                    }
                    let backoff = 2u64.pow(attempt);
                    tracing::debug!(url, attempt, error = %e, "request failed, retrying");
                    sleep(Duration::from_secs(backoff)).await;
                    attempt += 1;
                }
            }
        }
    }

    pub async fn get_json_with_headers<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: HeaderMap,
    ) -> Result<T> {
        let text = self.get_with_headers(url, headers).await?;
        serde_json::from_str(&text).map_err(|e| ScienceError::Parse(e.to_string()))
    }
}

fn host_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "server".to_string())
}

fn truncate(body: &str, max: usize) -> &str {
    match body.char_indices().nth(max) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

// ─── DiskCache ────────────────────────────────────────────────────────────────

/// JSON-file cache keyed by a hash of the lookup key. A cache without a
/// directory is disabled: reads miss and writes are dropped.
pub struct DiskCache {
    dir: Option<PathBuf>,
    ttl: Duration,
}

fn cache_key_to_path(dir: &Path, key: &str) -> PathBuf {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    let hash = hasher.finish();
    dir.join(format!("{hash:016x}.json"))
}

#[derive(Serialize, serde::Deserialize)]
struct CacheEntry<T> {
    stored_at: u64, // Unix timestamp secs
    value: T,
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl DiskCache {
    /// Cache under the platform cache directory.
    pub fn new(namespace: &str, ttl: Duration) -> Self {
        let root = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("bibweave");
        Self::in_dir(&root, namespace, ttl)
    }

    pub fn in_dir(root: &Path, namespace: &str, ttl: Duration) -> Self {
        let dir = root.join(namespace);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "cache directory unavailable, caching disabled");
            return Self::disabled();
        }
        Self {
            dir: Some(dir),
            ttl,
        }
    }

    /// Honors `cache.enabled`, `cache.ttl_days` and `cache.directory`.
    pub fn from_config(config: &CacheConfig, namespace: &str) -> Self {
        if !config.enabled {
            return Self::disabled();
        }
        let ttl = Duration::from_secs(config.ttl_days.saturating_mul(24 * 60 * 60));
        match &config.directory {
            Some(root) => Self::in_dir(Path::new(root), namespace, ttl),
            None => Self::new(namespace, ttl),
        }
    }

    pub fn disabled() -> Self {
        Self {
            dir: None,
            ttl: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = cache_key_to_path(self.dir.as_ref()?, key);
        let data = tokio::fs::read(&path).await.ok()?;
        let entry: CacheEntry<T> = serde_json::from_slice(&data).ok()?;
        if now_secs().saturating_sub(entry.stored_at) > self.ttl.as_secs() {
            let _ = tokio::fs::remove_file(&path).await;
            return None;
        }
        Some(entry.value)
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        let Some(dir) = &self.dir else {
            return;
        };
        let path = cache_key_to_path(dir, key);
        let entry = CacheEntry {
            stored_at: now_secs(),
            value,
        };
        if let Ok(data) = serde_json::to_vec(&entry) {
            let _ = tokio::fs::write(&path, data).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn cache_set_get_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiskCache::in_dir(tmp.path(), "roundtrip", Duration::from_secs(60));
        cache.set("key1", &"hello world").await;
        let val: Option<String> = cache.get("key1").await;
        assert_eq!(val, Some("hello world".to_string()));
    }

    #[tokio::test]
    async fn cache_expired_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiskCache::in_dir(tmp.path(), "expired", Duration::from_secs(0));
        cache.set("key_exp", &42u32).await;
        sleep(Duration::from_millis(1100)).await;
        let val: Option<u32> = cache.get("key_exp").await;
        assert_eq!(val, None);
    }

    #[tokio::test]
    async fn disabled_cache_never_hits() {
        let cache = DiskCache::disabled();
        cache.set("k", &1u8).await;
        assert_eq!(cache.get::<u8>("k").await, None);
        assert!(!cache.is_enabled());
    }

    #[tokio::test]
    async fn not_found_is_distinguished_from_errors() {
        let mut server = Server::new_async().await;
        let _missing = server.mock("GET", "/missing").with_status(404).create_async().await;
        let _broken = server.mock("GET", "/broken").with_status(500).create_async().await;

        let client = RateLimitedClient::new(Duration::ZERO, 0, USER_AGENT).unwrap();
        let missing = client
            .get_optional(&format!("{}/missing", server.url()), HeaderMap::new())
            .await
            .unwrap();
        assert!(missing.is_none());

        let err = client
            .get_optional(&format!("{}/broken", server.url()), HeaderMap::new())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn rate_limit_surfaces_after_retries() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/busy")
            .with_status(429)
            .with_header("retry-after", "0")
            .expect(2)
            .create_async()
            .await;

        let client = RateLimitedClient::new(Duration::ZERO, 1, USER_AGENT).unwrap();
        let err = client.get(&format!("{}/busy", server.url())).await.unwrap_err();
        assert!(matches!(err, ScienceError::RateLimit(_, 0)));
    }
}
