//! Cached downloads of remote stylesheets and scripts.

use std::time::Duration;

use pagec_cache::CacheBucket;
use ureq::Agent;

use crate::error::BuildError;

/// Cache bucket for downloaded resources.
pub const REMOTE_BUCKET: &str = "remote";

/// Default HTTP timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A remote resource could not be downloaded.
#[derive(Debug, thiserror::Error)]
#[error("Failed to fetch {url}: {message}")]
pub struct FetchError {
    /// Requested URL.
    pub url: String,
    /// What went wrong.
    pub message: String,
}

impl FetchError {
    fn new(url: &str, message: impl Into<String>) -> Self {
        Self {
            url: url.to_owned(),
            message: message.into(),
        }
    }
}

/// Create an HTTP agent with a global timeout.
///
/// HTTP error statuses are returned as responses so the status can be
/// reported alongside the URL.
#[must_use]
pub fn create_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// Downloads text resources, caching each body by URL.
///
/// A URL is fetched at most once per cache root; later builds reuse the
/// stored body.
#[derive(Debug, Clone)]
pub struct RemoteFetcher {
    agent: Agent,
    cache: CacheBucket,
}

impl RemoteFetcher {
    /// Create a fetcher.
    #[must_use]
    pub fn new(timeout: Duration, cache: CacheBucket) -> Self {
        Self {
            agent: create_agent(timeout),
            cache,
        }
    }

    /// Fetch `url` as text.
    pub fn fetch(&self, url: &str) -> Result<String, BuildError> {
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(FetchError::new(url, "only http and https URLs are supported").into());
        }
        self.cache
            .get_or_compute_string(url.as_bytes(), || Ok(self.download(url)?))
    }

    fn download(&self, url: &str) -> Result<String, FetchError> {
        tracing::info!(url, "Downloading");
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| FetchError::new(url, e.to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(FetchError::new(url, format!("HTTP {status}")));
        }
        response
            .into_body()
            .read_to_string()
            .map_err(|e| FetchError::new(url, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagec_cache::DerivativeCache;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_cached_body_is_served_without_network() {
        let tmp = TempDir::new().unwrap();
        let bucket = DerivativeCache::new(tmp.path()).bucket(REMOTE_BUCKET);
        let url = "https://cdn.invalid/reset.css";
        bucket
            .get_or_compute::<BuildError, _>(url.as_bytes(), || Ok(b"html{margin:0}".to_vec()))
            .unwrap();

        let fetcher = RemoteFetcher::new(Duration::from_millis(50), bucket);

        assert_eq!(fetcher.fetch(url).unwrap(), "html{margin:0}");
    }

    #[test]
    fn test_rejects_non_http_urls() {
        let fetcher = RemoteFetcher::new(
            DEFAULT_TIMEOUT,
            DerivativeCache::disabled().bucket(REMOTE_BUCKET),
        );

        let err = fetcher.fetch("file:///etc/passwd").unwrap_err();

        assert!(matches!(err, BuildError::Fetch(_)));
    }

    #[test]
    fn test_connection_failure_is_fetch_error() {
        let tmp = TempDir::new().unwrap();
        let bucket = DerivativeCache::new(tmp.path()).bucket(REMOTE_BUCKET);
        let fetcher = RemoteFetcher::new(Duration::from_secs(2), bucket);
        let url = "http://127.0.0.1:1/app.js";

        let err = fetcher.fetch(url).unwrap_err();

        assert!(matches!(err, BuildError::Fetch(ref e) if e.url == url));
        assert!(!tmp.path().join(REMOTE_BUCKET).exists());
    }
}
