//! Blocklist Client (spec.md §4.2): disposable-domain lookup against an
//! external key/value store.
//!
//! The store itself is out of scope (owned by the surrounding service), so
//! it's modeled as a small async trait. [`HttpKvBackend`] is a real,
//! HTTP-based implementation for a GET-by-key KV protocol;
//! [`StaticBackend`] is an in-memory stand-in used by tests.

use crate::error::BackendError;
use crate::suffix;
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait]
pub trait BlocklistBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;
}

/// Speaks a minimal `GET {base_url}/{key}` protocol: 200 means present
/// (body ignored), 404 means absent, anything else is an error.
pub struct HttpKvBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpKvBackend {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl BlocklistBackend for HttpKvBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let url = format!("{}/{key}", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(BackendError::Protocol(format!(
                "unexpected status {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Some(body))
    }
}

/// In-memory backend for tests: keys in the set are present.
#[derive(Default)]
pub struct StaticBackend {
    keys: HashSet<String>,
}

impl StaticBackend {
    #[must_use]
    pub fn with_keys(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }
}

#[async_trait]
impl BlocklistBackend for StaticBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        Ok(self.keys.contains(key).then(|| "1".to_string()))
    }
}

pub struct BlocklistClient<B: BlocklistBackend> {
    backend: B,
    timeout: Duration,
}

impl<B: BlocklistBackend> BlocklistClient<B> {
    #[must_use]
    pub const fn new(backend: B, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Checks `blocklist/disposable/<domain>`, then `blocklist/disposable/<eTLD+1>`
    /// if the exact-domain key was absent. Any backend error or timeout is
    /// swallowed and treated as "not disposable" — an outage here must never
    /// block verification.
    pub async fn is_disposable(&self, domain: &str) -> bool {
        if self.lookup(&format!("blocklist/disposable/{domain}")).await {
            return true;
        }

        if let Some(parent) = suffix::registrable_domain(domain) {
            if parent != domain
                && self
                    .lookup(&format!("blocklist/disposable/{parent}"))
                    .await
            {
                return true;
            }
        }

        false
    }

    async fn lookup(&self, key: &str) -> bool {
        match tokio::time::timeout(self.timeout, self.backend.get(key)).await {
            Ok(Ok(Some(_))) => true,
            Ok(Ok(None)) => false,
            Ok(Err(e)) => {
                warn!(key, error = %e, "blocklist lookup failed, treating as not disposable");
                false
            }
            Err(_) => {
                debug!(key, "blocklist lookup timed out, treating as not disposable");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exact_domain_hit() {
        let backend =
            StaticBackend::with_keys(["blocklist/disposable/tempmail-disposable.com".to_string()]);
        let client = BlocklistClient::new(backend, Duration::from_secs(1));
        assert!(client.is_disposable("tempmail-disposable.com").await);
    }

    #[tokio::test]
    async fn falls_back_to_registrable_parent() {
        let backend =
            StaticBackend::with_keys(["blocklist/disposable/tempmail-disposable.com".to_string()]);
        let client = BlocklistClient::new(backend, Duration::from_secs(1));
        assert!(client.is_disposable("sub.tempmail-disposable.com").await);
    }

    #[tokio::test]
    async fn miss_is_not_disposable() {
        let backend = StaticBackend::default();
        let client = BlocklistClient::new(backend, Duration::from_secs(1));
        assert!(!client.is_disposable("gmail.com").await);
    }

    struct SlowBackend;

    #[async_trait]
    impl BlocklistBackend for SlowBackend {
        async fn get(&self, _key: &str) -> Result<Option<String>, BackendError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Some("1".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_treated_as_not_disposable() {
        let client = BlocklistClient::new(SlowBackend, Duration::from_millis(10));
        assert!(!client.is_disposable("example.com").await);
    }
}
