//! Builder for configuring gateway instances

use std::sync::Arc;
use std::time::Duration;

use super::Gateway;
use crate::cache::{CacheConfig, CacheStore, MemoryCacheStore};
use crate::credentials::CredentialPool;
use crate::retry::RetryConfig;
use crate::upstream::gemini::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
use crate::upstream::{GeminiClient, UpstreamModel};
use crate::{Result, SanadError};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Main entry point for creating gateway instances.
pub struct Sanad;

impl Sanad {
    /// Create a new builder for configuring the gateway.
    pub fn builder() -> SanadBuilder {
        SanadBuilder::new()
    }
}

/// Builder for configuring gateway instances.
pub struct SanadBuilder {
    api_keys: Option<String>,
    credentials: Option<CredentialPool>,
    model: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    retry: RetryConfig,
    cache: Option<Arc<dyn CacheStore>>,
    upstream: Option<Arc<dyn UpstreamModel>>,
}

impl SanadBuilder {
    pub fn new() -> Self {
        Self {
            api_keys: None,
            credentials: None,
            model: None,
            base_url: None,
            timeout_secs: None,
            retry: RetryConfig::default(),
            cache: None,
            upstream: None,
        }
    }

    /// Upstream credentials as one comma-separated value (`"key-a,key-b"`).
    pub fn api_keys(mut self, value: impl Into<String>) -> Self {
        self.api_keys = Some(value.into());
        self
    }

    /// Use an already-built credential pool. Takes precedence over
    /// [`api_keys`](Self::api_keys).
    pub fn credentials(mut self, pool: CredentialPool) -> Self {
        self.credentials = Some(pool);
        self
    }

    /// Model identifier (default: [`DEFAULT_MODEL`]).
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Override the upstream API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the timeout for each upstream call (seconds).
    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Set the retry schedule for transient upstream errors.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    /// Use a host-provided cache store (e.g. a shared document store).
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(store);
        self
    }

    /// Cache results in process memory.
    pub fn memory_cache(mut self, config: CacheConfig) -> Self {
        self.cache = Some(Arc::new(MemoryCacheStore::new(&config)));
        self
    }

    /// Turn caching off (the default).
    pub fn disable_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    /// Replace the HTTP upstream client, e.g. with a test double.
    /// `base_url` and `timeout` are ignored when set.
    pub fn upstream(mut self, upstream: Arc<dyn UpstreamModel>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Build the gateway.
    ///
    /// Fails with [`SanadError::Configuration`] when no credential is
    /// available, so a misconfigured gateway never reaches first use.
    pub fn build(self) -> Result<Gateway> {
        let credentials = match (self.credentials, self.api_keys) {
            (Some(pool), _) => pool,
            (None, Some(value)) => CredentialPool::from_config_value(&value)?,
            (None, None) => {
                return Err(SanadError::Configuration(
                    "no upstream credentials configured".to_string(),
                ));
            }
        };

        let upstream: Arc<dyn UpstreamModel> = match self.upstream {
            Some(upstream) => upstream,
            None => {
                let timeout = Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
                let base_url = self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
                Arc::new(GeminiClient::with_base_url(base_url, timeout)?)
            }
        };

        let model = self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Ok(Gateway::new(
            upstream,
            credentials,
            self.cache,
            self.retry,
            model,
        ))
    }
}

impl Default for SanadBuilder {
    fn default() -> Self {
        Self::new()
    }
}
