//! File configuration and credential loading.
//!
//! Configuration is loaded from TOML with the following resolution order:
//! 1. explicit path (e.g. the CLI's `--config`)
//! 2. `~/.sanad/config.toml` (user)
//! 3. `/etc/sanad/config.toml` (system)
//!
//! Without any file, defaults apply. Every key is optional:
//!
//! ```toml
//! [upstream]
//! model = "gemini-2.0-flash"
//! timeout_secs = 60
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 2000
//! backoff_multiplier = 1.5
//!
//! [cache]
//! enabled = true
//! ttl_secs = 86400
//! ```
//!
//! Credentials are kept apart from configuration. The comma-separated value
//! comes from `SANAD_API_KEYS`, or else from `~/.sanad/secrets.toml`
//! (`api_keys = "key-a,key-b"`), which must not be readable by group or
//! others.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::CacheConfig;
use crate::gateway::{DEFAULT_MODEL, SanadBuilder};
use crate::retry::RetryConfig;
use crate::upstream::gemini::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
use crate::{Result, SanadError};

/// Environment variable holding the comma-separated credentials.
pub const API_KEYS_ENV_VAR: &str = "SANAD_API_KEYS";

/// Gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub cache: CacheSection,
}

/// Upstream service settings.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Retry schedule, in milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_backoff_multiplier() -> f64 {
    1.5
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl From<&RetrySection> for RetryConfig {
    fn from(section: &RetrySection) -> Self {
        RetryConfig::new()
            .max_attempts(section.max_attempts)
            .base_delay(Duration::from_millis(section.base_delay_ms))
            .backoff_multiplier(section.backoff_multiplier)
            .max_delay(Duration::from_millis(section.max_delay_ms))
    }
}

/// In-process cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            max_entries: default_max_entries(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

fn default_max_entries() -> u64 {
    10_000
}

fn default_ttl_secs() -> u64 {
    24 * 3600
}

impl From<&CacheSection> for CacheConfig {
    fn from(section: &CacheSection) -> Self {
        CacheConfig::new()
            .max_entries(section.max_entries)
            .ttl(Duration::from_secs(section.ttl_secs))
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// An explicit path must exist; the standard locations are optional.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Parse a config file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SanadError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            SanadError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(SanadError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".sanad").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/sanad/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Apply this configuration to a builder. Credentials are set separately.
    pub fn apply(&self, builder: SanadBuilder) -> SanadBuilder {
        let builder = builder
            .model(&self.upstream.model)
            .base_url(&self.upstream.base_url)
            .timeout(self.upstream.timeout_secs)
            .retry(RetryConfig::from(&self.retry));

        if self.cache.enabled {
            builder.memory_cache(CacheConfig::from(&self.cache))
        } else {
            builder.disable_cache()
        }
    }
}

/// Credential secrets.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    /// Comma-separated upstream credentials.
    #[serde(default)]
    pub api_keys: Option<String>,
}

impl Secrets {
    /// Load secrets from `~/.sanad/secrets.toml` with a permission check.
    ///
    /// Returns empty secrets if no file exists (the env var may still
    /// supply credentials).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".sanad").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from_file(&user_secrets);
            }
        }
        Ok(Secrets::default())
    }

    /// Parse a secrets file after checking its permissions.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            SanadError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            SanadError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            SanadError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(SanadError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// The credential value: environment variable first, then the file.
    pub fn api_keys(&self) -> Option<String> {
        std::env::var(API_KEYS_ENV_VAR)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.api_keys.clone())
    }
}
