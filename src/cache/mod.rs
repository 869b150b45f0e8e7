//! Response cache contract and key derivation.
//!
//! The gateway consults a [`CacheStore`] before contacting the upstream
//! model and writes successful results back afterwards. The cache is an
//! optimisation, never a correctness dependency:
//!
//! - a failed [`CacheStore::lookup`] is treated exactly like a miss;
//! - [`CacheStore::save`] runs as detached background work whose failure is
//!   logged and dropped, never retried.
//!
//! Keys are a stable 32-bit rolling hash of the request's canonical text,
//! see [`CacheKey`]. Collisions are a tolerated cache-correctness risk, not
//! a security boundary.
//!
//! Concurrent requests for the same key are not coalesced: both may miss,
//! both call upstream, both write. Writes are idempotent from the caller's
//! point of view.

pub mod memory;

pub use memory::{CacheConfig, MemoryCacheStore};

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Stable hash of a request envelope's canonical text.
///
/// Computed as `h = h * 31 + unit` over the UTF-16 code units of the text,
/// wrapping at 32 bits. Stable across processes and platforms, so it can
/// address a shared or persistent store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(u32);

impl CacheKey {
    /// Hash already-canonical text.
    pub fn from_canonical(text: &str) -> Self {
        let hash = text
            .encode_utf16()
            .fold(0u32, |h, unit| h.wrapping_mul(31).wrapping_add(u32::from(unit)));
        CacheKey(hash)
    }

    /// Hash `"{prefix}:{body}"`.
    ///
    /// The operation prefix keeps requests of different kinds with the same
    /// text from sharing a key.
    pub fn derive(prefix: &str, body: &str) -> Self {
        Self::from_canonical(&format!("{prefix}:{body}"))
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// A stored result. Created only after a successful parse and never
/// updated in place; later writes for the same key insert again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: serde_json::Value,
    pub model: String,
    pub written_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: CacheKey, value: serde_json::Value, model: impl Into<String>) -> Self {
        Self {
            key,
            value,
            model: model.into(),
            written_at: Utc::now(),
        }
    }
}

/// Key/value store addressed by [`CacheKey`].
///
/// Implementations report their own failures as
/// [`SanadError::CacheUnavailable`](crate::SanadError::CacheUnavailable);
/// the gateway swallows every error coming out of this trait.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Store name for logging/debugging.
    fn name(&self) -> &str;

    /// Fetch the value stored under `key`, if any.
    async fn lookup(&self, key: &CacheKey) -> Result<Option<serde_json::Value>>;

    /// Persist an entry. De-duplication is the store's business.
    async fn save(&self, entry: CacheEntry) -> Result<()>;
}
