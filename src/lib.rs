//! Sanad - AI request gateway
//!
//! Mediates every call from application features to an upstream
//! generative-language model. A [`Gateway`] derives a stable cache key for
//! each request, serves repeats from a [`CacheStore`], retries transient
//! upstream failures with credential rotation and exponential backoff, and
//! reduces noisy model output to typed results.
//!
//! # Example
//!
//! ```rust,no_run
//! use sanad::{CacheConfig, Sanad};
//!
//! #[tokio::main]
//! async fn main() -> sanad::Result<()> {
//!     let gateway = Sanad::builder()
//!         .api_keys("key-one,key-two")
//!         .memory_cache(CacheConfig::default())
//!         .build()?;
//!
//!     let answer = gateway
//!         .ask_open_query("fiqh", "What breaks the fast?")
//!         .await?;
//!     println!("{answer}");
//!
//!     let record = gateway.translate("بسم الله الرحمن الرحيم").await?;
//!     println!("{}", record.translation);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod credentials;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod retry;
pub mod sanitize;
pub mod telemetry;
pub mod types;
pub mod upstream;

// Re-export main types at crate root
pub use cache::{CacheConfig, CacheEntry, CacheKey, CacheStore, MemoryCacheStore};
pub use credentials::{Credential, CredentialPool};
pub use envelope::{OperationKind, RequestEnvelope};
pub use error::{ErrorClass, Result, SanadError};
pub use gateway::{Gateway, Sanad, SanadBuilder};
pub use retry::{RetryConfig, RetryDecision, RetryState, with_backoff};
pub use upstream::{GenerateRequest, PromptPart, UpstreamModel};

pub use types::{
    Difficulty, EssayGrade, EssayQuestion, ImageTextResult, OpenQueryResult, QuizOptions,
    QuizQuestion, TranslationResult, WordGloss,
};

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
