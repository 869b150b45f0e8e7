//! The public request surface.
//!
//! Every cacheable operation follows one lifecycle:
//!
//! ```text
//! envelope ─▶ cache lookup ─hit──────────────────────────────▶ value
//!                  │miss (or store error)
//!                  ▼
//!             with_backoff(upstream) ─▶ decode ─▶ detached save ─▶ value
//! ```
//!
//! Image extraction and the quiz, essay, and grading operations skip both
//! cache stages.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::prompts;
use crate::cache::{CacheEntry, CacheKey, CacheStore};
use crate::credentials::CredentialPool;
use crate::envelope::{OperationKind, RequestEnvelope};
use crate::retry::{RetryConfig, with_backoff};
use crate::sanitize;
use crate::telemetry;
use crate::types::{
    EssayGrade, EssayQuestion, ImageTextResult, OpenQueryResult, QuizOptions, QuizQuestion,
    TranslationResult,
};
use crate::upstream::UpstreamModel;
use crate::{Result, SanadError};

/// Gateway between application features and the upstream model.
///
/// Built with [`Sanad::builder()`](crate::Sanad::builder). Cheap to share
/// behind an `Arc`; all methods take `&self`.
pub struct Gateway {
    upstream: Arc<dyn UpstreamModel>,
    credentials: CredentialPool,
    cache: Option<Arc<dyn CacheStore>>,
    retry: RetryConfig,
    model: String,
    cancel: CancellationToken,
}

impl Gateway {
    pub(crate) fn new(
        upstream: Arc<dyn UpstreamModel>,
        credentials: CredentialPool,
        cache: Option<Arc<dyn CacheStore>>,
        retry: RetryConfig,
        model: String,
    ) -> Self {
        Self {
            upstream,
            credentials,
            cache,
            retry,
            model,
            cancel: CancellationToken::new(),
        }
    }

    /// Model identifier sent upstream and recorded with cache entries.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn credentials(&self) -> &CredentialPool {
        &self.credentials
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Token cancelled when the gateway shuts down.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Abort in-flight upstream calls and backoff waits.
    ///
    /// Pending and future operations fail with [`SanadError::Cancelled`].
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    // ===== Operations =====

    /// Free-form scholarly question about `topic`.
    ///
    /// Cached under `"QUERY:{topic}:{prompt}"`. The raw answer text is the
    /// result; no sanitization is applied.
    pub async fn ask_open_query(&self, topic: &str, prompt: &str) -> Result<String> {
        require_text("prompt", prompt)?;
        let envelope = RequestEnvelope::query(topic, prompt, prompts::query_instruction(topic));
        let result: OpenQueryResult = self
            .run(envelope, |raw| Ok(OpenQueryResult { text: raw }))
            .await?;
        Ok(result.into())
    }

    /// Generate structured data, cached under `"JSON:{prompt}"`.
    pub async fn generate_structured(
        &self,
        prompt: &str,
        system_instruction: Option<&str>,
    ) -> Result<Value> {
        require_text("prompt", prompt)?;
        let envelope =
            RequestEnvelope::structured(prompt, system_instruction.map(ToString::to_string));
        self.run(envelope, |raw| sanitize::parse_value(&raw)).await
    }

    /// [`generate_structured`](Self::generate_structured) deserialized
    /// into `T`. A value that does not fit `T` is a [`SanadError::Parse`]
    /// and is not cached; a stored record that does not fit `T` is a miss.
    pub async fn generate_structured_as<T: Serialize + DeserializeOwned>(
        &self,
        prompt: &str,
        system_instruction: Option<&str>,
    ) -> Result<T> {
        require_text("prompt", prompt)?;
        let envelope =
            RequestEnvelope::structured(prompt, system_instruction.map(ToString::to_string));
        self.run(envelope, |raw| sanitize::parse(&raw)).await
    }

    /// Translate a passage, cached under `"TRANS:{text}"`.
    pub async fn translate(&self, text: &str) -> Result<TranslationResult> {
        require_text("text", text)?;
        let envelope = RequestEnvelope::translate(text, prompts::TRANSLATE_INSTRUCTION.to_string());
        self.run(envelope, |raw| sanitize::parse(&raw)).await
    }

    /// Read the text in an image. Never cached.
    pub async fn extract_text_from_image(&self, image: Vec<u8>, mime_type: &str) -> Result<String> {
        if image.is_empty() {
            return Err(SanadError::InvalidInput("image is empty".to_string()));
        }
        require_text("mime type", mime_type)?;
        let envelope = RequestEnvelope::image_text(prompts::IMAGE_TEXT_PROMPT, image, mime_type);
        let result: ImageTextResult = self
            .run(envelope, |raw| Ok(ImageTextResult { text: raw }))
            .await?;
        Ok(result.into())
    }

    /// Fresh multiple-choice questions on `topic`; every call is unique.
    pub async fn generate_quiz(
        &self,
        topic: &str,
        options: &QuizOptions,
    ) -> Result<Vec<QuizQuestion>> {
        require_text("topic", topic)?;
        require_count(options.count)?;
        let prompt = prompts::quiz_prompt(topic, options, &fresh_token());
        self.run_exercise(prompt, prompts::QUIZ_INSTRUCTION).await
    }

    /// Fresh essay questions on `topic`; every call is unique.
    pub async fn generate_essay_questions(
        &self,
        topic: &str,
        count: usize,
    ) -> Result<Vec<EssayQuestion>> {
        require_text("topic", topic)?;
        require_count(count)?;
        let prompt = prompts::essay_prompt(topic, count, &fresh_token());
        self.run_exercise(prompt, prompts::ESSAY_INSTRUCTION).await
    }

    /// Grade a student's essay answer; never served from cache.
    pub async fn grade_essay(&self, question: &str, answer: &str) -> Result<EssayGrade> {
        require_text("question", question)?;
        require_text("answer", answer)?;
        let prompt = prompts::grading_prompt(question, answer, &fresh_token());
        self.run_exercise(prompt, prompts::GRADING_INSTRUCTION).await
    }

    // ===== Lifecycle =====

    /// Structured generation for a prompt that is unique per call. Skips
    /// both cache stages, since its key could never be hit again.
    async fn run_exercise<T>(&self, prompt: String, instruction: &str) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let envelope = RequestEnvelope::exercise(prompt, instruction.to_string());
        self.run(envelope, |raw| sanitize::parse(&raw)).await
    }

    /// Run one request lifecycle, recording duration and outcome.
    async fn run<T, D>(&self, envelope: RequestEnvelope, decode: D) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        D: FnOnce(String) -> Result<T>,
    {
        let operation = envelope.kind.as_str();
        let start = Instant::now();

        let result = self.run_inner(&envelope, decode).await;

        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS, "operation" => operation)
            .record(start.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(telemetry::REQUESTS_TOTAL, "operation" => operation, "status" => status)
            .increment(1);
        result
    }

    async fn run_inner<T, D>(&self, envelope: &RequestEnvelope, decode: D) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        D: FnOnce(String) -> Result<T>,
    {
        let key = envelope.cache_key();

        if let Some(key) = key
            && let Some(hit) = self.lookup::<T>(&key, envelope.kind).await
        {
            return Ok(hit);
        }

        let raw = self.call_upstream(envelope).await?;
        let value = decode(raw)?;

        if let Some(key) = key {
            self.save_detached(key, &value, envelope.kind);
        }
        Ok(value)
    }

    /// Fail-open cache read: store errors and malformed records are misses.
    async fn lookup<T: DeserializeOwned>(&self, key: &CacheKey, kind: OperationKind) -> Option<T> {
        let store = self.cache.as_ref()?;
        let operation = kind.as_str();

        let found = match store.lookup(key).await {
            Ok(found) => found,
            Err(e) => {
                metrics::counter!(telemetry::CACHE_ERRORS_TOTAL, "direction" => "read")
                    .increment(1);
                warn!(store = store.name(), %key, operation, error = %e, "cache lookup failed, treating as miss");
                None
            }
        };

        let hit = found.and_then(|value| match serde_json::from_value::<T>(value) {
            Ok(hit) => Some(hit),
            Err(e) => {
                warn!(store = store.name(), %key, operation, error = %e, "malformed cache record, treating as miss");
                None
            }
        });

        if hit.is_some() {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "operation" => operation).increment(1);
            debug!(%key, operation, "cache hit");
        } else {
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "operation" => operation)
                .increment(1);
            debug!(%key, operation, "cache miss");
        }
        hit
    }

    /// Write back as detached background work; the caller never waits on it
    /// and a failure is only logged.
    fn save_detached<T: Serialize>(&self, key: CacheKey, value: &T, kind: OperationKind) {
        let Some(store) = self.cache.clone() else {
            return;
        };
        let operation = kind.as_str();

        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!(%key, operation, error = %e, "result not serializable, skipping cache write");
                return;
            }
        };
        let entry = CacheEntry::new(key, value, self.model.clone());

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(%key, operation, "no async runtime, skipping cache write");
            return;
        };
        runtime.spawn(async move {
            if let Err(e) = store.save(entry).await {
                metrics::counter!(telemetry::CACHE_ERRORS_TOTAL, "direction" => "write")
                    .increment(1);
                warn!(store = store.name(), %key, operation, error = %e, "cache write dropped");
            }
        });
    }

    async fn call_upstream(&self, envelope: &RequestEnvelope) -> Result<String> {
        let request = envelope.to_request(&self.model);
        let upstream = &self.upstream;
        let request = &request;
        with_backoff(
            &self.retry,
            &self.credentials,
            &self.cancel,
            envelope.kind.as_str(),
            move |credential| async move { upstream.generate(&credential, request).await },
        )
        .await
    }
}

fn require_text(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SanadError::InvalidInput(format!("{what} is empty")));
    }
    Ok(())
}

fn require_count(count: usize) -> Result<()> {
    if count == 0 {
        return Err(SanadError::InvalidInput(
            "question count must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn fresh_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
