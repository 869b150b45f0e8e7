//! Upstream model seam.
//!
//! [`UpstreamModel`] is the single call shape the gateway needs from a
//! generative model service: `generate(model, system_instruction?, parts)`
//! returning raw text. The credential is passed per call because the
//! gateway rotates it between attempts.
//!
//! Implementations map service failures onto [`SanadError`](crate::SanadError)
//! variants so the backoff loop can classify them: rate limits become
//! `RateLimited`, temporary outages `Api { status: 5xx }`, transport
//! failures `Http`.

pub mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;

use crate::Result;
use crate::credentials::Credential;

/// One part of a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPart {
    Text(String),
    /// Inline binary input, e.g. an image to read.
    InlineData { mime_type: String, data: Vec<u8> },
}

/// A fully-built upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub model: String,
    pub system_instruction: Option<String>,
    pub parts: Vec<PromptPart>,
}

/// A generative model service.
#[async_trait]
pub trait UpstreamModel: Send + Sync {
    /// Service name for logging/debugging.
    fn name(&self) -> &str;

    /// Run one generation and return the raw text of the answer.
    async fn generate(&self, credential: &Credential, request: &GenerateRequest) -> Result<String>;
}
