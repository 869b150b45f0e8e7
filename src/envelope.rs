//! Canonical request envelopes.
//!
//! A [`RequestEnvelope`] captures everything that determines an answer. It
//! is used both to build the upstream request and to derive the cache key.

use std::fmt;

use crate::cache::CacheKey;
use crate::upstream::{GenerateRequest, PromptPart};

/// The kind of gateway operation an envelope belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Free-form scholarly question.
    Query,
    /// Structured (JSON) generation, including quiz and grading variants.
    Structured,
    /// Structured translation record.
    Translate,
    /// Text extraction from an image. Never cached.
    ImageText,
    /// Quiz, essay, or grading request carrying a fresh token. Never cached.
    Exercise,
}

impl OperationKind {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Structured => "structured",
            OperationKind::Translate => "translate",
            OperationKind::ImageText => "image_text",
            OperationKind::Exercise => "exercise",
        }
    }

    /// Prefix mixed into the cache key; `None` for uncached kinds.
    pub fn cache_prefix(&self) -> Option<&'static str> {
        match self {
            OperationKind::Query => Some("QUERY"),
            OperationKind::Structured => Some("JSON"),
            OperationKind::Translate => Some("TRANS"),
            OperationKind::ImageText | OperationKind::Exercise => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inline binary input (an image) with its MIME type.
#[derive(Clone, PartialEq, Eq)]
pub struct BinaryPayload {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl fmt::Debug for BinaryPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryPayload")
            .field("len", &self.data.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// Everything that determines an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub kind: OperationKind,
    pub normalized_prompt: String,
    pub system_instruction: Option<String>,
    pub payload: Option<BinaryPayload>,
}

impl RequestEnvelope {
    /// Open query: the prompt is keyed together with its topic.
    pub fn query(topic: &str, prompt: &str, system_instruction: String) -> Self {
        Self {
            kind: OperationKind::Query,
            normalized_prompt: format!("{topic}:{prompt}"),
            system_instruction: Some(system_instruction),
            payload: None,
        }
    }

    pub fn structured(prompt: impl Into<String>, system_instruction: Option<String>) -> Self {
        Self {
            kind: OperationKind::Structured,
            normalized_prompt: prompt.into(),
            system_instruction,
            payload: None,
        }
    }

    /// Structured generation whose prompt is unique per call, so its
    /// result is neither looked up nor stored.
    pub fn exercise(prompt: impl Into<String>, system_instruction: String) -> Self {
        Self {
            kind: OperationKind::Exercise,
            normalized_prompt: prompt.into(),
            system_instruction: Some(system_instruction),
            payload: None,
        }
    }

    pub fn translate(text: impl Into<String>, system_instruction: String) -> Self {
        Self {
            kind: OperationKind::Translate,
            normalized_prompt: text.into(),
            system_instruction: Some(system_instruction),
            payload: None,
        }
    }

    pub fn image_text(prompt: impl Into<String>, data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::ImageText,
            normalized_prompt: prompt.into(),
            system_instruction: None,
            payload: Some(BinaryPayload {
                data,
                mime_type: mime_type.into(),
            }),
        }
    }

    /// Cache key for this envelope, or `None` if its kind is never cached.
    ///
    /// Only the kind prefix and the prompt text are hashed. Binary payloads
    /// never contribute; instructions are fixed per kind except for
    /// structured generation, where callers own the prompt.
    pub fn cache_key(&self) -> Option<CacheKey> {
        self.kind
            .cache_prefix()
            .map(|prefix| CacheKey::derive(prefix, &self.normalized_prompt))
    }

    /// Build the upstream call for `model`.
    pub fn to_request(&self, model: &str) -> GenerateRequest {
        let mut parts = vec![PromptPart::Text(self.normalized_prompt.clone())];
        if let Some(payload) = &self.payload {
            parts.push(PromptPart::InlineData {
                mime_type: payload.mime_type.clone(),
                data: payload.data.clone(),
            });
        }
        GenerateRequest {
            model: model.to_string(),
            system_instruction: self.system_instruction.clone(),
            parts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_envelopes_share_key() {
        let a = RequestEnvelope::structured("p", Some("sys".into()));
        let b = RequestEnvelope::structured("p", Some("sys".into()));
        assert_eq!(a, b);
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn kinds_with_same_text_do_not_collide() {
        let translate = RequestEnvelope::translate("p", "t".into());
        let structured = RequestEnvelope::structured("p", None);
        let query = RequestEnvelope {
            kind: OperationKind::Query,
            normalized_prompt: "p".into(),
            system_instruction: None,
            payload: None,
        };
        assert_ne!(translate.cache_key(), structured.cache_key());
        assert_ne!(translate.cache_key(), query.cache_key());
        assert_ne!(structured.cache_key(), query.cache_key());
    }

    #[test]
    fn query_key_includes_topic() {
        let env = RequestEnvelope::query("fiqh", "what is wudu", "sys".into());
        assert_eq!(
            env.cache_key(),
            Some(CacheKey::from_canonical("QUERY:fiqh:what is wudu"))
        );
    }

    #[test]
    fn image_envelopes_are_uncached() {
        let env = RequestEnvelope::image_text("read", vec![1, 2, 3], "image/png");
        assert_eq!(env.cache_key(), None);
    }

    #[test]
    fn exercise_envelopes_are_uncached() {
        let env = RequestEnvelope::exercise("quiz (request 1)", "sys".into());
        assert_eq!(env.cache_key(), None);
        assert_eq!(env.to_request("m").system_instruction.as_deref(), Some("sys"));
    }

    #[test]
    fn request_carries_inline_payload() {
        let env = RequestEnvelope::image_text("read", vec![1, 2, 3], "image/png");
        let req = env.to_request("m");
        assert_eq!(req.model, "m");
        assert_eq!(req.parts.len(), 2);
        assert!(matches!(
            &req.parts[1],
            PromptPart::InlineData { mime_type, data } if mime_type == "image/png" && data == &[1, 2, 3]
        ));
    }
}
