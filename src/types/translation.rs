//! Structured translation record

use serde::{Deserialize, Serialize};

/// Translation of a (usually Arabic) passage with optional scholarly
/// commentary. Only `translation` is required; models routinely omit
/// commentary that does not apply to the passage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationResult {
    /// Literal translation of the whole passage.
    pub translation: String,
    #[serde(default)]
    pub word_by_word: Vec<WordGloss>,
    /// Grammar and morphology notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grammar: Option<String>,
    /// Rhetoric (balaghah) notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rhetoric: Option<String>,
    /// Jurisprudential rulings derived from the passage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisprudence: Option<String>,
    /// Lessons and wisdom.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wisdom: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
    /// Extended explanation (tafsir/sharh).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// One word and its gloss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordGloss {
    pub word: String,
    pub meaning: String,
}
