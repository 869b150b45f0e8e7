//! Free-text response types

use serde::{Deserialize, Serialize};

/// Answer to an open scholarly question.
///
/// Also the cached form of that answer: the text is stored wrapped as
/// `{"text": ...}` and unwrapped on a cache hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenQueryResult {
    pub text: String,
}

impl From<OpenQueryResult> for String {
    fn from(result: OpenQueryResult) -> Self {
        result.text
    }
}

/// Text read from an image. Never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTextResult {
    pub text: String,
}

impl From<ImageTextResult> for String {
    fn from(result: ImageTextResult) -> Self {
        result.text
    }
}
