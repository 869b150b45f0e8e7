//! Instruction and prompt templates for the gateway operations.
//!
//! The JSON shapes described here must stay in sync with the result types
//! in [`crate::types`].

use crate::types::QuizOptions;

/// Persona for an open question on `topic`.
pub(crate) fn query_instruction(topic: &str) -> String {
    format!(
        "You are a careful scholar of Islamic studies specialising in {topic}. \
         Answer the user's question clearly and accurately, citing Qur'an verses, \
         hadith, or classical works where relevant. When scholars differ, present \
         the main positions fairly. If you are unsure, say so. Respond in the \
         language of the question."
    )
}

pub(crate) const TRANSLATE_INSTRUCTION: &str = "\
You are an expert translator of classical Arabic texts. Translate the passage the \
user sends and reply with a single JSON object and nothing else, using these keys:
- \"translation\": literal translation of the whole passage (required)
- \"wordByWord\": array of {\"word\": string, \"meaning\": string}, one per word
- \"grammar\": grammar and morphology notes (optional)
- \"rhetoric\": rhetorical (balaghah) notes (optional)
- \"jurisprudence\": rulings that can be derived from the passage (optional)
- \"wisdom\": lessons and wisdom (optional)
- \"references\": array of source references (optional)
- \"explanation\": extended explanation (optional)
Omit optional keys that do not apply.";

pub(crate) const IMAGE_TEXT_PROMPT: &str = "\
Extract all text visible in this image exactly as written, preserving line breaks \
and any Arabic script or diacritics. Reply with the extracted text only.";

pub(crate) const QUIZ_INSTRUCTION: &str = "\
You write multiple-choice quiz questions for students of Islamic studies. Reply \
with a JSON array and nothing else. Each element is an object with keys \
\"question\" (string), \"options\" (array of 4 strings), \"correctIndex\" \
(0-based index of the correct option) and \"explanation\" (string).";

pub(crate) const ESSAY_INSTRUCTION: &str = "\
You write open-ended essay questions for students of Islamic studies. Reply with \
a JSON array and nothing else. Each element is an object with keys \"question\" \
(string) and \"keyPoints\" (array of strings a complete answer should cover).";

pub(crate) const GRADING_INSTRUCTION: &str = "\
You are a fair and encouraging teacher grading a student's essay answer. Reply \
with a single JSON object and nothing else, with keys \"score\" (integer 0-100), \
\"feedback\" (string), \"strengths\" (array of strings) and \"improvements\" \
(array of strings).";

/// Unique marker that makes every envelope carrying it distinct, so the
/// result is never served from cache.
fn freshness_marker(token: &str) -> String {
    format!("\n\n(request {token})")
}

pub(crate) fn quiz_prompt(topic: &str, options: &QuizOptions, token: &str) -> String {
    format!(
        "Write {count} {difficulty} multiple-choice questions about {topic}. \
         Vary the questions and avoid repeating common ones.{marker}",
        count = options.count,
        difficulty = options.difficulty,
        marker = freshness_marker(token),
    )
}

pub(crate) fn essay_prompt(topic: &str, count: usize, token: &str) -> String {
    format!(
        "Write {count} essay questions about {topic} that test understanding \
         rather than recall.{marker}",
        marker = freshness_marker(token),
    )
}

pub(crate) fn grading_prompt(question: &str, answer: &str, token: &str) -> String {
    format!(
        "Question:\n{question}\n\nStudent answer:\n{answer}\n\nGrade this answer.{marker}",
        marker = freshness_marker(token),
    )
}
