//! Quiz, essay, and grading types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Difficulty requested for generated questions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        })
    }
}

/// Options for [`Gateway::generate_quiz`](crate::Gateway::generate_quiz).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizOptions {
    /// Number of questions. Default: 5.
    pub count: usize,
    pub difficulty: Difficulty,
}

impl Default for QuizOptions {
    fn default() -> Self {
        Self {
            count: 5,
            difficulty: Difficulty::default(),
        }
    }
}

impl QuizOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }
}

/// Multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    /// Index into `options` of the correct answer.
    pub correct_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl QuizQuestion {
    /// The correct option, if `correct_index` is in range.
    pub fn correct_answer(&self) -> Option<&str> {
        self.options.get(self.correct_index).map(String::as_str)
    }
}

/// Open-ended essay question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EssayQuestion {
    pub question: String,
    /// Points a complete answer should cover.
    #[serde(default)]
    pub key_points: Vec<String>,
}

/// Assessment of an essay answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EssayGrade {
    /// Score out of 100.
    pub score: u8,
    pub feedback: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
}
