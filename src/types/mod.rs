//! Typed results for the gateway's operations.
//!
//! Each operation declares its own result shape; model output that does
//! not fit it is a parse error rather than an untyped blob passed along.

mod quiz;
mod response;
mod translation;

pub use quiz::{Difficulty, EssayGrade, EssayQuestion, QuizOptions, QuizQuestion};
pub use response::{ImageTextResult, OpenQueryResult};
pub use translation::{TranslationResult, WordGloss};
