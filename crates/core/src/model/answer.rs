use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::ids::QuestionId;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("screen size must be positive, got {width}x{height}")]
pub struct InvalidScreenSize {
    pub width: u32,
    pub height: u32,
}

/// Client viewport reported when a session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    width: u32,
    height: u32,
}

impl ScreenSize {
    /// # Errors
    ///
    /// Returns `InvalidScreenSize` if either dimension is zero.
    pub fn new(width: u32, height: u32) -> Result<Self, InvalidScreenSize> {
        if width == 0 || height == 0 {
            return Err(InvalidScreenSize { width, height });
        }
        Ok(Self { width, height })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }
}

impl fmt::Display for ScreenSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Case-insensitive comparison of trimmed answers.
#[must_use]
pub fn answers_match(submitted: &str, correct: &str) -> bool {
    submitted.trim().to_lowercase() == correct.trim().to_lowercase()
}

/// True when nothing but whitespace was submitted.
#[must_use]
pub fn is_blank(answer: &str) -> bool {
    answer.trim().is_empty()
}

/// One graded response, as forwarded to the statistics sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: QuestionId,
    pub answer: String,
    pub is_correct: bool,
    pub screen_size: String,
    /// Seconds between handing out the question and receiving the answer.
    pub time_spent: u64,
    pub case_code: String,
}
