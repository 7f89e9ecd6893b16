use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{QuestionId, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DifficultyError {
    #[error("difficulty must be easy or hard, got {0:?}")]
    Invalid(String),
}

/// How hard a user found a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Hard,
}

impl Difficulty {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = DifficultyError;

    /// Exact, lower-case match only.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(DifficultyError::Invalid(s.to_string())),
        }
    }
}

/// One user's single vote on one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyVote {
    pub question_id: QuestionId,
    pub user_id: UserId,
    pub difficulty: Difficulty,
    pub created_at: DateTime<Utc>,
}

/// Vote tally for a question.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultySummary {
    pub question_id: QuestionId,
    pub total_votes: u32,
    pub hard_votes: u32,
    pub easy_votes: u32,
    /// Share of hard votes in percent, truncated to two decimals; 0 without votes.
    pub hard_pct: f64,
}

impl DifficultySummary {
    #[must_use]
    pub fn from_counts(question_id: QuestionId, hard_votes: u32, easy_votes: u32) -> Self {
        let total_votes = hard_votes.saturating_add(easy_votes);
        let hard_pct = if total_votes == 0 {
            0.0
        } else {
            let basis_points = u64::from(hard_votes) * 10_000 / u64::from(total_votes);
            f64::from(u32::try_from(basis_points).unwrap_or(10_000)) / 100.0
        };
        Self {
            question_id,
            total_votes,
            hard_votes,
            easy_votes,
            hard_pct,
        }
    }

    /// A question nobody voted on yet.
    #[must_use]
    pub fn empty(question_id: QuestionId) -> Self {
        Self::from_counts(question_id, 0, 0)
    }
}
