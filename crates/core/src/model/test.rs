use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::ids::{QuestionId, TestId, UserId};

const CODE_MIN_LEN: usize = 4;
const CODE_MAX_LEN: usize = 24;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TestDraftError {
    #[error("invalid test code format: {0:?}")]
    InvalidCode(String),

    #[error("test name is required")]
    EmptyName,

    #[error("a test needs at least one question")]
    NoQuestions,

    #[error("question {0} is listed more than once")]
    DuplicateQuestion(QuestionId),
}

/// Normalised test code: upper-case `A-Z`, `0-9` and `-`, 4 to 24 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestCode(String);

impl TestCode {
    /// Trim and upper-case `raw` without validating it.
    ///
    /// Used for lookups, where an invalid code simply resolves to nothing.
    #[must_use]
    pub fn normalize(raw: &str) -> String {
        raw.trim().to_uppercase()
    }

    /// # Errors
    ///
    /// Returns `TestDraftError::InvalidCode` if the normalised code has the wrong
    /// length or contains characters outside `A-Z`, `0-9` and `-`.
    pub fn parse(raw: &str) -> Result<Self, TestDraftError> {
        let code = Self::normalize(raw);
        let len_ok = (CODE_MIN_LEN..=CODE_MAX_LEN).contains(&code.len());
        let chars_ok = code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-');
        if !len_ok || !chars_ok {
            return Err(TestDraftError::InvalidCode(code));
        }
        Ok(Self(code))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TestCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An instructor-defined, fixed-order set of questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Test {
    pub id: TestId,
    pub code: String,
    pub name: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// Unvalidated input for creating a test.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TestDraft {
    pub code: String,
    pub name: String,
    pub question_ids: Vec<QuestionId>,
}

impl TestDraft {
    /// # Errors
    ///
    /// Returns `TestDraftError` if the code, name or question list is unusable.
    pub fn validate(
        self,
        owner: UserId,
        created_at: DateTime<Utc>,
    ) -> Result<ValidatedTest, TestDraftError> {
        let code = TestCode::parse(&self.code)?;
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(TestDraftError::EmptyName);
        }
        if self.question_ids.is_empty() {
            return Err(TestDraftError::NoQuestions);
        }
        for (idx, id) in self.question_ids.iter().enumerate() {
            if self.question_ids[..idx].contains(id) {
                return Err(TestDraftError::DuplicateQuestion(*id));
            }
        }

        Ok(ValidatedTest {
            code,
            name,
            created_by: owner,
            created_at,
            question_ids: self.question_ids,
        })
    }
}

/// A draft that passed validation; question order is the sort order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTest {
    pub code: TestCode,
    pub name: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub question_ids: Vec<QuestionId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn draft(code: &str, name: &str, ids: &[u64]) -> TestDraft {
        TestDraft {
            code: code.into(),
            name: name.into(),
            question_ids: ids.iter().copied().map(QuestionId::new).collect(),
        }
    }

    #[test]
    fn code_is_trimmed_and_upper_cased() {
        let test = draft("  abcd-12 ", " Spring exam ", &[5, 6, 7])
            .validate(UserId::new(1), fixed_now())
            .unwrap();
        assert_eq!(test.code.as_str(), "ABCD-12");
        assert_eq!(test.name, "Spring exam");
        assert_eq!(
            test.question_ids,
            vec![QuestionId::new(5), QuestionId::new(6), QuestionId::new(7)]
        );
    }

    #[test]
    fn code_format_is_enforced() {
        for bad in ["abc", "AB CD", "ABCD_1", "ABCDEFGHIJKLMNOPQRSTUVWXY", "ŻÓŁW"] {
            let err = draft(bad, "x", &[1]).validate(UserId::new(1), fixed_now());
            assert!(matches!(err, Err(TestDraftError::InvalidCode(_))), "{bad}");
        }
    }

    #[test]
    fn empty_name_and_questions_are_rejected() {
        assert_eq!(
            draft("ABCD", "  ", &[1]).validate(UserId::new(1), fixed_now()),
            Err(TestDraftError::EmptyName)
        );
        assert_eq!(
            draft("ABCD", "n", &[]).validate(UserId::new(1), fixed_now()),
            Err(TestDraftError::NoQuestions)
        );
        assert_eq!(
            draft("ABCD", "n", &[1, 2, 1]).validate(UserId::new(1), fixed_now()),
            Err(TestDraftError::DuplicateQuestion(QuestionId::new(1)))
        );
    }
}
