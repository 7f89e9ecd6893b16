//! Shared error types for the services crate.

use chrono::{DateTime, Utc};
use thiserror::Error;

use quiz_core::access::AccessDenied;
use quiz_core::model::{
    DifficultyError, InvalidScreenSize, QuestionId, SecurityMode, SessionId, SessionStateError,
    SettingsError, TestDraftError,
};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Coarse category of a `QuizError`, used to pick transport codes and log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Expected refusal by the access policy.
    Policy,
    /// Missing or unusable content, configuration or client input.
    Input,
    /// Stored session state contradicts itself.
    Consistency,
    /// Unknown session or a session owned by someone else.
    Authorization,
    /// Infrastructure failure.
    Internal,
}

/// Errors emitted by the stats reporter and its dispatcher.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StatsError {
    #[error("stats request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("stats queue is full")]
    QueueFull,
    #[error("stats worker has stopped")]
    QueueClosed,
    #[error("stats reporter unavailable: {0}")]
    Unavailable(String),
}

/// Errors emitted by the quiz engine and its companion services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizError {
    #[error("account requires manual approval by an administrator")]
    ApprovalRequired { mode: SecurityMode },

    #[error("cooldown active, ready in {wait_seconds}s")]
    CooldownActive {
        cooldown_hours: u32,
        wait_seconds: u64,
        ready_at: DateTime<Utc>,
    },

    #[error("unknown test code {code:?}")]
    InvalidTestCode { code: String },

    #[error("test {code:?} has no questions")]
    EmptyTest { code: String },

    #[error("no questions available")]
    NoQuestionsAvailable,

    #[error("test code {code:?} already exists")]
    DuplicateTestCode { code: String },

    #[error(transparent)]
    ScreenSize(#[from] InvalidScreenSize),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    TestDraft(#[from] TestDraftError),

    #[error(transparent)]
    Difficulty(#[from] DifficultyError),

    #[error("question {question_id} does not exist")]
    UnknownQuestion { question_id: QuestionId },

    #[error("difficulty of question {question_id} was already rated")]
    AlreadyVoted { question_id: QuestionId },

    #[error("session not found")]
    NotFound,

    #[error("session does not belong to the caller")]
    Forbidden,

    #[error("session already finished")]
    AlreadyFinished,

    #[error("session {session_id} has no question left to answer")]
    SequenceExhausted { session_id: SessionId },

    #[error("question {question_id} of session {session_id} is not in its stored order")]
    SequenceCorrupted {
        session_id: SessionId,
        question_id: QuestionId,
    },

    #[error("question {question_id} is missing from the question bank")]
    MissingQuestion { question_id: QuestionId },

    #[error(transparent)]
    State(#[from] SessionStateError),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<AccessDenied> for QuizError {
    fn from(denied: AccessDenied) -> Self {
        match denied {
            AccessDenied::ApprovalRequired { mode } => QuizError::ApprovalRequired { mode },
            AccessDenied::CooldownActive {
                cooldown_hours,
                wait_seconds,
                ready_at,
                ..
            } => QuizError::CooldownActive {
                cooldown_hours,
                wait_seconds,
                ready_at,
            },
        }
    }
}

impl QuizError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            QuizError::ApprovalRequired { .. } | QuizError::CooldownActive { .. } => {
                ErrorClass::Policy
            }
            QuizError::InvalidTestCode { .. }
            | QuizError::EmptyTest { .. }
            | QuizError::NoQuestionsAvailable
            | QuizError::DuplicateTestCode { .. }
            | QuizError::ScreenSize(_)
            | QuizError::Settings(_)
            | QuizError::TestDraft(_)
            | QuizError::Difficulty(_)
            | QuizError::UnknownQuestion { .. }
            | QuizError::AlreadyVoted { .. }
            | QuizError::AlreadyFinished
            | QuizError::SequenceExhausted { .. } => ErrorClass::Input,
            QuizError::SequenceCorrupted { .. } => ErrorClass::Consistency,
            QuizError::NotFound | QuizError::Forbidden => ErrorClass::Authorization,
            QuizError::MissingQuestion { .. }
            | QuizError::State(_)
            | QuizError::Stats(_)
            | QuizError::Storage(_) => ErrorClass::Internal,
        }
    }

    /// Short machine-readable code, stable across releases.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            QuizError::ApprovalRequired { .. } => "approval_required",
            QuizError::CooldownActive { .. } => "cooldown_active",
            QuizError::InvalidTestCode { .. } => "invalid_test_code",
            QuizError::EmptyTest { .. } => "empty_test",
            QuizError::NoQuestionsAvailable => "no_questions_available",
            QuizError::DuplicateTestCode { .. } => "duplicate_test_code",
            QuizError::ScreenSize(_) => "invalid_screen_size",
            QuizError::Settings(_) => "invalid_setting",
            QuizError::TestDraft(_) => "invalid_test",
            QuizError::Difficulty(_) => "invalid_difficulty",
            QuizError::UnknownQuestion { .. } => "unknown_question",
            QuizError::AlreadyVoted { .. } => "already_voted",
            QuizError::NotFound => "not_found",
            QuizError::Forbidden => "forbidden",
            QuizError::AlreadyFinished => "already_finished",
            QuizError::SequenceExhausted { .. } => "sequence_exhausted",
            QuizError::SequenceCorrupted { .. } => "sequence_corrupted",
            QuizError::MissingQuestion { .. }
            | QuizError::State(_)
            | QuizError::Stats(_)
            | QuizError::Storage(_) => "internal",
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::time::fixed_now;

    #[test]
    fn access_denials_map_to_policy_errors() {
        let err = QuizError::from(AccessDenied::CooldownActive {
            mode: SecurityMode::Cooldown,
            cooldown_hours: 24,
            wait_seconds: 60,
            ready_at: fixed_now(),
        });
        assert_eq!(err.class(), ErrorClass::Policy);
        assert_eq!(err.code(), "cooldown_active");
    }

    #[test]
    fn ownership_errors_share_a_class() {
        assert_eq!(QuizError::NotFound.class(), ErrorClass::Authorization);
        assert_eq!(QuizError::Forbidden.class(), ErrorClass::Authorization);
        let corrupted = QuizError::SequenceCorrupted {
            session_id: SessionId::new(1),
            question_id: QuestionId::new(9),
        };
        assert_eq!(corrupted.class(), ErrorClass::Consistency);
        assert_eq!(
            QuizError::from(StorageError::NotFound).class(),
            ErrorClass::Internal
        );
    }
}
