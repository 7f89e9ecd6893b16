use chrono::{DateTime, Utc};
use serde::Serialize;

use quiz_core::model::{
    GroupId, Question, QuestionId, QuizMode, QuizSession, SessionId, SessionStatus, UserId,
};

/// Parameters of `QuizEngine::start_session`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub user_id: UserId,
    pub mode: QuizMode,
    pub screen_width: u32,
    pub screen_height: u32,
    /// Raw code as typed by the user; blank means free roam.
    pub test_code: Option<String>,
}

impl StartRequest {
    #[must_use]
    pub fn free_roam(user_id: UserId, mode: QuizMode, width: u32, height: u32) -> Self {
        Self {
            user_id,
            mode,
            screen_width: width,
            screen_height: height,
            test_code: None,
        }
    }

    #[must_use]
    pub fn with_test_code(mut self, code: impl Into<String>) -> Self {
        self.test_code = Some(code.into());
        self
    }

    pub(crate) fn trimmed_test_code(&self) -> Option<&str> {
        self.test_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }
}

/// Result of starting a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedSession {
    pub session: QuizSession,
    /// Seconds allowed for a limited-time session; `0` means unlimited.
    pub time_limit_secs: u32,
    /// Whether the position was carried over from the user's previous session.
    pub resumed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NextQuestion {
    /// The current question with held-out values removed.
    Question { question: Question, is_last: bool },
    /// Nothing left to serve; the client should finish the session.
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerSubmission {
    pub answer: String,
    pub screen_size: String,
}

impl AnswerSubmission {
    #[must_use]
    pub fn new(answer: impl Into<String>, screen_size: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            screen_size: screen_size.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnswerOutcome {
    pub correct: bool,
    /// False when the answer was skipped without being reported.
    pub recorded: bool,
}

/// Session row as shown in listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionListItem {
    pub id: SessionId,
    pub user_id: UserId,
    pub mode: QuizMode,
    pub status: SessionStatus,
    pub current_question: Option<QuestionId>,
    pub current_group: Option<GroupId>,
    pub remaining_in_group: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl SessionListItem {
    #[must_use]
    pub fn from_session(session: &QuizSession) -> Self {
        let remaining_in_group = session
            .current_question()
            .and_then(|current| session.group_order().iter().position(|id| *id == current))
            .map_or(0, |idx| session.group_order().len() - idx);

        Self {
            id: session.id(),
            user_id: session.user_id(),
            mode: session.mode(),
            status: session.status(),
            current_question: session.current_question(),
            current_group: session.current_group(),
            remaining_in_group,
            test_code: session.test().map(|t| t.code.clone()),
            created_at: session.created_at(),
            last_seen: session.last_seen(),
            finished_at: session.finished_at(),
        }
    }
}
