mod dispatcher;
mod http;
mod memory;

use async_trait::async_trait;
use serde::Serialize;

use quiz_core::model::{AnswerRecord, QuizMode, QuizSession, SessionId, TestId, UserId};

use crate::error::StatsError;

pub use dispatcher::{DEFAULT_QUEUE_CAPACITY, StatsDispatcher};
pub use http::{HttpStatsReporter, StatsConfig};
pub use memory::{RecordedEvent, RecordingStatsReporter};

/// Payload announcing a freshly created session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionCreated {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub quiz_mode: QuizMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_id: Option<TestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_code: Option<String>,
}

impl SessionCreated {
    #[must_use]
    pub fn from_session(session: &QuizSession) -> Self {
        Self {
            session_id: session.id(),
            user_id: session.user_id(),
            quiz_mode: session.mode(),
            test_id: session.test().map(|t| t.test_id),
            test_code: session.test().map(|t| t.code.clone()),
        }
    }
}

/// Sink for session statistics.
#[async_trait]
pub trait StatsReporter: Send + Sync {
    /// # Errors
    ///
    /// Returns `StatsError` if the sink rejects or cannot receive the event.
    async fn session_created(&self, event: &SessionCreated) -> Result<(), StatsError>;

    /// # Errors
    ///
    /// Returns `StatsError` if the sink rejects or cannot receive the record.
    async fn answer_recorded(
        &self,
        session_id: SessionId,
        record: &AnswerRecord,
    ) -> Result<(), StatsError>;

    /// # Errors
    ///
    /// Returns `StatsError` if the sink rejects or cannot receive the event.
    async fn session_finished(&self, session_id: SessionId) -> Result<(), StatsError>;
}
