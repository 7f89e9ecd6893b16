use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use quiz_core::model::{AnswerRecord, SessionId};

use super::{SessionCreated, StatsReporter};
use crate::error::StatsError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
    Created(SessionCreated),
    Answer(SessionId, AnswerRecord),
    Finished(SessionId),
}

/// Keeps every accepted event in memory. Used in tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct RecordingStatsReporter {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingStatsReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails and nothing is recorded.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn answers(&self) -> Vec<(SessionId, AnswerRecord)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                RecordedEvent::Answer(id, record) => Some((id, record)),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: RecordedEvent) -> Result<(), StatsError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StatsError::Unavailable("recording reporter set to fail".into()));
        }
        let mut events = self
            .events
            .lock()
            .map_err(|_| StatsError::Unavailable("event log poisoned".into()))?;
        events.push(event);
        Ok(())
    }
}

#[async_trait]
impl StatsReporter for RecordingStatsReporter {
    async fn session_created(&self, event: &SessionCreated) -> Result<(), StatsError> {
        self.push(RecordedEvent::Created(event.clone()))
    }

    async fn answer_recorded(
        &self,
        session_id: SessionId,
        record: &AnswerRecord,
    ) -> Result<(), StatsError> {
        self.push(RecordedEvent::Answer(session_id, record.clone()))
    }

    async fn session_finished(&self, session_id: SessionId) -> Result<(), StatsError> {
        self.push(RecordedEvent::Finished(session_id))
    }
}
