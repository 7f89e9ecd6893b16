use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{GroupId, QuestionId, SessionId, TestId, UserId};
use crate::time::elapsed_secs;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("session has no current question")]
    Exhausted,

    #[error("question {question} is not part of the stored order")]
    NotInOrder { question: QuestionId },

    #[error("group {group} has no questions")]
    EmptyGroup { group: GroupId },

    #[error("finished session is missing finished_at")]
    MissingFinishedAt,

    #[error("invalid quiz mode: {0}")]
    InvalidMode(String),

    #[error("invalid session status: {0}")]
    InvalidStatus(String),
}

//
// ─── MODE & STATUS ────────────────────────────────────────────────────────────
//

/// How the client presents the quiz. Fixed at session creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizMode {
    /// Practice mode; blank answers are skipped without penalty.
    Educational,
    Classic,
    LimitedTime,
}

impl QuizMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuizMode::Educational => "educational",
            QuizMode::Classic => "classic",
            QuizMode::LimitedTime => "limited_time",
        }
    }
}

impl fmt::Display for QuizMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuizMode {
    type Err = SessionStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "educational" => Ok(QuizMode::Educational),
            "classic" => Ok(QuizMode::Classic),
            "limited_time" => Ok(QuizMode::LimitedTime),
            other => Err(SessionStateError::InvalidMode(other.to_string())),
        }
    }
}

/// Lifecycle of a session: `NotStarted -> InProgress -> Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    NotStarted,
    InProgress,
    Finished,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::NotStarted => "not_started",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = SessionStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "not_started" => Ok(SessionStatus::NotStarted),
            "in_progress" => Ok(SessionStatus::InProgress),
            "finished" => Ok(SessionStatus::Finished),
            other => Err(SessionStateError::InvalidStatus(other.to_string())),
        }
    }
}

//
// ─── POSITION ─────────────────────────────────────────────────────────────────
//

/// Link from a session to the test it was started for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestBinding {
    pub test_id: TestId,
    pub code: String,
}

/// Outcome of moving the pointer past the current question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The pointer moved to the next entry of the stored order.
    Moved(QuestionId),
    /// The last question of a test was answered; no further questions.
    TestComplete,
    /// The last question of a free-roam group was answered; a new group is needed.
    GroupExhausted { group: Option<GroupId> },
}

/// Where a session stands: the question to serve next and the order it comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionPosition {
    current_question: Option<QuestionId>,
    current_group: Option<GroupId>,
    group_order: Vec<QuestionId>,
}

impl SessionPosition {
    /// Position at the first entry of `order`.
    #[must_use]
    pub fn at_start(group: Option<GroupId>, order: Vec<QuestionId>) -> Self {
        Self {
            current_question: order.first().copied(),
            current_group: group,
            group_order: order,
        }
    }

    /// Rebuild a position exactly as it was stored, without validation.
    #[must_use]
    pub fn from_persisted(
        current_question: Option<QuestionId>,
        current_group: Option<GroupId>,
        group_order: Vec<QuestionId>,
    ) -> Self {
        Self {
            current_question,
            current_group,
            group_order,
        }
    }

    #[must_use]
    pub fn current_question(&self) -> Option<QuestionId> {
        self.current_question
    }

    #[must_use]
    pub fn current_group(&self) -> Option<GroupId> {
        self.current_group
    }

    #[must_use]
    pub fn group_order(&self) -> &[QuestionId] {
        &self.group_order
    }

    /// True when there is a question to serve and an order it belongs to.
    #[must_use]
    pub fn is_startable(&self) -> bool {
        self.current_question.is_some() && !self.group_order.is_empty()
    }

    /// True when the current question is the final entry of the order.
    #[must_use]
    pub fn is_at_last(&self) -> bool {
        match (self.current_question, self.group_order.last()) {
            (Some(current), Some(last)) => current == *last,
            _ => false,
        }
    }

    /// Move past the current question.
    ///
    /// The current question is located by value in the stored order; the next
    /// entry of that order is served next.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::Exhausted` if there is no current question, or
    /// `SessionStateError::NotInOrder` if it cannot be found in the order.
    pub fn advance(&mut self, test_bound: bool) -> Result<Advance, SessionStateError> {
        let current = self.current_question.ok_or(SessionStateError::Exhausted)?;
        let idx = self
            .group_order
            .iter()
            .position(|q| *q == current)
            .ok_or(SessionStateError::NotInOrder { question: current })?;

        if let Some(next) = self.group_order.get(idx + 1).copied() {
            self.current_question = Some(next);
            return Ok(Advance::Moved(next));
        }

        if test_bound {
            self.current_question = None;
            return Ok(Advance::TestComplete);
        }

        Ok(Advance::GroupExhausted {
            group: self.current_group,
        })
    }

    /// Replace the group and order, pointing at the order's first entry.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::EmptyGroup` if `order` is empty; the position is
    /// left untouched in that case.
    pub fn enter_group(
        &mut self,
        group: GroupId,
        order: Vec<QuestionId>,
    ) -> Result<QuestionId, SessionStateError> {
        let first = *order.first().ok_or(SessionStateError::EmptyGroup { group })?;
        self.current_group = Some(group);
        self.group_order = order;
        self.current_question = Some(first);
        Ok(first)
    }
}

//
// ─── NEW SESSION ──────────────────────────────────────────────────────────────
//

/// A session that has been planned but not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuizSession {
    pub user_id: UserId,
    pub mode: QuizMode,
    pub screen_size: String,
    pub position: SessionPosition,
    pub test: Option<TestBinding>,
    pub created_at: DateTime<Utc>,
}

impl NewQuizSession {
    /// Plan a free-roam session starting at the first question of `group`.
    #[must_use]
    pub fn free_roam(
        user_id: UserId,
        mode: QuizMode,
        screen_size: impl Into<String>,
        group: GroupId,
        order: Vec<QuestionId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            mode,
            screen_size: screen_size.into(),
            position: SessionPosition::at_start(Some(group), order),
            test: None,
            created_at,
        }
    }

    /// Plan a test-bound session following the test's fixed order.
    #[must_use]
    pub fn test_bound(
        user_id: UserId,
        mode: QuizMode,
        screen_size: impl Into<String>,
        test: TestBinding,
        order: Vec<QuestionId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            mode,
            screen_size: screen_size.into(),
            position: SessionPosition::at_start(None, order),
            test: Some(test),
            created_at,
        }
    }

    #[must_use]
    pub fn is_test_bound(&self) -> bool {
        self.test.is_some()
    }

    /// Continue where `prior` left off by copying its position verbatim.
    ///
    /// Only free-roam sessions adopt, and only from a resumable prior session.
    /// Returns whether the position was adopted.
    pub fn adopt_position(&mut self, prior: &QuizSession) -> bool {
        if self.is_test_bound() || !prior.can_be_resumed() {
            return false;
        }
        self.position = prior.position.clone();
        true
    }

    /// Attach the storage-assigned identifier.
    #[must_use]
    pub fn assign_id(self, id: SessionId) -> QuizSession {
        QuizSession {
            id,
            user_id: self.user_id,
            mode: self.mode,
            status: SessionStatus::NotStarted,
            screen_size: self.screen_size,
            position: self.position,
            test: self.test,
            created_at: self.created_at,
            updated_at: self.created_at,
            finished_at: None,
            question_requested_at: None,
        }
    }
}

//
// ─── SESSION ──────────────────────────────────────────────────────────────────
//

/// Persisted shape of a session, used to rehydrate `QuizSession`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSession {
    pub id: SessionId,
    pub user_id: UserId,
    pub mode: QuizMode,
    pub status: SessionStatus,
    pub screen_size: String,
    pub current_question: Option<QuestionId>,
    pub current_group: Option<GroupId>,
    pub group_order: Vec<QuestionId>,
    pub test: Option<TestBinding>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub question_requested_at: Option<DateTime<Utc>>,
}

/// One user's traversal through a test or an open-ended sequence of groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSession {
    id: SessionId,
    user_id: UserId,
    mode: QuizMode,
    status: SessionStatus,
    screen_size: String,
    position: SessionPosition,
    test: Option<TestBinding>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    question_requested_at: Option<DateTime<Utc>>,
}

impl QuizSession {
    /// Rehydrate a session from persisted storage.
    ///
    /// The position is not checked against the order here; a mismatch is
    /// reported when the pointer is advanced.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::MissingFinishedAt` if a finished session has no finish time.
    pub fn from_persisted(parts: PersistedSession) -> Result<Self, SessionStateError> {
        if parts.status == SessionStatus::Finished && parts.finished_at.is_none() {
            return Err(SessionStateError::MissingFinishedAt);
        }

        Ok(Self {
            id: parts.id,
            user_id: parts.user_id,
            mode: parts.mode,
            status: parts.status,
            screen_size: parts.screen_size,
            position: SessionPosition::from_persisted(
                parts.current_question,
                parts.current_group,
                parts.group_order,
            ),
            test: parts.test,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
            finished_at: parts.finished_at,
            question_requested_at: parts.question_requested_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn mode(&self) -> QuizMode {
        self.mode
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn screen_size(&self) -> &str {
        &self.screen_size
    }

    #[must_use]
    pub fn position(&self) -> &SessionPosition {
        &self.position
    }

    #[must_use]
    pub fn current_question(&self) -> Option<QuestionId> {
        self.position.current_question()
    }

    #[must_use]
    pub fn current_group(&self) -> Option<GroupId> {
        self.position.current_group()
    }

    #[must_use]
    pub fn group_order(&self) -> &[QuestionId] {
        self.position.group_order()
    }

    #[must_use]
    pub fn test(&self) -> Option<&TestBinding> {
        self.test.as_ref()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    #[must_use]
    pub fn question_requested_at(&self) -> Option<DateTime<Utc>> {
        self.question_requested_at
    }

    /// Most recent sign of client activity.
    #[must_use]
    pub fn last_seen(&self) -> DateTime<Utc> {
        self.question_requested_at.unwrap_or(self.updated_at)
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status == SessionStatus::Finished
    }

    #[must_use]
    pub fn is_test_bound(&self) -> bool {
        self.test.is_some()
    }

    #[must_use]
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// True when a new free-roam session may continue from this one.
    #[must_use]
    pub fn can_be_resumed(&self) -> bool {
        !self.is_test_bound() && !self.is_finished() && self.position.is_startable()
    }

    /// True only for test-bound sessions sitting on the final question.
    #[must_use]
    pub fn is_last_question(&self) -> bool {
        self.is_test_bound() && self.position.is_at_last()
    }

    /// Seconds since the current question was handed out.
    ///
    /// Falls back to `updated_at` when the question was never requested.
    #[must_use]
    pub fn answer_latency_secs(&self, now: DateTime<Utc>) -> u64 {
        elapsed_secs(self.question_requested_at.unwrap_or(self.updated_at), now)
    }

    pub fn stamp_question_requested(&mut self, now: DateTime<Utc>) {
        self.question_requested_at = Some(now);
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    /// `NotStarted -> InProgress`; other states are left alone.
    pub fn mark_in_progress(&mut self) {
        if self.status == SessionStatus::NotStarted {
            self.status = SessionStatus::InProgress;
        }
    }

    /// Move past the current question.
    ///
    /// # Errors
    ///
    /// See [`SessionPosition::advance`].
    pub fn advance(&mut self) -> Result<Advance, SessionStateError> {
        let test_bound = self.is_test_bound();
        self.position.advance(test_bound)
    }

    /// Switch to a freshly ordered group after the previous one ran out.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::EmptyGroup` if `order` is empty.
    pub fn enter_group(
        &mut self,
        group: GroupId,
        order: Vec<QuestionId>,
    ) -> Result<QuestionId, SessionStateError> {
        self.position.enter_group(group, order)
    }

    /// Mark the session finished at `at`. Returns false if it already was.
    pub fn finish(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_finished() {
            return false;
        }
        self.status = SessionStatus::Finished;
        self.finished_at = Some(at);
        true
    }

    /// Close the session because its owner started a new one.
    ///
    /// The finish time is the last recorded activity, not the supersession time.
    pub fn supersede(&mut self) -> bool {
        let at = self.updated_at;
        self.finish(at)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
