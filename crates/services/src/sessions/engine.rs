use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use quiz_core::model::{
    Advance, AnswerRecord, CaseId, CaseOutcome, NewQuizSession, QuizMode, QuizSession,
    ScreenSize, SessionId, SessionStateError, TestBinding, TestCode, UserId, answers_match,
    is_blank,
};
use storage::repository::{QuestionRepository, SessionRepository, Storage, TestRepository};

use super::ordering::GroupPlanner;
use super::view::{AnswerOutcome, AnswerSubmission, NextQuestion, StartRequest, StartedSession};
use crate::Clock;
use crate::access_service::AccessService;
use crate::error::QuizError;
use crate::settings_service::SettingsService;
use crate::stats::{SessionCreated, StatsDispatcher};

/// Drives quiz sessions: start, serve, grade and finish.
///
/// Every operation re-reads the session before mutating it and writes it back
/// in a single update. Requests for the same session are expected to arrive
/// one at a time.
#[derive(Clone)]
pub struct QuizEngine {
    clock: Clock,
    sessions: Arc<dyn SessionRepository>,
    questions: Arc<dyn QuestionRepository>,
    tests: Arc<dyn TestRepository>,
    planner: GroupPlanner,
    settings: SettingsService,
    access: AccessService,
    stats: StatsDispatcher,
}

impl QuizEngine {
    #[must_use]
    pub fn new(clock: Clock, storage: &Storage, stats: StatsDispatcher) -> Self {
        Self {
            clock,
            sessions: Arc::clone(&storage.sessions),
            questions: Arc::clone(&storage.questions),
            tests: Arc::clone(&storage.tests),
            planner: GroupPlanner::new(Arc::clone(&storage.questions)),
            settings: SettingsService::new(Arc::clone(&storage.settings)),
            access: AccessService::new(clock, Arc::clone(&storage.access)),
            stats,
        }
    }

    /// Same engine, different clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self.access = self.access.with_clock(clock);
        self
    }

    //
    // ─── START ─────────────────────────────────────────────────────────────────
    //

    /// Start a session for `request.user_id`.
    ///
    /// A free-roam start continues where the user's previous unfinished
    /// free-roam session stopped; that session is then closed.
    ///
    /// # Errors
    ///
    /// - `ApprovalRequired` / `CooldownActive` when the access policy refuses.
    /// - `ScreenSize` for a zero dimension.
    /// - `InvalidTestCode` / `EmptyTest` for an unusable test code.
    /// - `NoQuestionsAvailable` when no group can be planned.
    /// - `Storage` on persistence failures.
    pub async fn start_session(&self, request: StartRequest) -> Result<StartedSession, QuizError> {
        let now = self.clock.now();
        let user_id = request.user_id;
        let settings = self.settings.load().await?;

        self.access.check(&settings, user_id, now).await?;
        let screen = ScreenSize::new(request.screen_width, request.screen_height)?;

        let mut draft = match request.trimmed_test_code() {
            Some(raw) => self.plan_test_session(&request, raw, &screen).await?,
            None => self.plan_free_roam_session(&request, &screen).await?,
        };

        let resumed = self.adopt_and_supersede(&mut draft, user_id, now).await;

        let session = self.sessions.create_session(&draft).await?;
        self.stats
            .notify_session_created(SessionCreated::from_session(&session));

        info!(
            session_id = %session.id(),
            %user_id,
            mode = session.mode().as_str(),
            test_code = session.test().map(|t| t.code.as_str()),
            resumed,
            "quiz session started"
        );

        Ok(StartedSession {
            session,
            time_limit_secs: settings.time_limit_secs,
            resumed,
        })
    }

    async fn plan_test_session(
        &self,
        request: &StartRequest,
        raw_code: &str,
        screen: &ScreenSize,
    ) -> Result<NewQuizSession, QuizError> {
        let code = TestCode::normalize(raw_code);
        let Some(test) = self.tests.test_by_code(&code).await? else {
            warn!(code = %code, "quiz start with unknown test code");
            return Err(QuizError::InvalidTestCode { code });
        };

        let order = self.tests.ordered_question_ids(test.id).await?;
        if order.is_empty() {
            warn!(code = %test.code, test_id = %test.id, "quiz start on a test without questions");
            return Err(QuizError::EmptyTest { code: test.code });
        }

        Ok(NewQuizSession::test_bound(
            request.user_id,
            request.mode,
            screen.to_string(),
            TestBinding {
                test_id: test.id,
                code: test.code,
            },
            order,
            self.clock.now(),
        ))
    }

    async fn plan_free_roam_session(
        &self,
        request: &StartRequest,
        screen: &ScreenSize,
    ) -> Result<NewQuizSession, QuizError> {
        let Some(plan) = self.planner.fresh_group(None).await? else {
            warn!(user_id = %request.user_id, "quiz start with an empty question bank");
            return Err(QuizError::NoQuestionsAvailable);
        };

        Ok(NewQuizSession::free_roam(
            request.user_id,
            request.mode,
            screen.to_string(),
            plan.group,
            plan.order,
            self.clock.now(),
        ))
    }

    /// Carry over the previous session's position when allowed, then close it.
    ///
    /// Best effort: lookup and update failures are logged and ignored.
    async fn adopt_and_supersede(
        &self,
        draft: &mut NewQuizSession,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> bool {
        let prior = match self.sessions.last_session_for_user(user_id).await {
            Ok(prior) => prior,
            Err(err) => {
                warn!(%user_id, error = %err, "failed to load previous session");
                None
            }
        };
        let Some(mut prior) = prior else {
            return false;
        };

        let resumed = draft.adopt_position(&prior);
        if prior.supersede() {
            prior.touch(now);
            if let Err(err) = self.sessions.update_session(&prior).await {
                warn!(
                    session_id = %prior.id(),
                    error = %err,
                    "failed to close superseded session"
                );
            } else {
                self.stats.notify_session_finished(prior.id());
            }
        }
        resumed
    }

    //
    // ─── NEXT QUESTION ─────────────────────────────────────────────────────────
    //

    /// Serve the session's current question with held-out values removed.
    ///
    /// Repeated calls serve the same question and only refresh the request
    /// timestamp used to time the answer.
    ///
    /// # Errors
    ///
    /// - `NotFound` when the session is missing or owned by someone else.
    /// - `AlreadyFinished` for a finished session.
    /// - `MissingQuestion` when the current question left the bank.
    /// - `Storage` on persistence failures.
    pub async fn next_question(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<NextQuestion, QuizError> {
        let mut session = self.owned_session(session_id, user_id).await?;
        if session.is_finished() {
            return Err(QuizError::AlreadyFinished);
        }
        let Some(question_id) = session.current_question() else {
            debug!(%session_id, "no question left in session");
            return Ok(NextQuestion::Exhausted);
        };

        let question = self
            .questions
            .question_by_id(question_id)
            .await?
            .ok_or_else(|| {
                error!(%session_id, %question_id, "current question missing from bank");
                QuizError::MissingQuestion { question_id }
            })?;

        let is_last = session.is_last_question();
        let now = self.clock.now();
        session.stamp_question_requested(now);
        session.touch(now);
        self.sessions.update_session(&session).await?;

        Ok(NextQuestion::Question {
            question: question.redacted(),
            is_last,
        })
    }

    //
    // ─── ANSWER ────────────────────────────────────────────────────────────────
    //

    /// Grade an answer to the current question and move the pointer on.
    ///
    /// In educational mode a blank answer is skipped: nothing is reported but
    /// the session still advances.
    ///
    /// # Errors
    ///
    /// - `NotFound` for a missing session, `Forbidden` for someone else's.
    /// - `AlreadyFinished` for a finished session.
    /// - `SequenceExhausted` when there is no current question.
    /// - `SequenceCorrupted` when the current question is not in the stored order.
    /// - `Stats` when a recorded answer cannot be reported; the session is left
    ///   unchanged.
    /// - `Storage` on persistence failures.
    pub async fn submit_answer(
        &self,
        session_id: SessionId,
        user_id: UserId,
        submission: AnswerSubmission,
    ) -> Result<AnswerOutcome, QuizError> {
        let mut session = self
            .sessions
            .get_session(session_id)
            .await?
            .ok_or(QuizError::NotFound)?;
        if !session.is_owned_by(user_id) {
            return Err(QuizError::Forbidden);
        }
        if session.is_finished() {
            return Err(QuizError::AlreadyFinished);
        }
        let Some(question_id) = session.current_question() else {
            return Err(QuizError::SequenceExhausted { session_id });
        };

        let now = self.clock.now();
        let time_spent = session.answer_latency_secs(now);
        let correct_option = self
            .questions
            .correct_option(question_id)
            .await?
            .ok_or(QuizError::MissingQuestion { question_id })?;
        let correct = answers_match(&submission.answer, &correct_option);
        let skip = session.mode() == QuizMode::Educational && is_blank(&submission.answer);

        session.mark_in_progress();
        self.advance(&mut session).await?;

        if !skip {
            let case_code = self
                .questions
                .question_by_id(question_id)
                .await?
                .map(|q| q.case.code)
                .ok_or(QuizError::MissingQuestion { question_id })?;
            let record = AnswerRecord {
                question_id,
                answer: submission.answer,
                is_correct: correct,
                screen_size: submission.screen_size,
                time_spent,
                case_code,
            };
            if let Err(err) = self.stats.record_answer(session_id, &record).await {
                warn!(%session_id, %question_id, error = %err, "failed to record answer");
                return Err(err.into());
            }
        }

        session.touch(now);
        self.sessions.update_session(&session).await?;

        debug!(%session_id, %question_id, correct, skipped = skip, time_spent, "answer graded");
        Ok(AnswerOutcome {
            correct,
            recorded: !skip,
        })
    }

    async fn advance(&self, session: &mut QuizSession) -> Result<(), QuizError> {
        let session_id = session.id();
        match session.advance() {
            Ok(Advance::Moved(_) | Advance::TestComplete) => Ok(()),
            Ok(Advance::GroupExhausted { group }) => {
                let plan = self
                    .planner
                    .fresh_group(group)
                    .await?
                    .ok_or(QuizError::NoQuestionsAvailable)?;
                debug!(%session_id, from = ?group, to = %plan.group, "moving to a new group");
                session.enter_group(plan.group, plan.order)?;
                Ok(())
            }
            Err(SessionStateError::NotInOrder { question }) => {
                error!(
                    %session_id,
                    question_id = %question,
                    "current question not found in stored order"
                );
                Err(QuizError::SequenceCorrupted {
                    session_id,
                    question_id: question,
                })
            }
            Err(SessionStateError::Exhausted) => Err(QuizError::SequenceExhausted { session_id }),
            Err(other) => Err(other.into()),
        }
    }

    //
    // ─── FINISH ────────────────────────────────────────────────────────────────
    //

    /// Close a session. Finishing twice is a no-op.
    ///
    /// # Errors
    ///
    /// - `NotFound` when the session is missing or owned by someone else.
    /// - `Storage` on persistence failures.
    pub async fn finish_session(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<QuizSession, QuizError> {
        let mut session = self.owned_session(session_id, user_id).await?;
        let now = self.clock.now();

        if session.finish(now) {
            session.touch(now);
            self.sessions.update_session(&session).await?;
            self.stats.notify_session_finished(session_id);
            info!(%session_id, %user_id, "quiz session finished");
        } else {
            debug!(%session_id, "session already finished");
        }
        Ok(session)
    }

    /// Held-out values of a case, revealed once the question has been answered.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown case and `Storage` on read failures.
    pub async fn case_outcome(&self, case_id: CaseId) -> Result<CaseOutcome, QuizError> {
        self.questions
            .case_outcome(case_id)
            .await?
            .ok_or(QuizError::NotFound)
    }

    async fn owned_session(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<QuizSession, QuizError> {
        self.sessions
            .get_session(session_id)
            .await?
            .filter(|s| s.is_owned_by(user_id))
            .ok_or(QuizError::NotFound)
    }
}
