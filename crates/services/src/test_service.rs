use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use quiz_core::model::{Test, TestCode, TestDraft, UserId};
use storage::repository::{SessionRepository, StorageError, TestRepository};

use crate::Clock;
use crate::error::QuizError;
use crate::sessions::SessionListItem;

/// A test together with every session taken against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestProgress {
    pub test: Test,
    pub sessions: Vec<SessionListItem>,
}

/// Administration of instructor-defined tests.
#[derive(Clone)]
pub struct TestService {
    clock: Clock,
    tests: Arc<dyn TestRepository>,
    sessions: Arc<dyn SessionRepository>,
}

impl TestService {
    #[must_use]
    pub fn new(
        clock: Clock,
        tests: Arc<dyn TestRepository>,
        sessions: Arc<dyn SessionRepository>,
    ) -> Self {
        Self {
            clock,
            tests,
            sessions,
        }
    }

    /// Create a test whose questions are served in the draft's order.
    ///
    /// # Errors
    ///
    /// - `TestDraft` when the code, name or question list is invalid.
    /// - `DuplicateTestCode` when the code is taken.
    /// - `Storage` when a question does not exist or persistence fails.
    pub async fn create_test(&self, owner: UserId, draft: TestDraft) -> Result<Test, QuizError> {
        let validated = draft.validate(owner, self.clock.now())?;
        match self.tests.create_test(&validated).await {
            Ok(test) => {
                info!(
                    test_id = %test.id,
                    code = %test.code,
                    questions = validated.question_ids.len(),
                    "test created"
                );
                Ok(test)
            }
            Err(StorageError::Conflict) => {
                warn!(code = %validated.code, "test code already exists");
                Err(QuizError::DuplicateTestCode {
                    code: validated.code.into_inner(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// # Errors
    ///
    /// Returns `QuizError::Storage` if tests cannot be read.
    pub async fn tests_by_owner(&self, owner: UserId) -> Result<Vec<Test>, QuizError> {
        Ok(self.tests.tests_by_owner(owner).await?)
    }

    /// The test behind `code` and every session bound to it, newest first.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTestCode` for an unknown code and `Storage` on read failures.
    pub async fn test_progress(&self, code: &str) -> Result<TestProgress, QuizError> {
        let code = TestCode::normalize(code);
        let Some(test) = self.tests.test_by_code(&code).await? else {
            return Err(QuizError::InvalidTestCode { code });
        };
        let sessions = self.sessions.sessions_for_test(test.id).await?;
        Ok(TestProgress {
            test,
            sessions: sessions.iter().map(SessionListItem::from_session).collect(),
        })
    }
}
