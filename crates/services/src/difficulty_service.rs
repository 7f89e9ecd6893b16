use std::sync::Arc;

use tracing::{info, warn};

use quiz_core::model::{Difficulty, DifficultySummary, DifficultyVote, QuestionId, UserId};
use storage::repository::{DifficultyRepository, StorageError};

use crate::Clock;
use crate::error::QuizError;

/// Per-question difficulty ratings collected from quiz takers.
#[derive(Clone)]
pub struct DifficultyService {
    clock: Clock,
    votes: Arc<dyn DifficultyRepository>,
}

impl DifficultyService {
    #[must_use]
    pub fn new(clock: Clock, votes: Arc<dyn DifficultyRepository>) -> Self {
        Self { clock, votes }
    }

    /// Record `user_id`'s one and only rating of a question.
    ///
    /// # Errors
    ///
    /// - `Difficulty` unless `raw` is exactly `easy` or `hard`.
    /// - `AlreadyVoted` when the user rated the question before.
    /// - `UnknownQuestion` when the question does not exist.
    /// - `Storage` on persistence failures.
    pub async fn vote(
        &self,
        user_id: UserId,
        question_id: QuestionId,
        raw: &str,
    ) -> Result<DifficultyVote, QuizError> {
        let vote = DifficultyVote {
            question_id,
            user_id,
            difficulty: raw.parse::<Difficulty>()?,
            created_at: self.clock.now(),
        };
        match self.votes.insert_vote(&vote).await {
            Ok(()) => {
                info!(
                    %user_id,
                    %question_id,
                    difficulty = vote.difficulty.as_str(),
                    "difficulty vote recorded"
                );
                Ok(vote)
            }
            Err(StorageError::Conflict) => Err(QuizError::AlreadyVoted { question_id }),
            Err(StorageError::NotFound) => {
                warn!(%question_id, "difficulty vote for unknown question");
                Err(QuizError::UnknownQuestion { question_id })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// # Errors
    ///
    /// Returns `QuizError::Storage` if votes cannot be read.
    pub async fn my_vote(
        &self,
        user_id: UserId,
        question_id: QuestionId,
    ) -> Result<Option<Difficulty>, QuizError> {
        Ok(self
            .votes
            .vote_of(question_id, user_id)
            .await?
            .map(|v| v.difficulty))
    }

    /// # Errors
    ///
    /// Returns `QuizError::Storage` if votes cannot be read.
    pub async fn summary(&self, question_id: QuestionId) -> Result<DifficultySummary, QuizError> {
        let mut all = self.summaries(&[question_id]).await?;
        Ok(all
            .pop()
            .unwrap_or_else(|| DifficultySummary::empty(question_id)))
    }

    /// One summary per distinct id, in first-seen order; unrated questions
    /// report zero votes.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Storage` if votes cannot be read.
    pub async fn summaries(
        &self,
        question_ids: &[QuestionId],
    ) -> Result<Vec<DifficultySummary>, QuizError> {
        let mut ids: Vec<QuestionId> = Vec::with_capacity(question_ids.len());
        for id in question_ids {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let tallied = self.votes.vote_summaries(&ids).await?;
        Ok(ids
            .into_iter()
            .map(|id| {
                tallied
                    .iter()
                    .find(|s| s.question_id == id)
                    .copied()
                    .unwrap_or_else(|| DifficultySummary::empty(id))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{CaseId, GroupId, NewCase, NewQuestion};
    use quiz_core::time::{fixed_clock, fixed_now};
    use storage::repository::{InMemoryRepository, QuestionRepository};

    async fn service_with_question() -> (DifficultyService, QuestionId) {
        let repo = InMemoryRepository::new();
        let case_id: CaseId = repo
            .insert_case(&NewCase {
                code: "CASE-D".into(),
                gender: "M".into(),
                age1: 8,
                age2: 11,
                age3: 16,
                parameter_values: Vec::new(),
            })
            .await
            .unwrap();
        let question_id = repo
            .insert_question(&NewQuestion {
                question: "Growth direction?".into(),
                options: vec!["Horizontal".into(), "Vertical".into()],
                correct: "Vertical".into(),
                prediction_age: 16,
                case_id,
                group: GroupId::new(1),
            })
            .await
            .unwrap();
        (
            DifficultyService::new(fixed_clock(), Arc::new(repo)),
            question_id,
        )
    }

    #[tokio::test]
    async fn one_vote_per_user() {
        let (service, q) = service_with_question().await;
        let user = UserId::new(7);

        let vote = service.vote(user, q, "hard").await.unwrap();
        assert_eq!(vote.created_at, fixed_now());
        assert_eq!(
            service.my_vote(user, q).await.unwrap(),
            Some(Difficulty::Hard)
        );
        assert_eq!(service.my_vote(UserId::new(8), q).await.unwrap(), None);

        let again = service.vote(user, q, "easy").await.unwrap_err();
        assert!(matches!(again, QuizError::AlreadyVoted { question_id } if question_id == q));
        assert_eq!(again.code(), "already_voted");
    }

    #[tokio::test]
    async fn rejects_unknown_levels_and_questions() {
        let (service, q) = service_with_question().await;
        let err = service.vote(UserId::new(1), q, "medium").await.unwrap_err();
        assert!(matches!(err, QuizError::Difficulty(_)));

        let missing = QuestionId::new(404);
        let err = service
            .vote(UserId::new(1), missing, "easy")
            .await
            .unwrap_err();
        assert!(matches!(err, QuizError::UnknownQuestion { question_id } if question_id == missing));
    }

    #[tokio::test]
    async fn summaries_fill_unrated_questions() {
        let (service, q) = service_with_question().await;
        service.vote(UserId::new(1), q, "hard").await.unwrap();
        service.vote(UserId::new(2), q, "hard").await.unwrap();
        service.vote(UserId::new(3), q, "easy").await.unwrap();
        service.vote(UserId::new(4), q, "easy").await.unwrap();

        let summary = service.summary(q).await.unwrap();
        assert_eq!(summary.total_votes, 4);
        assert!((summary.hard_pct - 50.0).abs() < f64::EPSILON);

        let other = QuestionId::new(77);
        let batch = service.summaries(&[other, q, other]).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], DifficultySummary::empty(other));
        assert_eq!(batch[1], summary);
        assert!(service.summaries(&[]).await.unwrap().is_empty());
    }
}
