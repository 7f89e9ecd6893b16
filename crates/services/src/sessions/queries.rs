use std::sync::Arc;

use chrono::Duration;

use quiz_core::model::UserId;
use storage::repository::SessionRepository;

use super::view::SessionListItem;
use crate::Clock;
use crate::error::QuizError;

const DEFAULT_LIVE_CUTOFF_MINUTES: i64 = 5;
/// Thirty days.
const MAX_LIVE_CUTOFF_MINUTES: i64 = 43_200;
const DEFAULT_LIVE_LIMIT: u32 = 200;
const MAX_LIVE_LIMIT: i64 = 500;

/// Read-only session listings for dashboards and admin tools.
#[derive(Clone)]
pub struct SessionQueries {
    clock: Clock,
    sessions: Arc<dyn SessionRepository>,
}

impl SessionQueries {
    #[must_use]
    pub fn new(clock: Clock, sessions: Arc<dyn SessionRepository>) -> Self {
        Self { clock, sessions }
    }

    /// Unfinished sessions of one user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Storage` if sessions cannot be read.
    pub async fn active_sessions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<SessionListItem>, QuizError> {
        let sessions = self.sessions.active_sessions_for_user(user_id).await?;
        Ok(sessions.iter().map(SessionListItem::from_session).collect())
    }

    /// Unfinished sessions seen within the last `cutoff_minutes`, most recent first.
    ///
    /// A non-positive cutoff means 5 minutes and cutoffs longer than 30 days are
    /// capped; a limit outside `1..=500` means 200.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Storage` if sessions cannot be read.
    pub async fn live_sessions(
        &self,
        cutoff_minutes: i64,
        limit: i64,
    ) -> Result<Vec<SessionListItem>, QuizError> {
        let (cutoff_minutes, limit) = normalize_live_window(cutoff_minutes, limit);
        let since = self.clock.now() - Duration::minutes(cutoff_minutes);
        let sessions = self.sessions.live_sessions(since, limit).await?;
        Ok(sessions.iter().map(SessionListItem::from_session).collect())
    }
}

fn normalize_live_window(cutoff_minutes: i64, limit: i64) -> (i64, u32) {
    let cutoff = if cutoff_minutes <= 0 {
        DEFAULT_LIVE_CUTOFF_MINUTES
    } else {
        cutoff_minutes.min(MAX_LIVE_CUTOFF_MINUTES)
    };
    let limit = if (1..=MAX_LIVE_LIMIT).contains(&limit) {
        u32::try_from(limit).unwrap_or(DEFAULT_LIVE_LIMIT)
    } else {
        DEFAULT_LIVE_LIMIT
    };
    (cutoff, limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{GroupId, NewQuizSession, QuestionId, QuizMode};
    use quiz_core::time::{fixed_clock, fixed_now};
    use storage::repository::InMemoryRepository;

    #[test]
    fn live_window_defaults() {
        assert_eq!(normalize_live_window(0, 0), (5, 200));
        assert_eq!(normalize_live_window(-3, 501), (5, 200));
        assert_eq!(normalize_live_window(15, 500), (15, 500));
        assert_eq!(normalize_live_window(1, 1), (1, 1));
        assert_eq!(normalize_live_window(i64::MAX, 10), (43_200, 10));
        assert_eq!(normalize_live_window(43_201, 10), (43_200, 10));
    }

    #[tokio::test]
    async fn live_sessions_use_the_clock() {
        let repo = InMemoryRepository::new();
        let recent = NewQuizSession::free_roam(
            UserId::new(1),
            QuizMode::Classic,
            "1x1",
            GroupId::new(1),
            vec![QuestionId::new(1)],
            fixed_now() - Duration::minutes(2),
        );
        let old = NewQuizSession {
            created_at: fixed_now() - Duration::minutes(20),
            ..recent.clone()
        };
        let recent = repo.create_session(&recent).await.unwrap();
        repo.create_session(&old).await.unwrap();

        let queries = SessionQueries::new(fixed_clock(), Arc::new(repo));
        let live = queries.live_sessions(0, 0).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, recent.id());

        let wide = queries.live_sessions(60, 10).await.unwrap();
        assert_eq!(wide.len(), 2);
        let widest = queries.live_sessions(i64::MAX, 10).await.unwrap();
        assert_eq!(widest.len(), 2);
        assert_eq!(
            queries
                .active_sessions_for_user(UserId::new(1))
                .await
                .unwrap()
                .len(),
            2
        );
    }
}
