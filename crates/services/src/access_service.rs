use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use quiz_core::access::{self, UserStanding};
use quiz_core::model::{QuizSettings, SecurityMode, UserId};
use storage::repository::{AccessRepository, StorageError};

use crate::Clock;
use crate::error::QuizError;

/// Access policy checks and approval administration.
#[derive(Clone)]
pub struct AccessService {
    clock: Clock,
    access: Arc<dyn AccessRepository>,
}

impl AccessService {
    #[must_use]
    pub fn new(clock: Clock, access: Arc<dyn AccessRepository>) -> Self {
        Self { clock, access }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Look up only what the configured mode needs.
    ///
    /// In cooldown mode this registers the user as first seen at `now` unless
    /// an earlier registration exists.
    async fn standing(
        &self,
        settings: &QuizSettings,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<UserStanding, StorageError> {
        Ok(match settings.security_mode {
            SecurityMode::Open => UserStanding::Unchecked,
            SecurityMode::Manual => UserStanding::Approval {
                approved: self.access.is_user_approved(user_id).await?,
            },
            SecurityMode::Cooldown => UserStanding::FirstSeen {
                registered_at: self.access.registered_at_or_insert(user_id, now).await?,
            },
        })
    }

    /// Decide whether `user_id` may start a session at `now`.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::ApprovalRequired` or `QuizError::CooldownActive` when
    /// the policy refuses, and `QuizError::Storage` when the lookup fails.
    pub async fn check(
        &self,
        settings: &QuizSettings,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<(), QuizError> {
        let standing = self.standing(settings, user_id, now).await?;
        access::evaluate(settings, standing, now).map_err(|denied| {
            debug!(%user_id, reason = %denied, "quiz start refused by access policy");
            QuizError::from(denied)
        })
    }

    /// # Errors
    ///
    /// Returns `QuizError::Storage` on persistence failures.
    pub async fn approve(&self, user_id: UserId, by: Option<UserId>) -> Result<(), QuizError> {
        self.access
            .set_approval(user_id, true, by, self.clock.now())
            .await?;
        info!(%user_id, approved_by = ?by, "user approved for quiz");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `QuizError::Storage` on persistence failures.
    pub async fn unapprove(&self, user_id: UserId, by: Option<UserId>) -> Result<(), QuizError> {
        self.access
            .set_approval(user_id, false, by, self.clock.now())
            .await?;
        info!(%user_id, changed_by = ?by, "quiz approval revoked");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `QuizError::Storage` on persistence failures.
    pub async fn approved_user_ids(&self) -> Result<Vec<UserId>, QuizError> {
        Ok(self.access.approved_user_ids().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use quiz_core::time::{fixed_clock, fixed_now};
    use storage::repository::InMemoryRepository;

    fn settings(mode: SecurityMode) -> QuizSettings {
        QuizSettings {
            security_mode: mode,
            ..QuizSettings::default()
        }
    }

    #[tokio::test]
    async fn manual_mode_follows_approval() {
        let service = AccessService::new(fixed_clock(), Arc::new(InMemoryRepository::new()));
        let user = UserId::new(4);
        let manual = settings(SecurityMode::Manual);

        let err = service.check(&manual, user, fixed_now()).await.unwrap_err();
        assert!(matches!(err, QuizError::ApprovalRequired { .. }));

        service.approve(user, Some(UserId::new(1))).await.unwrap();
        service.check(&manual, user, fixed_now()).await.unwrap();
        assert_eq!(service.approved_user_ids().await.unwrap(), vec![user]);

        service.unapprove(user, None).await.unwrap();
        assert!(service.check(&manual, user, fixed_now()).await.is_err());
    }

    #[tokio::test]
    async fn cooldown_counts_from_first_attempt() {
        let service = AccessService::new(fixed_clock(), Arc::new(InMemoryRepository::new()));
        let user = UserId::new(9);
        let cooldown = settings(SecurityMode::Cooldown);
        let first = fixed_now();

        let err = service.check(&cooldown, user, first).await.unwrap_err();
        match err {
            QuizError::CooldownActive { wait_seconds, .. } => {
                assert_eq!(wait_seconds, 24 * 3600);
            }
            other => panic!("unexpected {other:?}"),
        }

        let later = first + Duration::hours(10);
        match service.check(&cooldown, user, later).await.unwrap_err() {
            QuizError::CooldownActive { wait_seconds, .. } => {
                assert_eq!(wait_seconds, 14 * 3600);
            }
            other => panic!("unexpected {other:?}"),
        }

        service
            .check(&cooldown, user, first + Duration::hours(24))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn open_mode_touches_nothing() {
        let repo = InMemoryRepository::new();
        let service = AccessService::new(fixed_clock(), Arc::new(repo.clone()));
        service
            .check(&settings(SecurityMode::Open), UserId::new(2), fixed_now())
            .await
            .unwrap();

        let registered = repo
            .registered_at_or_insert(UserId::new(2), fixed_now() + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(registered, fixed_now() + Duration::hours(1));
    }
}
