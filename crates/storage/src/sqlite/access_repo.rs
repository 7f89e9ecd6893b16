use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_core::model::UserId;

use super::SqliteRepository;
use super::mapping::{conn, id_to_i64, user_id_from_i64};
use crate::repository::{AccessRepository, StorageError};

#[async_trait]
impl AccessRepository for SqliteRepository {
    async fn is_user_approved(&self, user_id: UserId) -> Result<bool, StorageError> {
        let approved: Option<bool> =
            sqlx::query_scalar("SELECT approved FROM quiz_user_access WHERE user_id = ?1")
                .bind(id_to_i64("user_id", user_id.value())?)
                .fetch_optional(&self.pool)
                .await
                .map_err(conn)?;
        Ok(approved.unwrap_or(false))
    }

    async fn set_approval(
        &self,
        user_id: UserId,
        approved: bool,
        changed_by: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let changed_by = changed_by
            .map(|u| id_to_i64("user_id", u.value()))
            .transpose()?;

        sqlx::query(
            r"
            INSERT INTO quiz_user_access (user_id, approved, changed_by, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id) DO UPDATE SET
                approved = excluded.approved,
                changed_by = excluded.changed_by,
                updated_at = excluded.updated_at
            ",
        )
        .bind(id_to_i64("user_id", user_id.value())?)
        .bind(approved)
        .bind(changed_by)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn approved_user_ids(&self) -> Result<Vec<UserId>, StorageError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT user_id FROM quiz_user_access WHERE approved = 1 ORDER BY user_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        ids.into_iter().map(user_id_from_i64).collect()
    }

    async fn registered_at_or_insert(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, StorageError> {
        let raw_id = id_to_i64("user_id", user_id.value())?;

        // Insert-if-absent keeps the first writer's timestamp under races.
        sqlx::query(
            r"
            INSERT INTO quiz_user_registry (user_id, registered_at)
            VALUES (?1, ?2)
            ON CONFLICT(user_id) DO NOTHING
            ",
        )
        .bind(raw_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        sqlx::query_scalar("SELECT registered_at FROM quiz_user_registry WHERE user_id = ?1")
            .bind(raw_id)
            .fetch_one(&self.pool)
            .await
            .map_err(conn)
    }
}
