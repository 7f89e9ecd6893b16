use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_core::model::{
    GroupId, NewQuizSession, QuestionId, QuizSession, SessionId, SessionStatus, TestId, UserId,
};

use super::SqliteRepository;
use super::mapping::{
    SESSION_COLUMNS, conn, encode_order, id_to_i64, map_session_row, session_id_from_i64,
    write_err,
};
use crate::repository::{SessionRepository, StorageError};

impl SqliteRepository {
    async fn fetch_sessions(
        &self,
        filter: &str,
        bind: i64,
    ) -> Result<Vec<QuizSession>, StorageError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM quiz_sessions WHERE {filter} \
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(bind)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            sessions.push(map_session_row(&row)?);
        }
        Ok(sessions)
    }
}

#[async_trait]
impl SessionRepository for SqliteRepository {
    async fn create_session(&self, session: &NewQuizSession) -> Result<QuizSession, StorageError> {
        let test_id = session
            .test
            .as_ref()
            .map(|t| id_to_i64("test_id", t.test_id.value()))
            .transpose()?;
        let test_code = session.test.as_ref().map(|t| t.code.clone());

        let res = sqlx::query(
            r"
            INSERT INTO quiz_sessions (
                user_id, mode, status, screen_size, current_question, current_group,
                group_order, test_id, test_code, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            ",
        )
        .bind(id_to_i64("user_id", session.user_id.value())?)
        .bind(session.mode.as_str())
        .bind(SessionStatus::NotStarted.as_str())
        .bind(&session.screen_size)
        .bind(QuestionId::to_wire(session.position.current_question()))
        .bind(GroupId::to_wire(session.position.current_group()))
        .bind(encode_order(session.position.group_order())?)
        .bind(test_id)
        .bind(test_code)
        .bind(session.created_at)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        let id = session_id_from_i64(res.last_insert_rowid())?;
        Ok(session.clone().assign_id(id))
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<QuizSession>, StorageError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM quiz_sessions WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_to_i64("session_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_session_row).transpose()
    }

    async fn update_session(&self, session: &QuizSession) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            UPDATE quiz_sessions SET
                status = ?2,
                current_question = ?3,
                current_group = ?4,
                group_order = ?5,
                updated_at = ?6,
                finished_at = ?7,
                question_requested_at = ?8
            WHERE id = ?1
            ",
        )
        .bind(id_to_i64("session_id", session.id().value())?)
        .bind(session.status().as_str())
        .bind(QuestionId::to_wire(session.current_question()))
        .bind(GroupId::to_wire(session.current_group()))
        .bind(encode_order(session.group_order())?)
        .bind(session.updated_at())
        .bind(session.finished_at())
        .bind(session.question_requested_at())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn last_session_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<QuizSession>, StorageError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM quiz_sessions WHERE user_id = ?1 \
             ORDER BY created_at DESC, id DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(id_to_i64("user_id", user_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_session_row).transpose()
    }

    async fn active_sessions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<QuizSession>, StorageError> {
        self.fetch_sessions(
            "user_id = ?1 AND status <> 'finished'",
            id_to_i64("user_id", user_id.value())?,
        )
        .await
    }

    async fn sessions_for_test(&self, test_id: TestId) -> Result<Vec<QuizSession>, StorageError> {
        self.fetch_sessions("test_id = ?1", id_to_i64("test_id", test_id.value())?)
            .await
    }

    async fn live_sessions(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<QuizSession>, StorageError> {
        // Timestamps are compared after decoding; stored text is not guaranteed
        // to sort chronologically.
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM quiz_sessions WHERE status <> 'finished' \
             ORDER BY id DESC"
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut live = Vec::new();
        for row in rows {
            let session = map_session_row(&row)?;
            if session.last_seen() >= since {
                live.push(session);
            }
        }
        live.sort_by(|a, b| {
            b.last_seen()
                .cmp(&a.last_seen())
                .then_with(|| b.id().cmp(&a.id()))
        });
        live.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(live)
    }
}
