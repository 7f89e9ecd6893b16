use async_trait::async_trait;
use quiz_core::model::{Difficulty, DifficultySummary, DifficultyVote, QuestionId, UserId};
use sqlx::{QueryBuilder, Row, Sqlite};

use super::SqliteRepository;
use super::mapping::{conn, id_to_i64, question_id_from_i64, ser, user_id_from_i64, write_err};
use crate::repository::{DifficultyRepository, StorageError};

fn count(raw: i64) -> Result<u32, StorageError> {
    u32::try_from(raw).map_err(|_| StorageError::Serialization("vote count overflow".into()))
}

#[async_trait]
impl DifficultyRepository for SqliteRepository {
    async fn insert_vote(&self, vote: &DifficultyVote) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO question_difficulty_votes (question_id, user_id, difficulty, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(id_to_i64("question_id", vote.question_id.value())?)
        .bind(id_to_i64("user_id", vote.user_id.value())?)
        .bind(vote.difficulty.as_str())
        .bind(vote.created_at)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;
        Ok(())
    }

    async fn vote_of(
        &self,
        question_id: QuestionId,
        user_id: UserId,
    ) -> Result<Option<DifficultyVote>, StorageError> {
        let Some(row) = sqlx::query(
            r"
            SELECT question_id, user_id, difficulty, created_at
            FROM question_difficulty_votes
            WHERE question_id = ?1 AND user_id = ?2
            ",
        )
        .bind(id_to_i64("question_id", question_id.value())?)
        .bind(id_to_i64("user_id", user_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        else {
            return Ok(None);
        };

        let difficulty: String = row.try_get("difficulty").map_err(ser)?;
        Ok(Some(DifficultyVote {
            question_id: question_id_from_i64(row.try_get("question_id").map_err(ser)?)?,
            user_id: user_id_from_i64(row.try_get("user_id").map_err(ser)?)?,
            difficulty: difficulty.parse::<Difficulty>().map_err(ser)?,
            created_at: row.try_get("created_at").map_err(ser)?,
        }))
    }

    async fn vote_summaries(
        &self,
        question_ids: &[QuestionId],
    ) -> Result<Vec<DifficultySummary>, StorageError> {
        if question_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            r"
            SELECT question_id,
                   SUM(CASE WHEN difficulty = 'hard' THEN 1 ELSE 0 END) AS hard_votes,
                   SUM(CASE WHEN difficulty = 'easy' THEN 1 ELSE 0 END) AS easy_votes
            FROM question_difficulty_votes
            WHERE question_id IN (",
        );
        let mut separated = query.separated(", ");
        for id in question_ids {
            separated.push_bind(id_to_i64("question_id", id.value())?);
        }
        separated.push_unseparated(") GROUP BY question_id ORDER BY question_id");

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter()
            .map(|row| {
                Ok(DifficultySummary::from_counts(
                    question_id_from_i64(row.try_get("question_id").map_err(ser)?)?,
                    count(row.try_get("hard_votes").map_err(ser)?)?,
                    count(row.try_get("easy_votes").map_err(ser)?)?,
                ))
            })
            .collect()
    }
}
