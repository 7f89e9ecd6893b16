use async_trait::async_trait;
use quiz_core::model::{QuestionId, Test, TestId, UserId, ValidatedTest};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    conn, id_to_i64, map_test_row, question_id_from_i64, ser, test_id_from_i64, write_err,
};
use crate::repository::{StorageError, TestRepository};

#[async_trait]
impl TestRepository for SqliteRepository {
    async fn create_test(&self, test: &ValidatedTest) -> Result<Test, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let res = sqlx::query(
            r"
            INSERT INTO tests (code, name, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(test.code.as_str())
        .bind(&test.name)
        .bind(id_to_i64("user_id", test.created_by.value())?)
        .bind(test.created_at)
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;
        let test_id = res.last_insert_rowid();

        for (sort_order, question_id) in test.question_ids.iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO test_questions (test_id, question_id, sort_order)
                VALUES (?1, ?2, ?3)
                ",
            )
            .bind(test_id)
            .bind(id_to_i64("question_id", question_id.value())?)
            .bind(i64::try_from(sort_order).map_err(ser)?)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        }

        tx.commit().await.map_err(conn)?;

        Ok(Test {
            id: test_id_from_i64(test_id)?,
            code: test.code.as_str().to_string(),
            name: test.name.clone(),
            created_by: test.created_by,
            created_at: test.created_at,
        })
    }

    async fn test_by_code(&self, code: &str) -> Result<Option<Test>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, code, name, created_by, created_at
            FROM tests WHERE code = ?1
            ",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_test_row).transpose()
    }

    async fn ordered_question_ids(&self, test_id: TestId) -> Result<Vec<QuestionId>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT question_id FROM test_questions
            WHERE test_id = ?1
            ORDER BY sort_order ASC, question_id ASC
            ",
        )
        .bind(id_to_i64("test_id", test_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter()
            .map(|row| question_id_from_i64(row.try_get("question_id").map_err(ser)?))
            .collect()
    }

    async fn tests_by_owner(&self, owner: UserId) -> Result<Vec<Test>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, code, name, created_by, created_at
            FROM tests
            WHERE created_by = ?1
            ORDER BY created_at DESC, id DESC
            ",
        )
        .bind(id_to_i64("user_id", owner.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_test_row).collect()
    }
}
