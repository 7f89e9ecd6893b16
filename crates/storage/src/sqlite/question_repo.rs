use async_trait::async_trait;
use quiz_core::model::{
    Case, CaseId, CaseOutcome, GroupId, NewCase, NewParameter, NewQuestion, Parameter,
    ParameterId, ParameterValue, Question, QuestionId,
};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    case_id_from_i64, conn, group_id_from_i64, id_to_i64, parameter_id_from_i64,
    question_id_from_i64, ser, write_err,
};
use crate::repository::{QuestionRepository, StorageError, ensure_assigned_group};

impl SqliteRepository {
    async fn load_case(&self, case_id: CaseId) -> Result<Option<Case>, StorageError> {
        let raw_id = id_to_i64("case_id", case_id.value())?;
        let Some(row) = sqlx::query(
            r"
            SELECT id, code, gender, age1, age2, age3
            FROM cases WHERE id = ?1
            ",
        )
        .bind(raw_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        else {
            return Ok(None);
        };

        let value_rows = sqlx::query(
            r"
            SELECT p.id, p.name, p.description, p.reference_values, p.param_order,
                   cp.value1, cp.value2, cp.value3
            FROM case_parameters cp
            JOIN parameters p ON p.id = cp.parameter_id
            WHERE cp.case_id = ?1
            ORDER BY p.param_order ASC, p.id ASC
            ",
        )
        .bind(raw_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut parameters = Vec::with_capacity(value_rows.len());
        let mut parameter_values = Vec::with_capacity(value_rows.len());
        for vr in value_rows {
            let id = parameter_id_from_i64(vr.try_get("id").map_err(ser)?)?;
            parameters.push(Parameter {
                id,
                name: vr.try_get("name").map_err(ser)?,
                description: vr.try_get("description").map_err(ser)?,
                reference_values: vr.try_get("reference_values").map_err(ser)?,
                order: vr.try_get("param_order").map_err(ser)?,
            });
            parameter_values.push(ParameterValue {
                parameter_id: id,
                value1: vr.try_get("value1").map_err(ser)?,
                value2: vr.try_get("value2").map_err(ser)?,
                value3: vr.try_get("value3").map_err(ser)?,
            });
        }

        Ok(Some(Case {
            id: case_id_from_i64(row.try_get("id").map_err(ser)?)?,
            code: row.try_get("code").map_err(ser)?,
            gender: row.try_get("gender").map_err(ser)?,
            age1: row.try_get("age1").map_err(ser)?,
            age2: row.try_get("age2").map_err(ser)?,
            age3: row.try_get("age3").map_err(ser)?,
            parameters,
            parameter_values,
        }))
    }
}

#[async_trait]
impl QuestionRepository for SqliteRepository {
    async fn random_group_question_ids(
        &self,
        group: GroupId,
    ) -> Result<Vec<QuestionId>, StorageError> {
        let rows = sqlx::query("SELECT id FROM questions WHERE group_id = ?1 ORDER BY RANDOM()")
            .bind(id_to_i64("group_id", group.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter()
            .map(|row| question_id_from_i64(row.try_get("id").map_err(ser)?))
            .collect()
    }

    async fn next_group_id(
        &self,
        excluding: Option<GroupId>,
    ) -> Result<Option<GroupId>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT group_id FROM (SELECT DISTINCT group_id FROM questions WHERE group_id <> ?1)
            ORDER BY RANDOM()
            LIMIT 1
            ",
        )
        .bind(GroupId::to_wire(excluding))
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.map(|r| group_id_from_i64(r.try_get("group_id").map_err(ser)?))
            .transpose()
    }

    async fn question_by_id(&self, id: QuestionId) -> Result<Option<Question>, StorageError> {
        let raw_id = id_to_i64("question_id", id.value())?;
        let Some(row) = sqlx::query(
            r"
            SELECT id, question, prediction_age, case_id, group_id
            FROM questions WHERE id = ?1
            ",
        )
        .bind(raw_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        else {
            return Ok(None);
        };

        let options: Vec<String> = sqlx::query_scalar(
            "SELECT option_text FROM question_options WHERE question_id = ?1 ORDER BY position",
        )
        .bind(raw_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let case_id = case_id_from_i64(row.try_get("case_id").map_err(ser)?)?;
        let case = self.load_case(case_id).await?.ok_or_else(|| {
            StorageError::Serialization(format!("question {id} references missing case {case_id}"))
        })?;

        Ok(Some(Question {
            id,
            question: row.try_get("question").map_err(ser)?,
            options,
            prediction_age: row.try_get("prediction_age").map_err(ser)?,
            case,
            group: GroupId::from_wire(row.try_get("group_id").map_err(ser)?),
        }))
    }

    async fn correct_option(&self, id: QuestionId) -> Result<Option<String>, StorageError> {
        sqlx::query_scalar(
            r"
            SELECT option_text FROM question_options
            WHERE question_id = ?1 AND is_correct = 1
            ORDER BY position
            LIMIT 1
            ",
        )
        .bind(id_to_i64("question_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)
    }

    async fn count_questions(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions")
            .fetch_one(&self.pool)
            .await
            .map_err(conn)?;
        u64::try_from(count).map_err(ser)
    }

    async fn case_outcome(&self, case_id: CaseId) -> Result<Option<CaseOutcome>, StorageError> {
        Ok(self.load_case(case_id).await?.map(|c| c.outcome()))
    }

    async fn insert_parameter(&self, parameter: &NewParameter) -> Result<ParameterId, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO parameters (name, description, reference_values, param_order)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(&parameter.name)
        .bind(&parameter.description)
        .bind(&parameter.reference_values)
        .bind(parameter.order)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        parameter_id_from_i64(res.last_insert_rowid())
    }

    async fn insert_case(&self, case: &NewCase) -> Result<CaseId, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let res = sqlx::query(
            r"
            INSERT INTO cases (code, gender, age1, age2, age3)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(&case.code)
        .bind(&case.gender)
        .bind(case.age1)
        .bind(case.age2)
        .bind(case.age3)
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;
        let case_id = res.last_insert_rowid();

        for value in &case.parameter_values {
            sqlx::query(
                r"
                INSERT INTO case_parameters (case_id, parameter_id, value1, value2, value3)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )
            .bind(case_id)
            .bind(id_to_i64("parameter_id", value.parameter_id.value())?)
            .bind(value.value1)
            .bind(value.value2)
            .bind(value.value3)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        }

        tx.commit().await.map_err(conn)?;
        case_id_from_i64(case_id)
    }

    async fn insert_question(&self, question: &NewQuestion) -> Result<QuestionId, StorageError> {
        ensure_assigned_group(question.group)?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let res = sqlx::query(
            r"
            INSERT INTO questions (question, prediction_age, case_id, group_id)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(&question.question)
        .bind(question.prediction_age)
        .bind(id_to_i64("case_id", question.case_id.value())?)
        .bind(id_to_i64("group_id", question.group.value())?)
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;
        let question_id = res.last_insert_rowid();

        for (position, option) in question.options.iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO question_options (question_id, position, option_text, is_correct)
                VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(question_id)
            .bind(i64::try_from(position).map_err(ser)?)
            .bind(option)
            .bind(i64::from(*option == question.correct))
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        }

        tx.commit().await.map_err(conn)?;
        question_id_from_i64(question_id)
    }
}
