use chrono::{DateTime, Utc};
use quiz_core::model::{
    CaseId, GroupId, ParameterId, PersistedSession, QuestionId, QuizSession, SessionId, Test,
    TestBinding, TestId, UserId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

/// Map a write failure, reporting unique and foreign key violations distinctly.
pub(crate) fn write_err(e: sqlx::Error) -> StorageError {
    if let Some(db) = e.as_database_error() {
        if db.is_unique_violation() {
            return StorageError::Conflict;
        }
        if db.is_foreign_key_violation() {
            return StorageError::NotFound;
        }
    }
    conn(e)
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn session_id_from_i64(v: i64) -> Result<SessionId, StorageError> {
    Ok(SessionId::new(i64_to_u64("session_id", v)?))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn group_id_from_i64(v: i64) -> Result<GroupId, StorageError> {
    Ok(GroupId::new(i64_to_u64("group_id", v)?))
}

pub(crate) fn test_id_from_i64(v: i64) -> Result<TestId, StorageError> {
    Ok(TestId::new(i64_to_u64("test_id", v)?))
}

pub(crate) fn case_id_from_i64(v: i64) -> Result<CaseId, StorageError> {
    Ok(CaseId::new(i64_to_u64("case_id", v)?))
}

pub(crate) fn parameter_id_from_i64(v: i64) -> Result<ParameterId, StorageError> {
    Ok(ParameterId::new(i64_to_u64("parameter_id", v)?))
}

/// `group_order` is stored as a JSON array of question IDs.
pub(crate) fn encode_order(order: &[QuestionId]) -> Result<String, StorageError> {
    serde_json::to_string(order).map_err(ser)
}

pub(crate) fn decode_order(raw: &str) -> Result<Vec<QuestionId>, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

pub(crate) const SESSION_COLUMNS: &str = "id, user_id, mode, status, screen_size, \
     current_question, current_group, group_order, test_id, test_code, \
     created_at, updated_at, finished_at, question_requested_at";

pub(crate) fn map_session_row(row: &SqliteRow) -> Result<QuizSession, StorageError> {
    let mode: String = row.try_get("mode").map_err(ser)?;
    let status: String = row.try_get("status").map_err(ser)?;
    let order_raw: String = row.try_get("group_order").map_err(ser)?;

    let test_id: Option<i64> = row.try_get("test_id").map_err(ser)?;
    let test_code: Option<String> = row.try_get("test_code").map_err(ser)?;
    let test = match (test_id, test_code) {
        (Some(id), code) => Some(TestBinding {
            test_id: test_id_from_i64(id)?,
            code: code.unwrap_or_default(),
        }),
        (None, _) => None,
    };

    QuizSession::from_persisted(PersistedSession {
        id: session_id_from_i64(row.try_get("id").map_err(ser)?)?,
        user_id: user_id_from_i64(row.try_get("user_id").map_err(ser)?)?,
        mode: mode.parse().map_err(ser)?,
        status: status.parse().map_err(ser)?,
        screen_size: row.try_get("screen_size").map_err(ser)?,
        current_question: QuestionId::from_wire(row.try_get("current_question").map_err(ser)?),
        current_group: GroupId::from_wire(row.try_get("current_group").map_err(ser)?),
        group_order: decode_order(&order_raw)?,
        test,
        created_at: row.try_get("created_at").map_err(ser)?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
        finished_at: row.try_get("finished_at").map_err(ser)?,
        question_requested_at: row.try_get("question_requested_at").map_err(ser)?,
    })
    .map_err(ser)
}

pub(crate) fn map_test_row(row: &SqliteRow) -> Result<Test, StorageError> {
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(ser)?;
    Ok(Test {
        id: test_id_from_i64(row.try_get("id").map_err(ser)?)?,
        code: row.try_get("code").map_err(ser)?,
        name: row.try_get("name").map_err(ser)?,
        created_by: user_id_from_i64(row.try_get("created_by").map_err(ser)?)?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_is_stored_as_json_array() {
        let order = vec![QuestionId::new(12), QuestionId::new(11), QuestionId::new(13)];
        let raw = encode_order(&order).unwrap();
        assert_eq!(raw, "[12,11,13]");
        assert_eq!(decode_order(&raw).unwrap(), order);
    }

    #[test]
    fn negative_ids_are_rejected() {
        assert!(session_id_from_i64(-4).is_err());
        assert!(matches!(
            user_id_from_i64(-1),
            Err(StorageError::Serialization(_))
        ));
    }
}
