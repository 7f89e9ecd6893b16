use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS parameters (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            reference_values TEXT NOT NULL DEFAULT '',
            param_order INTEGER NOT NULL DEFAULT 0
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS cases (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE,
            gender TEXT NOT NULL DEFAULT '',
            age1 INTEGER NOT NULL,
            age2 INTEGER NOT NULL,
            age3 INTEGER NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS case_parameters (
            case_id INTEGER NOT NULL,
            parameter_id INTEGER NOT NULL,
            value1 REAL NOT NULL,
            value2 REAL NOT NULL,
            value3 REAL,
            PRIMARY KEY (case_id, parameter_id),
            FOREIGN KEY (case_id) REFERENCES cases(id) ON DELETE CASCADE,
            FOREIGN KEY (parameter_id) REFERENCES parameters(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS questions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            question TEXT NOT NULL,
            prediction_age INTEGER NOT NULL,
            case_id INTEGER NOT NULL,
            group_id INTEGER NOT NULL CHECK (group_id > 0),
            FOREIGN KEY (case_id) REFERENCES cases(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS question_options (
            question_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            option_text TEXT NOT NULL,
            is_correct INTEGER NOT NULL DEFAULT 0 CHECK (is_correct IN (0, 1)),
            PRIMARY KEY (question_id, position),
            FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS tests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            created_by INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS test_questions (
            test_id INTEGER NOT NULL,
            question_id INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY (test_id, question_id),
            FOREIGN KEY (test_id) REFERENCES tests(id) ON DELETE CASCADE,
            FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS quiz_sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            mode TEXT NOT NULL,
            status TEXT NOT NULL,
            screen_size TEXT NOT NULL DEFAULT '',
            current_question INTEGER NOT NULL DEFAULT -1,
            current_group INTEGER NOT NULL DEFAULT 0,
            group_order TEXT NOT NULL DEFAULT '[]',
            test_id INTEGER,
            test_code TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            finished_at TEXT,
            question_requested_at TEXT,
            FOREIGN KEY (test_id) REFERENCES tests(id) ON DELETE SET NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS settings (
            name TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS quiz_user_access (
            user_id INTEGER PRIMARY KEY,
            approved INTEGER NOT NULL DEFAULT 0 CHECK (approved IN (0, 1)),
            changed_by INTEGER,
            updated_at TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS quiz_user_registry (
            user_id INTEGER PRIMARY KEY,
            registered_at TEXT NOT NULL
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_questions_group
            ON questions(group_id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_test_questions_order
            ON test_questions(test_id, sort_order);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_quiz_sessions_user_created
            ON quiz_sessions(user_id, created_at, id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_quiz_sessions_test
            ON quiz_sessions(test_id, created_at);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_quiz_sessions_status
            ON quiz_sessions(status);
    ",
];

const SCHEMA_V2: &[&str] = &[r"
        CREATE TABLE IF NOT EXISTS question_difficulty_votes (
            question_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            difficulty TEXT NOT NULL CHECK (difficulty IN ('easy', 'hard')),
            created_at TEXT NOT NULL,
            PRIMARY KEY (question_id, user_id),
            FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
        );
    "];

/// Runs pending schema migrations, one transaction per version.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: content, tests, sessions, settings and access tables.
    // Version 2: difficulty votes.
    for (version, statements) in [(1_i64, SCHEMA_V1), (2, SCHEMA_V2)] {
        if is_applied(pool, version).await? {
            continue;
        }
        let mut tx = pool.begin().await?;

        for statement in statements {
            sqlx::query(*statement).execute(&mut *tx).await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(version)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
