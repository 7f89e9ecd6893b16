use async_trait::async_trait;
use quiz_core::model::SettingEntry;
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, ser};
use crate::repository::{SettingsRepository, StorageError};

#[async_trait]
impl SettingsRepository for SqliteRepository {
    async fn setting_entries(&self) -> Result<Vec<SettingEntry>, StorageError> {
        let rows = sqlx::query("SELECT name, value FROM settings ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter()
            .map(|row| {
                Ok(SettingEntry::new(
                    row.try_get::<String, _>("name").map_err(ser)?,
                    row.try_get::<String, _>("value").map_err(ser)?,
                ))
            })
            .collect()
    }

    async fn save_setting(&self, entry: &SettingEntry) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO settings (name, value)
            VALUES (?1, ?2)
            ON CONFLICT(name) DO UPDATE SET value = excluded.value
            ",
        )
        .bind(&entry.name)
        .bind(&entry.value)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }
}
