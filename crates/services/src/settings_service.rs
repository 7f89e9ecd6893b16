use std::sync::Arc;

use tracing::info;

use quiz_core::model::{QuizSettings, SettingEntry};
use storage::repository::SettingsRepository;

use crate::error::QuizError;

/// Reads and writes runtime quiz settings.
#[derive(Clone)]
pub struct SettingsService {
    settings: Arc<dyn SettingsRepository>,
}

impl SettingsService {
    #[must_use]
    pub fn new(settings: Arc<dyn SettingsRepository>) -> Self {
        Self { settings }
    }

    /// Snapshot of the current settings with defaults applied.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Storage` if settings cannot be read.
    pub async fn load(&self) -> Result<QuizSettings, QuizError> {
        let entries = self.settings.setting_entries().await?;
        Ok(QuizSettings::from_entries(&entries))
    }

    /// Raw stored entries, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Storage` if settings cannot be read.
    pub async fn list(&self) -> Result<Vec<SettingEntry>, QuizError> {
        let mut entries = self.settings.setting_entries().await?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Validate and upsert one setting.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Settings` for invalid names or values and
    /// `QuizError::Storage` on persistence failures.
    pub async fn save(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<SettingEntry, QuizError> {
        let entry = SettingEntry::new(name, value).validated()?;
        self.settings.save_setting(&entry).await?;
        info!(name = %entry.name, value = %entry.value, "setting updated");
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{SecurityMode, SECURITY_MODE_KEY, TIME_LIMIT_KEY};
    use storage::repository::InMemoryRepository;

    #[tokio::test]
    async fn defaults_apply_until_saved() {
        let service = SettingsService::new(Arc::new(InMemoryRepository::new()));
        assert_eq!(service.load().await.unwrap(), QuizSettings::default());

        service.save(SECURITY_MODE_KEY, "open").await.unwrap();
        service.save(TIME_LIMIT_KEY, "300").await.unwrap();

        let loaded = service.load().await.unwrap();
        assert_eq!(loaded.security_mode, SecurityMode::Open);
        assert_eq!(loaded.time_limit_secs, 300);
        assert_eq!(service.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn invalid_values_are_not_stored() {
        let service = SettingsService::new(Arc::new(InMemoryRepository::new()));
        let err = service.save(TIME_LIMIT_KEY, "-5").await.unwrap_err();
        assert!(matches!(err, QuizError::Settings(_)));
        assert!(service.list().await.unwrap().is_empty());
    }
}
