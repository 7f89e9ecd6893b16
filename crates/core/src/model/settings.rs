use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const SECURITY_MODE_KEY: &str = "quiz_security_mode";
pub const COOLDOWN_HOURS_KEY: &str = "quiz_cooldown_hours";
pub const TIME_LIMIT_KEY: &str = "time_limit";

pub const DEFAULT_COOLDOWN_HOURS: u32 = 24;
/// Ten years.
pub const MAX_COOLDOWN_HOURS: u32 = 87_600;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("setting name is required")]
    EmptyName,

    #[error("time limit must be a positive integer, got {0:?}")]
    InvalidTimeLimit(String),

    #[error("cooldown hours must be an integer between 0 and 87600, got {0:?}")]
    InvalidCooldownHours(String),

    #[error("unknown security mode {0:?}")]
    InvalidSecurityMode(String),
}

/// Who may start a quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Anyone may start.
    Open,
    /// Only users an administrator approved.
    Manual,
    /// Anyone, once a waiting period after first contact has elapsed.
    #[default]
    Cooldown,
}

impl SecurityMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SecurityMode::Open => "open",
            SecurityMode::Manual => "manual",
            SecurityMode::Cooldown => "cooldown",
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityMode {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(SecurityMode::Open),
            "manual" => Ok(SecurityMode::Manual),
            "cooldown" => Ok(SecurityMode::Cooldown),
            _ => Err(SettingsError::InvalidSecurityMode(s.to_string())),
        }
    }
}

/// A raw `name = value` row of the settings table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingEntry {
    pub name: String,
    pub value: String,
}

impl SettingEntry {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Trim the entry and check known keys for well-formed values.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` for an empty name or a malformed value of a known key.
    pub fn validated(self) -> Result<Self, SettingsError> {
        let name = self.name.trim().to_string();
        let value = self.value.trim().to_string();
        if name.is_empty() {
            return Err(SettingsError::EmptyName);
        }

        match name.as_str() {
            TIME_LIMIT_KEY => match value.parse::<u32>() {
                Ok(v) if v > 0 => {}
                _ => return Err(SettingsError::InvalidTimeLimit(value)),
            },
            COOLDOWN_HOURS_KEY => {
                match value.parse::<u32>() {
                    Ok(v) if v <= MAX_COOLDOWN_HOURS => {}
                    _ => return Err(SettingsError::InvalidCooldownHours(value)),
                }
            }
            SECURITY_MODE_KEY => {
                value.parse::<SecurityMode>()?;
            }
            _ => {}
        }

        Ok(Self { name, value })
    }
}

/// Snapshot of runtime settings, read once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizSettings {
    pub security_mode: SecurityMode,
    pub cooldown_hours: u32,
    /// Seconds allowed for a limited-time session; `0` means no limit.
    pub time_limit_secs: u32,
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            security_mode: SecurityMode::default(),
            cooldown_hours: DEFAULT_COOLDOWN_HOURS,
            time_limit_secs: 0,
        }
    }
}

impl QuizSettings {
    /// Build a snapshot from raw rows; missing or unparsable values keep their defaults.
    #[must_use]
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a SettingEntry>) -> Self {
        let mut settings = Self::default();
        for entry in entries {
            let value = entry.value.trim();
            match entry.name.trim() {
                SECURITY_MODE_KEY => {
                    settings.security_mode = value.parse().unwrap_or_default();
                }
                COOLDOWN_HOURS_KEY => {
                    settings.cooldown_hours = value.parse().unwrap_or(DEFAULT_COOLDOWN_HOURS);
                }
                TIME_LIMIT_KEY => {
                    settings.time_limit_secs = value.parse().unwrap_or(0);
                }
                _ => {}
            }
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_table_is_empty() {
        let settings = QuizSettings::from_entries(&[]);
        assert_eq!(settings.security_mode, SecurityMode::Cooldown);
        assert_eq!(settings.cooldown_hours, 24);
        assert_eq!(settings.time_limit_secs, 0);
    }

    #[test]
    fn unparsable_values_fall_back() {
        let rows = vec![
            SettingEntry::new(SECURITY_MODE_KEY, "sometimes"),
            SettingEntry::new(COOLDOWN_HOURS_KEY, "soon"),
            SettingEntry::new(TIME_LIMIT_KEY, "600"),
            SettingEntry::new("theme", "dark"),
        ];
        let settings = QuizSettings::from_entries(&rows);
        assert_eq!(settings.security_mode, SecurityMode::Cooldown);
        assert_eq!(settings.cooldown_hours, 24);
        assert_eq!(settings.time_limit_secs, 600);
    }

    #[test]
    fn known_keys_are_validated_on_save() {
        assert_eq!(
            SettingEntry::new(TIME_LIMIT_KEY, "0").validated(),
            Err(SettingsError::InvalidTimeLimit("0".into()))
        );
        assert_eq!(
            SettingEntry::new(COOLDOWN_HOURS_KEY, "-1").validated(),
            Err(SettingsError::InvalidCooldownHours("-1".into()))
        );
        assert_eq!(
            SettingEntry::new(COOLDOWN_HOURS_KEY, "4294967295").validated(),
            Err(SettingsError::InvalidCooldownHours("4294967295".into()))
        );
        assert!(
            SettingEntry::new(COOLDOWN_HOURS_KEY, "87600")
                .validated()
                .is_ok()
        );
        assert!(matches!(
            SettingEntry::new(SECURITY_MODE_KEY, "strict").validated(),
            Err(SettingsError::InvalidSecurityMode(_))
        ));
        assert_eq!(
            SettingEntry::new("  ", "x").validated(),
            Err(SettingsError::EmptyName)
        );

        let ok = SettingEntry::new(" quiz_security_mode ", " Manual ")
            .validated()
            .unwrap();
        assert_eq!(ok.name, SECURITY_MODE_KEY);
        assert_eq!(ok.value, "Manual");
    }
}
