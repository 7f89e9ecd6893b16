use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::{QuizSettings, SecurityMode};
use crate::time::elapsed_secs;

/// What is known about a user when deciding whether they may start a quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStanding {
    /// Nothing was looked up; sufficient for open mode.
    Unchecked,
    /// Manual mode: whether an administrator approved the user.
    Approval { approved: bool },
    /// Cooldown mode: when the user was first seen.
    FirstSeen { registered_at: DateTime<Utc> },
}

/// Why a user may not start a quiz yet.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum AccessDenied {
    #[error("account requires manual approval by an administrator")]
    ApprovalRequired { mode: SecurityMode },

    #[error("please wait {wait_seconds}s before starting the quiz")]
    CooldownActive {
        mode: SecurityMode,
        cooldown_hours: u32,
        wait_seconds: u64,
        ready_at: DateTime<Utc>,
    },
}

/// Earliest time a user first seen at `registered_at` may start.
///
/// A cooldown reaching past the representable range never elapses.
#[must_use]
pub fn ready_at(registered_at: DateTime<Utc>, cooldown_hours: u32) -> DateTime<Utc> {
    registered_at
        .checked_add_signed(Duration::hours(i64::from(cooldown_hours)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Decide whether a session may start.
///
/// Pure function of the settings snapshot and the user's standing. A standing
/// that does not match the configured mode counts as not yet qualified.
///
/// # Errors
///
/// Returns `AccessDenied` when the configured mode rejects the user.
pub fn evaluate(
    settings: &QuizSettings,
    standing: UserStanding,
    now: DateTime<Utc>,
) -> Result<(), AccessDenied> {
    match settings.security_mode {
        SecurityMode::Open => Ok(()),
        SecurityMode::Manual => match standing {
            UserStanding::Approval { approved: true } => Ok(()),
            _ => Err(AccessDenied::ApprovalRequired {
                mode: SecurityMode::Manual,
            }),
        },
        SecurityMode::Cooldown => {
            let registered_at = match standing {
                UserStanding::FirstSeen { registered_at } => registered_at,
                _ => now,
            };
            let ready = ready_at(registered_at, settings.cooldown_hours);
            if now >= ready {
                return Ok(());
            }
            Err(AccessDenied::CooldownActive {
                mode: SecurityMode::Cooldown,
                cooldown_hours: settings.cooldown_hours,
                wait_seconds: elapsed_secs(now, ready),
                ready_at: ready,
            })
        }
    }
}
