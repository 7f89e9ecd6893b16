use thiserror::Error;

use crate::access::AccessDenied;
use crate::model::{
    DifficultyError, InvalidScreenSize, ParseIdError, SessionStateError, SettingsError,
    TestDraftError,
};

/// Any error raised by the domain model.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    SessionState(#[from] SessionStateError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    TestDraft(#[from] TestDraftError),
    #[error(transparent)]
    ScreenSize(#[from] InvalidScreenSize),
    #[error(transparent)]
    ParseId(#[from] ParseIdError),
    #[error(transparent)]
    AccessDenied(#[from] AccessDenied),
    #[error(transparent)]
    Difficulty(#[from] DifficultyError),
}
