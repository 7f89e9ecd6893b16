#![forbid(unsafe_code)]

pub mod access_service;
pub mod app_services;
pub mod difficulty_service;
pub mod error;
pub mod sessions;
pub mod settings_service;
pub mod stats;
pub mod test_service;

pub use quiz_core::Clock;

pub use access_service::AccessService;
pub use app_services::QuizServices;
pub use difficulty_service::DifficultyService;
pub use error::{AppServicesError, ErrorClass, QuizError, StatsError};
pub use sessions::{
    AnswerOutcome, AnswerSubmission, NextQuestion, QuizEngine, SessionListItem, SessionQueries,
    StartRequest, StartedSession,
};
pub use settings_service::SettingsService;
pub use stats::{
    HttpStatsReporter, RecordedEvent, RecordingStatsReporter, SessionCreated, StatsConfig,
    StatsDispatcher, StatsReporter,
};
pub use test_service::{TestProgress, TestService};
