use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::access_service::AccessService;
use crate::difficulty_service::DifficultyService;
use crate::error::AppServicesError;
use crate::sessions::{QuizEngine, SessionQueries};
use crate::settings_service::SettingsService;
use crate::stats::{HttpStatsReporter, StatsDispatcher, StatsReporter};
use crate::test_service::TestService;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct QuizServices {
    engine: Arc<QuizEngine>,
    queries: Arc<SessionQueries>,
    access: Arc<AccessService>,
    settings: Arc<SettingsService>,
    tests: Arc<TestService>,
    difficulty: Arc<DifficultyService>,
    stats: StatsDispatcher,
}

impl QuizServices {
    /// Build services backed by `SQLite` storage, reporting stats over HTTP
    /// as configured by the environment.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        let reporter: Arc<dyn StatsReporter> = Arc::new(HttpStatsReporter::from_env());
        let stats = StatsDispatcher::spawn(reporter, StatsDispatcher::capacity_from_env());
        Ok(Self::from_storage(clock, &storage, stats))
    }

    /// Wire every service to `storage`.
    #[must_use]
    pub fn from_storage(clock: Clock, storage: &Storage, stats: StatsDispatcher) -> Self {
        Self {
            engine: Arc::new(QuizEngine::new(clock, storage, stats.clone())),
            queries: Arc::new(SessionQueries::new(clock, Arc::clone(&storage.sessions))),
            access: Arc::new(AccessService::new(clock, Arc::clone(&storage.access))),
            settings: Arc::new(SettingsService::new(Arc::clone(&storage.settings))),
            tests: Arc::new(TestService::new(
                clock,
                Arc::clone(&storage.tests),
                Arc::clone(&storage.sessions),
            )),
            difficulty: Arc::new(DifficultyService::new(
                clock,
                Arc::clone(&storage.difficulty),
            )),
            stats,
        }
    }

    #[must_use]
    pub fn engine(&self) -> Arc<QuizEngine> {
        Arc::clone(&self.engine)
    }

    #[must_use]
    pub fn queries(&self) -> Arc<SessionQueries> {
        Arc::clone(&self.queries)
    }

    #[must_use]
    pub fn access(&self) -> Arc<AccessService> {
        Arc::clone(&self.access)
    }

    #[must_use]
    pub fn settings(&self) -> Arc<SettingsService> {
        Arc::clone(&self.settings)
    }

    #[must_use]
    pub fn tests(&self) -> Arc<TestService> {
        Arc::clone(&self.tests)
    }

    #[must_use]
    pub fn difficulty(&self) -> Arc<DifficultyService> {
        Arc::clone(&self.difficulty)
    }

    #[must_use]
    pub fn stats(&self) -> &StatsDispatcher {
        &self.stats
    }
}
