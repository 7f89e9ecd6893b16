use std::env;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use quiz_core::model::{AnswerRecord, SessionId};

use super::{SessionCreated, StatsReporter};
use crate::error::StatsError;

const API_KEY_HEADER: &str = "X-Api-Key";

#[derive(Clone, Debug)]
pub struct StatsConfig {
    pub base_url: String,
    pub api_key: String,
}

impl StatsConfig {
    /// Read `QUIZ_STATS_URL` and `QUIZ_STATS_API_KEY`. Reporting is off without a URL.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("QUIZ_STATS_URL").ok()?;
        if base_url.trim().is_empty() {
            return None;
        }
        let api_key = env::var("QUIZ_STATS_API_KEY").unwrap_or_default();
        Some(Self { base_url, api_key })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Reports session events to the statistics service over HTTP.
#[derive(Clone)]
pub struct HttpStatsReporter {
    client: Client,
    config: Option<StatsConfig>,
}

impl HttpStatsReporter {
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(StatsConfig::from_env())
    }

    #[must_use]
    pub fn new(config: Option<StatsConfig>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.is_some()
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<(), StatsError> {
        let Some(config) = self.config.as_ref() else {
            debug!(path, "stats reporting disabled, dropping event");
            return Ok(());
        };

        let response = self
            .client
            .post(config.url(path))
            .header(API_KEY_HEADER, &config.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StatsError::HttpStatus(response.status()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct Empty {}

#[async_trait]
impl StatsReporter for HttpStatsReporter {
    async fn session_created(&self, event: &SessionCreated) -> Result<(), StatsError> {
        self.post("sessions/save", event).await
    }

    async fn answer_recorded(
        &self,
        session_id: SessionId,
        record: &AnswerRecord,
    ) -> Result<(), StatsError> {
        self.post(&format!("sessions/{session_id}/respond"), record)
            .await
    }

    async fn session_finished(&self, session_id: SessionId) -> Result<(), StatsError> {
        self.post(&format!("sessions/{session_id}/finish"), &Empty {})
            .await
    }
}
