use std::env;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use quiz_core::model::{AnswerRecord, SessionId};

use super::{SessionCreated, StatsReporter};
use crate::error::StatsError;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

enum Job {
    Created(SessionCreated),
    Finished(SessionId),
    Flush(oneshot::Sender<()>),
}

/// Decouples lifecycle notifications from the request that triggers them.
///
/// Created and finished events go through a bounded queue drained by one
/// worker task: at most once, never retried, dropped when the queue is full.
/// Answers are reported inline because recording them is the point of the call.
#[derive(Clone)]
pub struct StatsDispatcher {
    reporter: Arc<dyn StatsReporter>,
    queue: mpsc::Sender<Job>,
}

impl StatsDispatcher {
    /// Start the worker on the current tokio runtime.
    #[must_use]
    pub fn spawn(reporter: Arc<dyn StatsReporter>, capacity: usize) -> Self {
        let (queue, mut jobs) = mpsc::channel::<Job>(capacity.max(1));
        let worker_reporter = Arc::clone(&reporter);

        tokio::spawn(async move {
            while let Some(job) = jobs.recv().await {
                match job {
                    Job::Created(event) => {
                        if let Err(err) = worker_reporter.session_created(&event).await {
                            warn!(
                                session_id = %event.session_id,
                                error = %err,
                                "failed to report session creation"
                            );
                        }
                    }
                    Job::Finished(session_id) => {
                        if let Err(err) = worker_reporter.session_finished(session_id).await {
                            warn!(%session_id, error = %err, "failed to report session finish");
                        }
                    }
                    Job::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("stats worker stopped");
        });

        Self { reporter, queue }
    }

    /// Capacity from `QUIZ_STATS_QUEUE`, falling back to the default.
    #[must_use]
    pub fn capacity_from_env() -> usize {
        env::var("QUIZ_STATS_QUEUE")
            .ok()
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn notify_session_created(&self, event: SessionCreated) {
        let session_id = event.session_id;
        self.enqueue(Job::Created(event), session_id);
    }

    pub fn notify_session_finished(&self, session_id: SessionId) {
        self.enqueue(Job::Finished(session_id), session_id);
    }

    /// Report one graded answer and wait for the sink to accept it.
    ///
    /// # Errors
    ///
    /// Returns `StatsError` from the underlying reporter.
    pub async fn record_answer(
        &self,
        session_id: SessionId,
        record: &AnswerRecord,
    ) -> Result<(), StatsError> {
        self.reporter.answer_recorded(session_id, record).await
    }

    /// Wait until every event queued before this call has been handled.
    ///
    /// # Errors
    ///
    /// Returns `StatsError::QueueClosed` if the worker is gone.
    pub async fn flush(&self) -> Result<(), StatsError> {
        let (done, wait) = oneshot::channel();
        self.queue
            .send(Job::Flush(done))
            .await
            .map_err(|_| StatsError::QueueClosed)?;
        wait.await.map_err(|_| StatsError::QueueClosed)
    }

    fn enqueue(&self, job: Job, session_id: SessionId) {
        match self.queue.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%session_id, error = %StatsError::QueueFull, "stats event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(%session_id, error = %StatsError::QueueClosed, "stats event dropped");
            }
        }
    }
}
