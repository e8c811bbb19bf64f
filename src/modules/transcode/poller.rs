use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::model::{JobProgress, JobRef, RemoteStatus};
use super::source::StatusSource;
use crate::common::error::PollError;
use crate::config::settings::PollerConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(JobProgress),
    Failed(JobProgress),
    NotFound,
    /// Fetches kept failing (or failed in a way retrying cannot fix).
    ConnectionLost(PollError),
}

/// Serializes callback delivery against cancellation.
///
/// Callbacks run while the lock is held, so once `close` returns no callback
/// is running and none will start.
struct Gate {
    open: Mutex<bool>,
}

impl Gate {
    fn new() -> Self {
        Self {
            open: Mutex::new(true),
        }
    }

    fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if !*open {
            return None;
        }
        Some(f())
    }

    fn finish(&self, f: impl FnOnce()) {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if *open {
            f();
            *open = false;
        }
    }

    fn close(&self) -> bool {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *open, false)
    }

    fn is_open(&self) -> bool {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns one running poll loop. Dropping the handle cancels the loop.
///
/// Callbacks must not cancel their own handle; they run under the gate lock.
pub struct PollHandle {
    job: JobRef,
    gate: Arc<Gate>,
    token: CancellationToken,
}

impl PollHandle {
    pub fn job(&self) -> &JobRef {
        &self.job
    }

    pub fn is_active(&self) -> bool {
        self.gate.is_open()
    }

    pub(crate) fn cancellation(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stops the loop. No callback fires after this returns. Idempotent.
    pub fn cancel(&self) {
        if self.gate.close() {
            debug!("Poller for {} cancelled", self.job);
        }
        self.token.cancel();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for PollHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollHandle")
            .field("job", &self.job)
            .field("active", &self.is_active())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JobStatusPoller {
    config: PollerConfig,
}

impl JobStatusPoller {
    pub fn new(config: PollerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Spawns the poll loop on the current tokio runtime.
    ///
    /// The first fetch happens immediately. Every payload goes to `on_update`
    /// in fetch order; `on_terminal` fires exactly once unless the handle is
    /// cancelled first.
    pub fn start<U, T>(
        &self,
        job: JobRef,
        source: Arc<dyn StatusSource>,
        on_update: U,
        on_terminal: T,
    ) -> PollHandle
    where
        U: FnMut(&JobProgress) + Send + 'static,
        T: FnOnce(PollOutcome) + Send + 'static,
    {
        let gate = Arc::new(Gate::new());
        let token = CancellationToken::new();

        let task = PollTask {
            job: job.clone(),
            config: self.config,
            source,
            gate: gate.clone(),
            token: token.clone(),
        };
        tokio::spawn(task.run(on_update, on_terminal));

        PollHandle { job, gate, token }
    }
}

struct PollTask {
    job: JobRef,
    config: PollerConfig,
    source: Arc<dyn StatusSource>,
    gate: Arc<Gate>,
    token: CancellationToken,
}

impl PollTask {
    async fn run<U, T>(self, mut on_update: U, on_terminal: T)
    where
        U: FnMut(&JobProgress) + Send,
        T: FnOnce(PollOutcome) + Send,
    {
        info!("🔄 Polling {} every {:?}", self.job, self.config.interval());

        match self.poll_until_terminal(&mut on_update).await {
            Some(outcome) => {
                debug!("Poller for {} finished: {:?}", self.job, outcome);
                self.gate.finish(|| on_terminal(outcome));
            }
            None => debug!("Poll loop for {} exited after cancellation", self.job),
        }
    }

    async fn poll_until_terminal<U>(&self, on_update: &mut U) -> Option<PollOutcome>
    where
        U: FnMut(&JobProgress) + Send,
    {
        let mut failures = 0u32;

        loop {
            let fetched = tokio::select! {
                biased;
                _ = self.token.cancelled() => return None,
                res = self.source.fetch_status(&self.job) => res,
            };

            let delay = match fetched {
                Ok(progress) => {
                    failures = 0;
                    self.gate.run(|| on_update(&progress))?;
                    match progress.status {
                        RemoteStatus::Completed => return Some(PollOutcome::Completed(progress)),
                        RemoteStatus::Failed => return Some(PollOutcome::Failed(progress)),
                        RemoteStatus::Processing | RemoteStatus::Transcoding => {
                            self.config.interval()
                        }
                    }
                }
                Err(PollError::NotFound) => {
                    warn!("Job {} not found on the server", self.job);
                    return Some(PollOutcome::NotFound);
                }
                Err(err) if err.is_transient() && failures < self.config.retry.max_retries => {
                    failures += 1;
                    let delay = self.config.retry.backoff_with_jitter(failures);
                    warn!(
                        "Fetching status of {} failed ({}), retry {}/{} in {:?}",
                        self.job, err, failures, self.config.retry.max_retries, delay
                    );
                    delay
                }
                Err(err) => {
                    error!("❌ Lost track of job {}: {}", self.job, err);
                    return Some(PollOutcome::ConnectionLost(err));
                }
            };

            tokio::select! {
                biased;
                _ = self.token.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
