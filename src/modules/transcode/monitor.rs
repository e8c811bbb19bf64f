use std::sync::{Arc, Mutex, PoisonError};

use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{info, warn};

use super::model::{ContentType, FailureKind, JobProgress, JobRef, JobStatus, MonitorState, TaskId};
use super::poller::{JobStatusPoller, PollHandle, PollOutcome};
use super::source::StatusSource;

pub const MSG_PREPARING: &str = "preparing files";
pub const MSG_COMPLETED: &str = "processing completed";
pub const MSG_NOT_FOUND: &str = "job not found";
const DEFAULT_JOB_ERROR: &str = "transcoding failed";

/// Tracks one transcoding job at a time and publishes its UI-facing state.
///
/// Subscribers get a [`watch::Receiver`] of [`MonitorState`]. Dropping the
/// monitor stops the poller it owns.
pub struct TranscodeJobMonitor {
    poller: JobStatusPoller,
    source: Arc<dyn StatusSource>,
    state: Arc<watch::Sender<MonitorState>>,
    active: Mutex<Option<PollHandle>>,
}

impl TranscodeJobMonitor {
    pub fn new(source: Arc<dyn StatusSource>, poller: JobStatusPoller) -> Self {
        let (tx, _rx) = watch::channel(MonitorState::idle());
        Self {
            poller,
            source,
            state: Arc::new(tx),
            active: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> MonitorState {
        self.state.borrow().clone()
    }

    pub fn is_monitoring(&self) -> bool {
        self.lock_active()
            .as_ref()
            .is_some_and(|handle| handle.is_active())
    }

    pub fn monitor(&self, task_id: impl Into<TaskId>, content_type: ContentType) {
        let job = JobRef::new(task_id, content_type);
        let mut active = self.lock_active();

        if let Some(previous) = active.take() {
            if previous.is_active() {
                warn!(
                    "Replacing active monitor for {} with {}",
                    previous.job(),
                    job
                );
            }
            previous.cancel();
        }

        self.state.send_replace(MonitorState {
            job: Some(job.clone()),
            ..MonitorState::idle()
        });

        info!("🎬 Monitoring transcoding job {}", job);

        let on_update = {
            let state = self.state.clone();
            move |progress: &JobProgress| {
                state.send_if_modified(|current| apply_observation(current, progress));
            }
        };
        let on_terminal = {
            let state = self.state.clone();
            move |outcome: PollOutcome| {
                state.send_if_modified(|current| apply_outcome(current, outcome));
            }
        };

        *active = Some(
            self.poller
                .start(job, self.source.clone(), on_update, on_terminal),
        );
    }

    /// Stops polling and leaves the last observed state in place.
    pub fn cancel(&self) {
        if let Some(handle) = self.lock_active().take() {
            handle.cancel();
        }
    }

    pub fn reset(&self) {
        self.cancel();
        self.state.send_replace(MonitorState::idle());
    }

    /// Resolves once the job reaches a terminal state.
    ///
    /// Returns `None` if monitoring is cancelled or reset before that. A job
    /// replaced by `monitor()` is followed through to the new job.
    pub async fn wait_for_terminal(&self) -> Option<MonitorState> {
        let mut rx = self.subscribe();
        loop {
            {
                let current = rx.borrow_and_update();
                if current.status.is_terminal() {
                    return Some(current.clone());
                }
            }

            let token = self.lock_active().as_ref().map(PollHandle::cancellation)?;
            if token.is_cancelled() {
                return None;
            }

            tokio::select! {
                biased;
                changed = rx.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                // cancel() leaves the state untouched, so the watch never fires.
                _ = token.cancelled() => {}
            }
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<PollHandle>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TranscodeJobMonitor {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub fn apply_observation(state: &mut MonitorState, observed: &JobProgress) -> bool {
    if state.status.is_terminal() {
        return false;
    }

    let before = state.clone();
    // Status only moves forward; a late `processing` keeps `transcoding`.
    let status = state.status.max(JobStatus::from(observed.status));

    match status {
        JobStatus::Completed => {
            state.status = JobStatus::Completed;
            state.progress = 100;
            state.message = MSG_COMPLETED.to_string();
            state.error = None;
            state.failure = None;
        }
        JobStatus::Failed => {
            let error = observed
                .error
                .clone()
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_JOB_ERROR.to_string());
            fail(state, FailureKind::Job, error);
        }
        JobStatus::Processing | JobStatus::Transcoding | JobStatus::Idle => {
            state.status = status;
            state.progress = state.progress.max(observed.progress.min(100));
            state.message = if status == JobStatus::Transcoding {
                format!("transcoding… {}%", state.progress)
            } else {
                MSG_PREPARING.to_string()
            };
        }
    }

    let changed = *state != before;
    if changed {
        state.updated_at = Some(OffsetDateTime::now_utc());
    }
    changed
}

pub fn apply_outcome(state: &mut MonitorState, outcome: PollOutcome) -> bool {
    if state.status.is_terminal() {
        return false;
    }

    match outcome {
        PollOutcome::Completed(progress) | PollOutcome::Failed(progress) => {
            apply_observation(state, &progress)
        }
        PollOutcome::NotFound => {
            fail(state, FailureKind::NotFound, MSG_NOT_FOUND.to_string());
            state.updated_at = Some(OffsetDateTime::now_utc());
            true
        }
        PollOutcome::ConnectionLost(err) => {
            fail(
                state,
                FailureKind::ConnectionLost,
                format!("lost connection to job: {}", err),
            );
            state.updated_at = Some(OffsetDateTime::now_utc());
            true
        }
    }
}

fn fail(state: &mut MonitorState, kind: FailureKind, error: String) {
    if let Some(job) = &state.job {
        warn!("Transcoding job {} failed: {}", job, error);
    }
    state.status = JobStatus::Failed;
    state.message = error.clone();
    state.error = Some(error);
    state.failure = Some(kind);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::common::error::PollError;
    use crate::config::settings::{PollerConfig, RetryConfig};
    use crate::modules::transcode::model::RemoteStatus;
    use crate::modules::transcode::testing::{ScriptedSource, ok};

    fn monitor_with(source: Arc<ScriptedSource>) -> TranscodeJobMonitor {
        let config = PollerConfig {
            interval_ms: 1_000,
            retry: RetryConfig::none(),
        };
        TranscodeJobMonitor::new(source, JobStatusPoller::new(config))
    }

    #[test]
    fn test_progress_is_monotonic_and_completes_at_100() {
        let observations = [
            RemoteStatus::Processing.at(10),
            RemoteStatus::Processing.at(4),
            RemoteStatus::Transcoding.at(30),
            RemoteStatus::Processing.at(20),
            RemoteStatus::Transcoding.at(25),
            RemoteStatus::Transcoding.at(80),
            RemoteStatus::Completed.at(97),
        ];

        let mut state = MonitorState::idle();
        let mut last = 0;
        for observed in &observations {
            apply_observation(&mut state, observed);
            if state.status.is_active() {
                assert!(state.progress >= last, "progress went backwards");
            }
            last = state.progress;
        }

        assert_eq!(state.status, JobStatus::Completed);
        assert_eq!(state.progress, 100);
        assert_eq!(state.message, MSG_COMPLETED);
    }

    #[test]
    fn test_status_does_not_regress() {
        let mut state = MonitorState::idle();
        apply_observation(&mut state, &RemoteStatus::Transcoding.at(40));
        apply_observation(&mut state, &RemoteStatus::Processing.at(41));
        assert_eq!(state.status, JobStatus::Transcoding);
        assert_eq!(state.message, "transcoding… 41%");
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let mut state = MonitorState::idle();
        apply_observation(&mut state, &JobProgress::failed("disk full"));
        assert_eq!(state.status, JobStatus::Failed);
        assert_eq!(state.error.as_deref(), Some("disk full"));
        assert_eq!(state.failure, Some(FailureKind::Job));

        assert!(!apply_observation(&mut state, &RemoteStatus::Completed.at(100)));
        assert!(!apply_outcome(&mut state, PollOutcome::NotFound));
        assert_eq!(state.status, JobStatus::Failed);
    }

    #[test]
    fn test_failed_without_message_gets_default() {
        let mut state = MonitorState::idle();
        let mut observed = RemoteStatus::Failed.at(0);
        observed.error = Some("  ".into());
        apply_observation(&mut state, &observed);
        assert_eq!(state.error.as_deref(), Some(DEFAULT_JOB_ERROR));
    }

    #[test]
    fn test_connection_lost_is_distinct_from_job_failure() {
        let mut state = MonitorState::idle();
        apply_observation(&mut state, &RemoteStatus::Transcoding.at(60));
        apply_outcome(&mut state, PollOutcome::ConnectionLost(PollError::Timeout));

        assert_eq!(state.status, JobStatus::Failed);
        assert_eq!(state.failure, Some(FailureKind::ConnectionLost));
        assert_eq!(state.progress, 60);
        assert_eq!(
            state.error.as_deref(),
            Some("lost connection to job: request timed out")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_releases_waiter() {
        let source = Arc::new(ScriptedSource::forever(ok(RemoteStatus::Transcoding, 30)));
        let monitor = Arc::new(monitor_with(source));
        monitor.monitor("abc", ContentType::Movie);

        let waiter = tokio::spawn({
            let monitor = monitor.clone();
            async move { monitor.wait_for_terminal().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        monitor.cancel();

        let result = tokio::time::timeout(Duration::from_secs(60), waiter).await;
        assert!(matches!(result, Ok(Ok(None))), "got {:?}", result);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_follows_replacement_job() {
        let source = Arc::new(ScriptedSource::forever(ok(RemoteStatus::Transcoding, 30)));
        let monitor = Arc::new(monitor_with(source));
        monitor.monitor("abc", ContentType::Movie);

        let waiter = tokio::spawn({
            let monitor = monitor.clone();
            async move { monitor.wait_for_terminal().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        monitor.monitor("def", ContentType::Series);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        monitor.cancel();
        let result = tokio::time::timeout(Duration::from_secs(60), waiter).await;
        assert!(matches!(result, Ok(Ok(None))), "got {:?}", result);
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_sequence_through_completion() {
        let source = Arc::new(ScriptedSource::new(vec![
            ok(RemoteStatus::Processing, 10),
            ok(RemoteStatus::Transcoding, 55),
            ok(RemoteStatus::Completed, 100),
        ]));
        let monitor = monitor_with(source.clone());
        let mut rx = monitor.subscribe();

        monitor.monitor("abc", ContentType::Movie);
        rx.borrow_and_update();

        let mut messages = Vec::new();
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            messages.push(state.message.clone());
            if state.status.is_terminal() {
                break;
            }
        }

        assert_eq!(
            messages,
            vec!["preparing files", "transcoding… 55%", "processing completed"]
        );
        let final_state = monitor.state();
        assert_eq!(final_state.progress, 100);
        assert_eq!(final_state.status, JobStatus::Completed);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_fails_after_one_fetch() {
        let source = Arc::new(ScriptedSource::forever(Err(PollError::NotFound)));
        let monitor = monitor_with(source.clone());

        monitor.monitor("gone", ContentType::Episode);
        let state = monitor.wait_for_terminal().await.expect("terminal state");

        assert_eq!(state.status, JobStatus::Failed);
        assert_eq!(state.error.as_deref(), Some(MSG_NOT_FOUND));
        assert_eq!(state.failure, Some(FailureKind::NotFound));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(source.calls(), 1);
        assert!(!monitor.is_monitoring());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_all_updates() {
        let source = Arc::new(ScriptedSource::forever(ok(RemoteStatus::Transcoding, 30)));
        let monitor = monitor_with(source.clone());
        let mut rx = monitor.subscribe();

        monitor.monitor("abc", ContentType::Series);
        rx.changed().await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().status, JobStatus::Transcoding);

        monitor.cancel();
        monitor.cancel();
        let calls = source.calls();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.calls(), calls);
        assert!(!rx.has_changed().unwrap());

        let state = monitor.state();
        assert_eq!(state.status, JobStatus::Transcoding);
        assert_eq!(state.progress, 30);
        assert!(monitor.wait_for_terminal().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_monitor_replaces_first() {
        let source = Arc::new(ScriptedSource::forever(ok(RemoteStatus::Processing, 1)));
        let monitor = monitor_with(source.clone());

        monitor.monitor("first", ContentType::Movie);
        monitor.monitor("second", ContentType::Movie);

        tokio::time::sleep(Duration::from_millis(3_500)).await;

        assert!(source.calls_for("first") <= 1);
        assert_eq!(source.calls_for("second"), 4);
        assert_eq!(
            monitor.state().job.map(|j| j.task_id),
            Some(TaskId::new("second"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_returns_to_idle() {
        let source = Arc::new(ScriptedSource::forever(ok(RemoteStatus::Transcoding, 70)));
        let monitor = monitor_with(source.clone());

        monitor.monitor("abc", ContentType::Movie);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(monitor.state().progress, 70);

        monitor.reset();
        assert_eq!(monitor.state(), MonitorState::idle());
        assert!(!monitor.is_monitoring());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_poller() {
        let source = Arc::new(ScriptedSource::forever(ok(RemoteStatus::Processing, 0)));
        let monitor = monitor_with(source.clone());
        monitor.monitor("abc", ContentType::Movie);
        tokio::time::sleep(Duration::from_millis(10)).await;

        drop(monitor);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(source.calls(), 1);
    }
}
