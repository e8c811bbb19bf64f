pub mod model;
pub mod monitor;
pub mod poller;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use model::{ContentType, FailureKind, JobProgress, JobRef, JobStatus, MonitorState, TaskId};
pub use monitor::TranscodeJobMonitor;
pub use poller::{JobStatusPoller, PollHandle, PollOutcome};
pub use source::StatusSource;
