use async_trait::async_trait;

use super::model::{JobProgress, JobRef};
use crate::common::error::PollError;

/// Something that can report the current progress of a job.
///
/// The HTTP implementation lives in `infrastructure::http::client`; tests use
/// scripted in-memory sources.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, job: &JobRef) -> Result<JobProgress, PollError>;
}
