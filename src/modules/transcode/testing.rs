use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::model::{JobProgress, JobRef, RemoteStatus};
use super::source::StatusSource;
use crate::common::error::PollError;

/// Replays a fixed list of responses, then repeats the last one forever.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<JobProgress, PollError>>>,
    last: Mutex<Result<JobProgress, PollError>>,
    calls: Mutex<Vec<JobRef>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<JobProgress, PollError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(Ok(JobProgress::new(RemoteStatus::Processing, 0))),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn forever(response: Result<JobProgress, PollError>) -> Self {
        Self::new(vec![response])
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, task_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|job| job.task_id.as_str() == task_id)
            .count()
    }
}

#[async_trait]
impl StatusSource for ScriptedSource {
    async fn fetch_status(&self, job: &JobRef) -> Result<JobProgress, PollError> {
        self.calls.lock().unwrap().push(job.clone());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(response) => {
                *self.last.lock().unwrap() = response.clone();
                response
            }
            None => self.last.lock().unwrap().clone(),
        }
    }
}

pub fn ok(status: RemoteStatus, progress: u8) -> Result<JobProgress, PollError> {
    Ok(JobProgress::new(status, progress))
}
