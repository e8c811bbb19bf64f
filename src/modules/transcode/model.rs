use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

/// Catalog family a job belongs to. Selects the progress endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Movie,
    Series,
    Episode,
}

impl ContentType {
    /// REST resource segment under `/api/v1`.
    pub fn resource(&self) -> &'static str {
        match self {
            ContentType::Movie => "movies",
            ContentType::Series => "series",
            ContentType::Episode => "episodes",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentType::Movie => "movie",
            ContentType::Series => "series",
            ContentType::Episode => "episode",
        };
        f.write_str(name)
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "movie" | "movies" => Ok(ContentType::Movie),
            "series" => Ok(ContentType::Series),
            "episode" | "episodes" => Ok(ContentType::Episode),
            other => Err(format!("unknown content type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobRef {
    pub task_id: TaskId,
    pub content_type: ContentType,
}

impl JobRef {
    pub fn new(task_id: impl Into<TaskId>, content_type: ContentType) -> Self {
        Self {
            task_id: task_id.into(),
            content_type,
        }
    }
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.content_type, self.task_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Processing,
    Transcoding,
    Completed,
    Failed,
}

impl RemoteStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RemoteStatus::Completed | RemoteStatus::Failed)
    }

    pub fn at(self, progress: u8) -> JobProgress {
        JobProgress::new(self, progress)
    }
}

/// `200` body of `GET /api/v1/{resource}/progress/{taskId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub status: RemoteStatus,
    #[serde(default, deserialize_with = "percent")]
    pub progress: u8,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobProgress {
    pub fn new(status: RemoteStatus, progress: u8) -> Self {
        Self {
            status,
            progress: progress.min(100),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: RemoteStatus::Failed,
            progress: 0,
            error: Some(error.into()),
        }
    }
}

// The worker reports a float; anything outside 0..=100 is clamped.
fn percent<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    if raw.is_nan() {
        return Ok(0);
    }
    Ok(raw.round().clamp(0.0, 100.0) as u8)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Idle,
    Processing,
    Transcoding,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Processing | JobStatus::Transcoding)
    }
}

impl From<RemoteStatus> for JobStatus {
    fn from(status: RemoteStatus) -> Self {
        match status {
            RemoteStatus::Processing => JobStatus::Processing,
            RemoteStatus::Transcoding => JobStatus::Transcoding,
            RemoteStatus::Completed => JobStatus::Completed,
            RemoteStatus::Failed => JobStatus::Failed,
        }
    }
}

/// Why a job ended up in [`JobStatus::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The server ran the job and reported failure.
    Job,
    /// The server does not know the task id.
    NotFound,
    /// We could no longer observe the job.
    ConnectionLost,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorState {
    pub job: Option<JobRef>,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl MonitorState {
    pub fn idle() -> Self {
        Self {
            job: None,
            status: JobStatus::Idle,
            progress: 0,
            message: String::new(),
            error: None,
            failure: None,
            updated_at: None,
        }
    }
}

impl Default for MonitorState {
    fn default() -> Self {
        Self::idle()
    }
}
