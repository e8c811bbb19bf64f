use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PollError {
    #[error("job not found")]
    NotFound,
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server error (HTTP {0})")]
    Server(u16),
    #[error("request rejected (HTTP {0})")]
    Rejected(u16),
    #[error("malformed progress payload: {0}")]
    Malformed(String),
}

impl PollError {
    /// Whether the failure may clear up on its own and is worth another fetch.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PollError::Timeout | PollError::Transport(_) | PollError::Server(_)
        )
    }

    pub fn from_status(status: u16) -> Self {
        match status {
            404 => PollError::NotFound,
            500..=599 => PollError::Server(status),
            _ => PollError::Rejected(status),
        }
    }
}

impl From<reqwest::Error> for PollError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return PollError::Timeout;
        }
        // A body cut short by the socket is a transport fault, not a bad payload.
        if let Some(io) = io_cause(&err) {
            return match io.kind() {
                std::io::ErrorKind::TimedOut => PollError::Timeout,
                _ => PollError::Transport(err.to_string()),
            };
        }
        if err.is_decode() {
            PollError::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            PollError::from_status(status.as_u16())
        } else {
            PollError::Transport(err.to_string())
        }
    }
}

fn io_cause(err: &reqwest::Error) -> Option<&std::io::Error> {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return Some(io);
        }
        source = cause.source();
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PlaybackError {
    #[error("manifest could not be parsed: {0}")]
    Manifest(String),
    #[error("playback engine failed: {0}")]
    Engine(String),
    #[error("source type {0} cannot be played on this surface")]
    UnsupportedSource(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid backend url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("backend url {0} cannot carry a path")]
    NotABase(String),
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}
