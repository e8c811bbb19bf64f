//! Client-side core for the Hiura catalog: follows transcoding jobs through
//! the backend's progress endpoints and drives adaptive playback once the
//! content is ready.

pub mod common;
pub mod config;
pub mod infrastructure;
pub mod modules;
pub mod state;

pub use common::error::{ConfigError, PlaybackError, PollError};
pub use config::settings::{AppConfig, PollerConfig, RetryConfig};
pub use modules::playback::AdaptiveStreamController;
pub use modules::transcode::{JobStatusPoller, TranscodeJobMonitor};
pub use state::AppState;
