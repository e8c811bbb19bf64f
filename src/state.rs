use std::sync::Arc;

use crate::common::error::ConfigError;
use crate::config::settings::AppConfig;
use crate::infrastructure::http::client::StatusClient;
use crate::modules::transcode::{JobStatusPoller, StatusSource, TranscodeJobMonitor};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub status: Arc<dyn StatusSource>,
}

impl AppState {
    pub fn new(config: AppConfig, status: Arc<dyn StatusSource>) -> Self {
        Self { config, status }
    }

    pub fn connect(config: AppConfig) -> Result<Self, ConfigError> {
        let status = StatusClient::new(&config)?;
        Ok(Self::new(config, Arc::new(status)))
    }

    pub fn poller(&self) -> JobStatusPoller {
        JobStatusPoller::new(self.config.poller)
    }

    pub fn job_monitor(&self) -> TranscodeJobMonitor {
        TranscodeJobMonitor::new(self.status.clone(), self.poller())
    }
}
