use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info};
use url::Url;

use crate::common::error::{ConfigError, PollError};
use crate::config::settings::AppConfig;
use crate::modules::transcode::model::{JobProgress, JobRef};
use crate::modules::transcode::source::StatusSource;

#[derive(Clone, Debug)]
pub struct StatusClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl StatusClient {
    pub fn new(config: &AppConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        info!("✅ Status client ready for {}", config.backend_url);

        Ok(Self {
            client,
            base_url: config.backend_url.clone(),
            token: config.backend_token.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{backend}/api/v1/{movies|series|episodes}/progress/{taskId}`
    pub fn progress_url(&self, job: &JobRef) -> Result<Url, ConfigError> {
        progress_url(&self.base_url, job)
    }
}

pub fn progress_url(base: &Url, job: &JobRef) -> Result<Url, ConfigError> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| ConfigError::NotABase(base.to_string()))?
        .pop_if_empty()
        .extend([
            "api",
            "v1",
            job.content_type.resource(),
            "progress",
            job.task_id.as_str(),
        ]);
    Ok(url)
}

#[async_trait]
impl StatusSource for StatusClient {
    async fn fetch_status(&self, job: &JobRef) -> Result<JobProgress, PollError> {
        let url = self
            .progress_url(job)
            .map_err(|e| PollError::Transport(e.to_string()))?;

        debug!("GET {}", url);

        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(PollError::NotFound);
        }
        if !status.is_success() {
            return Err(PollError::from_status(status.as_u16()));
        }

        let body = response.bytes().await?;
        serde_json::from_slice::<JobProgress>(&body)
            .map_err(|e| PollError::Malformed(e.to_string()))
    }
}
