use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::common::error::ConfigError;
use crate::config::env::{self, EnvKey};

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub backend_url: Url,
    pub backend_token: Option<String>,
    pub request_timeout_ms: u64,
    pub poller: PollerConfig,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let raw = env::get(EnvKey::BackendUrl)
            .map_err(|_| ConfigError::Missing(EnvKey::BackendUrl.as_str()))?;
        let backend_url = Url::parse(raw.trim())?;
        if backend_url.cannot_be_a_base() {
            return Err(ConfigError::NotABase(raw));
        }

        let defaults = PollerConfig::default();
        let retry_defaults = defaults.retry;

        Ok(Self {
            backend_url,
            backend_token: env::get_opt(EnvKey::BackendToken),
            request_timeout_ms: env::get_parsed(EnvKey::RequestTimeoutMs, 10_000),
            poller: PollerConfig {
                interval_ms: env::get_parsed(EnvKey::PollIntervalMs, defaults.interval_ms),
                retry: RetryConfig {
                    max_retries: env::get_parsed(EnvKey::RetryMax, retry_defaults.max_retries),
                    backoff_base_ms: env::get_parsed(
                        EnvKey::RetryBaseMs,
                        retry_defaults.backoff_base_ms,
                    ),
                    backoff_max_ms: env::get_parsed(
                        EnvKey::RetryMaxMs,
                        retry_defaults.backoff_max_ms,
                    ),
                    jitter_ratio: env::get_parsed(
                        EnvKey::RetryJitter,
                        retry_defaults.jitter_ratio,
                    )
                    .clamp(0.0, 1.0),
                },
            },
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub struct PollerConfig {
    /// Delay between the end of one fetch and the start of the next.
    pub interval_ms: u64,
    pub retry: RetryConfig,
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            retry: RetryConfig::default(),
        }
    }
}

/// Backoff policy for transient fetch failures.
///
/// `max_retries = 0` ends polling on the first transient failure.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Fraction of the computed delay added as random jitter.
    pub jitter_ratio: f64,
}

impl RetryConfig {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let ms = self
            .backoff_base_ms
            .saturating_mul(1u64 << exp)
            .min(self.backoff_max_ms);
        Duration::from_millis(ms)
    }

    pub fn backoff_with_jitter(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        if self.jitter_ratio <= 0.0 {
            return base;
        }
        let spread = (base.as_millis() as f64 * self.jitter_ratio) as u64;
        if spread == 0 {
            return base;
        }
        base + Duration::from_millis(rand::random_range(0..=spread))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 8_000,
            jitter_ratio: 0.2,
        }
    }
}
