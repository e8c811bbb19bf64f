use std::env;
use std::str::FromStr;

pub enum EnvKey {
    BackendUrl,
    BackendToken,
    PollIntervalMs,
    RequestTimeoutMs,
    RetryMax,
    RetryBaseMs,
    RetryMaxMs,
    RetryJitter,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::BackendUrl => "BACKEND_URL",
            EnvKey::BackendToken => "BACKEND_TOKEN",
            EnvKey::PollIntervalMs => "POLL_INTERVAL_MS",
            EnvKey::RequestTimeoutMs => "REQUEST_TIMEOUT_MS",
            EnvKey::RetryMax => "POLL_RETRY_MAX",
            EnvKey::RetryBaseMs => "POLL_RETRY_BASE_MS",
            EnvKey::RetryMaxMs => "POLL_RETRY_MAX_MS",
            EnvKey::RetryJitter => "POLL_RETRY_JITTER",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_opt(key: EnvKey) -> Option<String> {
    env::var(key.as_str()).ok().filter(|v| !v.trim().is_empty())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
