//! Client configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::jobs::{DEFAULT_DETAIL_TTL, DEFAULT_LIST_TTL};
use crate::polling::{
    DEFAULT_MAX_CONSECUTIVE_FAILURES, DEFAULT_POLL_INTERVAL, PollerConfig, StopOnError,
};
use crate::{Error, Result};

/// Default base URL of the job API.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Settings shared by the API client, the job cache and the poller.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_url: String,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub request_timeout_secs: u64,
    pub upload_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub detail_ttl_secs: u64,
    pub list_ttl_secs: u64,
    pub max_poll_failures: u32,
    pub stop_on_error: StopOnError,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            access_token: None,
            request_timeout_secs: 30,
            upload_timeout_secs: 300,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            detail_ttl_secs: DEFAULT_DETAIL_TTL.as_secs(),
            list_ttl_secs: DEFAULT_LIST_TTL.as_secs(),
            max_poll_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            stop_on_error: StopOnError::default(),
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("upload_timeout_secs", &self.upload_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("detail_ttl_secs", &self.detail_ttl_secs)
            .field("list_ttl_secs", &self.list_ttl_secs)
            .field("max_poll_failures", &self.max_poll_failures)
            .field("stop_on_error", &self.stop_on_error)
            .finish()
    }
}

impl ClientConfig {
    /// Load config from the environment (and a `.env` file, if present),
    /// falling back to defaults.
    ///
    /// Supported env vars:
    /// - `MRISR_API_URL`
    /// - `MRISR_TOKEN`
    /// - `MRISR_REQUEST_TIMEOUT_SECS`, `MRISR_UPLOAD_TIMEOUT_SECS`
    /// - `MRISR_POLL_INTERVAL_MS`, `MRISR_MAX_POLL_FAILURES`, `MRISR_STOP_ON_ERROR`
    /// - `MRISR_DETAIL_TTL_SECS`, `MRISR_LIST_TTL_SECS`
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(api_url) = var("MRISR_API_URL") {
            config.api_url = api_url.trim().to_string();
        }
        if let Some(token) = var("MRISR_TOKEN") {
            config.access_token = Some(token.trim().to_string());
        }

        parse_into(&var, "MRISR_REQUEST_TIMEOUT_SECS", &mut config.request_timeout_secs);
        parse_into(&var, "MRISR_UPLOAD_TIMEOUT_SECS", &mut config.upload_timeout_secs);
        parse_into(&var, "MRISR_POLL_INTERVAL_MS", &mut config.poll_interval_ms);
        parse_into(&var, "MRISR_DETAIL_TTL_SECS", &mut config.detail_ttl_secs);
        parse_into(&var, "MRISR_LIST_TTL_SECS", &mut config.list_ttl_secs);
        parse_into(&var, "MRISR_MAX_POLL_FAILURES", &mut config.max_poll_failures);
        parse_into(&var, "MRISR_STOP_ON_ERROR", &mut config.stop_on_error);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.api_url)
            .map_err(|e| Error::config(format!("invalid API URL {:?}: {e}", self.api_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "API URL must be http or https: {}",
                self.api_url
            )));
        }

        let durations = [
            ("request_timeout_secs", self.request_timeout_secs),
            ("upload_timeout_secs", self.upload_timeout_secs),
            ("poll_interval_ms", self.poll_interval_ms),
        ];
        for (name, value) in durations {
            if value == 0 {
                return Err(Error::config(format!("{name} must be greater than zero")));
            }
        }

        Ok(())
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn detail_ttl(&self) -> Duration {
        Duration::from_secs(self.detail_ttl_secs)
    }

    pub fn list_ttl(&self) -> Duration {
        Duration::from_secs(self.list_ttl_secs)
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig::default()
            .with_interval(self.poll_interval())
            .with_stop_on_error(self.stop_on_error)
            .with_max_consecutive_failures(self.max_poll_failures)
    }
}

fn parse_into<T, F>(var: &F, key: &str, target: &mut T)
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = var(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => warn!(key, value = %raw, "Ignoring unparseable config value"),
        }
    }
}
