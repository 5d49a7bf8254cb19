// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::client::RetryPolicy;
use crate::error::ConfigError;
use reqwest::Url;
use std::env;
use std::time::Duration;

pub const DEFAULT_TRACE_API_HOST: &str = "https://trace-api.newrelic.com";
pub const DEFAULT_HARVEST_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_BACKOFF_FACTOR: Duration = Duration::from_secs(5);
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(80);
pub const DEFAULT_MAX_RETRIES: u32 = 8;
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);
/// Full default retry schedule (555s) plus room for one more request.
pub const DEFAULT_REPORT_TIMEOUT: Duration = Duration::from_secs(585);

/// Environment variable holding the ingest API credential.
pub const API_KEY_ENV: &str = "API_KEY";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Tunables for the harvester and the ingest clients.
///
/// Built once at startup and shared read-only (usually behind an `Arc`).
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the trace ingest API, must be https
    pub trace_api_host: String,
    /// How often registered buffers are drained
    pub harvest_interval: Duration,
    /// Delay before the first retry; doubled on every further retry
    pub backoff_factor: Duration,
    /// Upper bound for a single retry delay
    pub backoff_max: Duration,
    /// Maximum number of send attempts for one batch
    pub max_retries: u32,
    /// Ingest API key, required to construct a client
    pub api_key: Option<String>,
    /// Log outgoing payloads and every dropped batch
    pub audit_logging_enabled: bool,
    /// Timeout for a single HTTP request
    pub send_timeout: Duration,
    /// Upper bound for one stream's delivery, retries included, within a
    /// harvest cycle
    pub report_timeout: Duration,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trace_api_host: DEFAULT_TRACE_API_HOST.to_string(),
            harvest_interval: DEFAULT_HARVEST_INTERVAL,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            backoff_max: DEFAULT_BACKOFF_MAX,
            max_retries: DEFAULT_MAX_RETRIES,
            api_key: None,
            audit_logging_enabled: false,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            report_timeout: DEFAULT_REPORT_TIMEOUT,
            https_proxy: None,
            log_level: "info".to_string(),
        }
    }
}

fn env_secs(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|val| val.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

impl Config {
    /// Create configuration from environment variables, falling back to the
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let trace_api_host = env::var("TELEMETRY_TRACE_API_HOST")
            .unwrap_or_else(|_| DEFAULT_TRACE_API_HOST.to_string());
        let max_retries = env::var("TELEMETRY_MAX_RETRIES")
            .ok()
            .and_then(|val| val.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_RETRIES);
        let api_key = env::var(API_KEY_ENV).ok().filter(|key| !key.is_empty());
        let audit_logging_enabled = env::var("TELEMETRY_AUDIT_LOGGING")
            .map(|val| matches!(val.to_lowercase().as_str(), "true" | "1"))
            .unwrap_or(false);
        let https_proxy = env::var("TELEMETRY_PROXY_HTTPS")
            .or_else(|_| env::var("HTTPS_PROXY"))
            .ok();
        let log_level = env::var("TELEMETRY_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|_| "info".to_string());

        let mut config = Self {
            trace_api_host,
            harvest_interval: env_secs("TELEMETRY_HARVEST_INTERVAL", DEFAULT_HARVEST_INTERVAL),
            backoff_factor: env_secs("TELEMETRY_BACKOFF_FACTOR", DEFAULT_BACKOFF_FACTOR),
            backoff_max: env_secs("TELEMETRY_BACKOFF_MAX", DEFAULT_BACKOFF_MAX),
            max_retries,
            api_key,
            audit_logging_enabled,
            send_timeout: env_secs("TELEMETRY_SEND_TIMEOUT", DEFAULT_SEND_TIMEOUT),
            report_timeout: DEFAULT_REPORT_TIMEOUT,
            https_proxy,
            log_level,
        };

        config.report_timeout =
            env_secs("TELEMETRY_REPORT_TIMEOUT", config.default_report_timeout());

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.harvest_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "harvest interval must be greater than 0".to_string(),
            ));
        }

        if self.backoff_factor > self.backoff_max {
            return Err(ConfigError::Invalid(format!(
                "backoff factor ({}s) must not exceed backoff max ({}s)",
                self.backoff_factor.as_secs_f64(),
                self.backoff_max.as_secs_f64()
            )));
        }

        if self.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "max retries must be at least 1".to_string(),
            ));
        }

        if self.send_timeout.is_zero() || self.report_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "send and report timeouts must be greater than 0".to_string(),
            ));
        }

        let delivery_budget = self.retry_policy().delivery_budget(self.send_timeout);
        if self.report_timeout < delivery_budget {
            return Err(ConfigError::Invalid(format!(
                "report timeout ({}s) is shorter than the retry schedule ({}s)",
                self.report_timeout.as_secs_f64(),
                delivery_budget.as_secs_f64()
            )));
        }

        match Url::parse(&self.trace_api_host) {
            Ok(url) if url.scheme() == "https" => {}
            Ok(url) => {
                return Err(ConfigError::Invalid(format!(
                    "trace API host must use https, got {}",
                    url.scheme()
                )))
            }
            Err(e) => {
                return Err(ConfigError::Invalid(format!(
                    "trace API host '{}' is not a valid URL: {e}",
                    self.trace_api_host
                )))
            }
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    /// Report timeout fitting the configured retry schedule with room for
    /// one more request.
    pub fn default_report_timeout(&self) -> Duration {
        self.retry_policy()
            .delivery_budget(self.send_timeout)
            .saturating_add(self.send_timeout)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            backoff_factor: self.backoff_factor,
            backoff_max: self.backoff_max,
            max_retries: self.max_retries,
        }
    }
}
