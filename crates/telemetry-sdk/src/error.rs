// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Errors raised while building or validating a [`crate::config::Config`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing credential: set the {0} environment variable")]
    MissingCredential(&'static str),
}

/// Errors surfaced by a [`crate::client::Transport`] for a single attempt.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Transport error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// Errors produced while constructing a client or delivering a batch.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid ingest URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Refusing to send telemetry over {0}, https is required")]
    InsecureScheme(String),

    #[error("Invalid header {0}")]
    InvalidHeader(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("Failed to encode payload: {0}")]
    Encode(String),

    #[error("Ingest API rejected the payload with status {0}")]
    Rejected(StatusCode),

    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Report did not finish within {} ms", .0.as_millis())]
    ReportTimedOut(std::time::Duration),
}

/// Errors returned by the [`crate::harvester::Harvester`] lifecycle methods.
#[derive(Debug, thiserror::Error)]
pub enum HarvesterError {
    #[error("Harvester already started")]
    AlreadyRunning,

    #[error("Harvester not running")]
    NotRunning,

    #[error("Harvester is still shutting down")]
    ShuttingDown,

    #[error("Harvest loop failed: {0}")]
    LoopFailed(String),

    #[error("Harvester must be started from within a Tokio runtime")]
    NoRuntime,

    #[error("Stream name must not be empty")]
    EmptyStreamName,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ConfigError::Invalid("harvest interval must be greater than 0".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: harvest interval must be greater than 0"
        );
    }

    #[test]
    fn test_config_error_converts_into_client_error() {
        let error: ClientError = ConfigError::MissingCredential("API_KEY").into();
        assert_eq!(
            error.to_string(),
            "Missing credential: set the API_KEY environment variable"
        );
    }

    #[test]
    fn test_rejected_display_contains_status() {
        let error = ClientError::Rejected(StatusCode::FORBIDDEN);
        assert!(error.to_string().contains("403"));
    }

    #[test]
    fn test_harvester_error_debug() {
        let debug_str = format!("{:?}", HarvesterError::AlreadyRunning);
        assert!(debug_str.contains("AlreadyRunning"));
    }
}
