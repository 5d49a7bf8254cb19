// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of harvested batches to the ingest API.
//!
//! A [`Client`] turns a [`Batch`] into a JSON envelope, gzips it, and POSTs it
//! with a fresh `x-request-id` on every attempt. The response decides what
//! happens next:
//!
//! ```text
//!   2xx              -> delivered
//!   408 / 429 / 5xx  -> wait min(factor * 2^n, max), resend, new request id
//!   network error    -> same as above
//!   413              -> split in halves, each half starts over
//!   other 4xx        -> dropped
//! ```
//!
//! Delivery is best effort. Nothing here ever blocks the code producing spans.

mod payload;
mod retry;
mod transport;

pub use payload::encode_payload;
pub use retry::{classify, Outcome, RetryPolicy};
pub use transport::{build_client, HttpTransport, Transport};

use crate::buffer::Batch;
use crate::config::{Config, API_KEY_ENV};
use crate::error::{ClientError, ConfigError};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_ENCODING};
use reqwest::{StatusCode, Url};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const TRACE_API_PATH: &str = "/trace/v1";
pub const SPANS_PAYLOAD_TYPE: &str = "spans";

/// Something a harvester can hand a drained batch to.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, batch: Batch) -> Result<ReportSummary, ClientError>;

    /// The caller stopped waiting on `report` for a batch of `records`
    /// records; whatever was not yet delivered is lost.
    fn abandoned(&self, _records: usize, _error: &ClientError) {}
}

/// Counters for one `report` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    /// Records accepted by the ingest API
    pub delivered: usize,
    /// Records given up on
    pub dropped: usize,
    /// HTTP requests issued, retries and split halves included
    pub attempts: u32,
    /// Number of times a batch was halved after a 413
    pub splits: u32,
}

pub struct ClientConfig {
    pub host: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub query_params: Vec<(String, String)>,
    pub use_gzip: bool,
    pub payload_type: String,
    pub retry_policy: RetryPolicy,
    pub audit_logging: bool,
    pub timeout: Duration,
    pub https_proxy: Option<String>,
}

impl ClientConfig {
    /// Settings for the span ingest endpoint. Fails when no API key is
    /// configured.
    pub fn for_spans(config: &Config) -> Result<Self, ClientError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingCredential(API_KEY_ENV))?;

        Ok(ClientConfig {
            host: config.trace_api_host.clone(),
            path: TRACE_API_PATH.to_string(),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Api-Key".to_string(), api_key.to_string()),
                ("Data-Format".to_string(), "newrelic".to_string()),
                ("Data-Format-Version".to_string(), "1".to_string()),
            ],
            query_params: Vec::new(),
            use_gzip: true,
            payload_type: SPANS_PAYLOAD_TYPE.to_string(),
            retry_policy: config.retry_policy(),
            audit_logging: config.audit_logging_enabled,
            timeout: config.send_timeout,
            https_proxy: config.https_proxy.clone(),
        })
    }
}

enum Delivery {
    Delivered,
    TooLarge,
    Dropped(ClientError),
}

/// Ingest API client for one payload type.
///
/// Holds no per-request state, so a client can be shared, but each harvested
/// stream normally gets its own.
#[derive(Clone)]
pub struct Client {
    url: Url,
    headers: HeaderMap,
    use_gzip: bool,
    payload_type: String,
    retry_policy: RetryPolicy,
    audit_logging: bool,
    transport: Arc<dyn Transport>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(config.https_proxy.as_deref(), config.timeout)?;
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        let url = construct_url(&config.host, &config.path, &config.query_params)?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ClientError::InvalidHeader(name.clone()))?;
            let header_value =
                HeaderValue::from_str(value).map_err(|_| ClientError::InvalidHeader(name.clone()))?;
            headers.insert(header_name, header_value);
        }
        if config.use_gzip {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        }

        Ok(Client {
            url,
            headers,
            use_gzip: config.use_gzip,
            payload_type: config.payload_type,
            retry_policy: config.retry_policy,
            audit_logging: config.audit_logging,
            transport,
        })
    }

    /// Span client for the trace API described by `config`.
    pub fn span_client(config: &Config) -> Result<Self, ClientError> {
        Self::new(ClientConfig::for_spans(config)?)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Delivers `batch`, splitting on 413 and retrying transient failures.
    ///
    /// Every sub-batch is attempted even if a sibling was dropped. Returns
    /// the first error if any record was dropped.
    pub async fn deliver(&self, batch: Batch) -> Result<ReportSummary, ClientError> {
        let mut summary = ReportSummary::default();
        let mut first_error = None;
        let mut pending = VecDeque::from([batch]);

        while let Some(batch) = pending.pop_front() {
            let error = match self.send_with_retries(&batch, &mut summary).await {
                Delivery::Delivered => {
                    summary.delivered += batch.len();
                    continue;
                }
                Delivery::TooLarge if batch.len() > 1 => {
                    debug!(
                        "TRACES | Payload of {} records too large, splitting",
                        batch.len()
                    );
                    summary.splits += 1;
                    let (first, second) = batch.split();
                    pending.push_front(second);
                    pending.push_front(first);
                    continue;
                }
                Delivery::TooLarge => ClientError::Rejected(StatusCode::PAYLOAD_TOO_LARGE),
                Delivery::Dropped(error) => error,
            };

            self.log_dropped(batch.len(), &error);
            summary.dropped += batch.len();
            first_error.get_or_insert(error);
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(summary),
        }
    }

    async fn send_with_retries(&self, batch: &Batch, summary: &mut ReportSummary) -> Delivery {
        let body = match encode_payload(&self.payload_type, batch, self.use_gzip) {
            Ok(body) => Bytes::from(body),
            Err(e) => return Delivery::Dropped(e),
        };

        let max_attempts = self.retry_policy.max_attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            summary.attempts += 1;

            let request_id = Uuid::new_v4().to_string();
            let headers = self.request_headers(&request_id);
            if self.audit_logging {
                info!(
                    "AUDIT | Sending {} {} ({} bytes) to {} request_id={request_id} attempt={attempt}",
                    batch.len(),
                    self.payload_type,
                    body.len(),
                    self.url
                );
            }

            let outcome = match self.transport.post(&self.url, headers, body.clone()).await {
                Ok(status) => classify(status),
                Err(e) => Outcome::Retryable(e.to_string()),
            };

            match outcome {
                Outcome::Success => {
                    debug!(
                        "TRACES | Delivered {} records request_id={request_id}",
                        batch.len()
                    );
                    return Delivery::Delivered;
                }
                Outcome::TooLarge => return Delivery::TooLarge,
                Outcome::Fatal(status) => return Delivery::Dropped(ClientError::Rejected(status)),
                Outcome::Retryable(reason) => {
                    if attempt >= max_attempts {
                        return Delivery::Dropped(ClientError::RetriesExhausted {
                            attempts: attempt,
                            last_error: reason,
                        });
                    }
                    let delay = self.retry_policy.delay_for(attempt - 1);
                    debug!(
                        "TRACES | Attempt {attempt} failed ({reason}), retrying in {} ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn request_headers(&self, request_id: &str) -> HeaderMap {
        let mut headers = self.headers.clone();
        if let Ok(value) = HeaderValue::from_str(request_id) {
            headers.insert(REQUEST_ID_HEADER, value);
        }
        headers
    }

    fn log_dropped(&self, records: usize, error: &ClientError) {
        if self.audit_logging {
            warn!("AUDIT | Dropped {records} {}: {error}", self.payload_type);
        } else {
            debug!("TRACES | Dropped {records} {}: {error}", self.payload_type);
        }
    }
}

#[async_trait]
impl Reporter for Client {
    async fn report(&self, batch: Batch) -> Result<ReportSummary, ClientError> {
        self.deliver(batch).await
    }

    fn abandoned(&self, records: usize, error: &ClientError) {
        self.log_dropped(records, error);
    }
}

fn construct_url(
    host: &str,
    path: &str,
    query_params: &[(String, String)],
) -> Result<Url, ClientError> {
    let mut url = Url::parse(host).map_err(|e| ClientError::InvalidUrl {
        url: host.to_string(),
        reason: e.to_string(),
    })?;
    if url.scheme() != "https" {
        return Err(ClientError::InsecureScheme(url.scheme().to_string()));
    }
    if url.host_str().is_none() {
        return Err(ClientError::InvalidUrl {
            url: host.to_string(),
            reason: "missing host".to_string(),
        });
    }

    url.set_path(path);
    if !query_params.is_empty() {
        url.query_pairs_mut().extend_pairs(query_params);
    }
    Ok(url)
}
