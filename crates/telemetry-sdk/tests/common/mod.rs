// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Common test utilities and mocks for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use flate2::read::GzDecoder;
use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url};
use serde_json::{json, Value};
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use telemetry_sdk::{
    Batch, Buffer, ClientConfig, ClientError, Config, Reporter, ReportSummary, Transport,
    TransportError,
};
use tokio::sync::Notify;

pub const TEST_API_KEY: &str = "_not_a_real_key_";

/// Client settings for the span endpoint with a short backoff schedule.
pub fn span_client_config(max_retries: u32) -> ClientConfig {
    let config = Config {
        api_key: Some(TEST_API_KEY.to_string()),
        backoff_factor: Duration::from_millis(10),
        backoff_max: Duration::from_millis(40),
        max_retries,
        ..Default::default()
    };
    ClientConfig::for_spans(&config).expect("valid span client config")
}

#[derive(Clone, Debug)]
pub struct SentRequest {
    pub url: Url,
    pub headers: HeaderMap,
    pub envelope: Value,
}

impl SentRequest {
    pub fn request_id(&self) -> String {
        self.headers["x-request-id"]
            .to_str()
            .expect("ascii request id")
            .to_string()
    }

    pub fn span_count(&self) -> usize {
        self.envelope[0]["spans"]
            .as_array()
            .map_or(0, |spans| spans.len())
    }
}

/// Sends every request to a local plain http mock server, keeping path and
/// query, and records what went over the wire.
pub struct RedirectTransport {
    client: reqwest::Client,
    target: Url,
    sent: Mutex<Vec<SentRequest>>,
}

impl RedirectTransport {
    pub fn new(server_url: &str) -> Arc<Self> {
        Arc::new(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("failed to build test client"),
            target: Url::parse(server_url).expect("invalid mock server url"),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl Transport for RedirectTransport {
    async fn post(
        &self,
        url: &Url,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<StatusCode, TransportError> {
        let mut target = self.target.clone();
        target.set_path(url.path());
        target.set_query(url.query());

        self.sent.lock().expect("lock poisoned").push(SentRequest {
            url: target.clone(),
            headers: headers.clone(),
            envelope: decode_body(&headers, &body),
        });

        let response = self
            .client
            .post(target)
            .headers(headers)
            .body(body)
            .send()
            .await?;
        Ok(response.status())
    }
}

pub fn decode_body(headers: &HeaderMap, body: &[u8]) -> Value {
    let gzipped = headers
        .get("content-encoding")
        .is_some_and(|value| value == "gzip");
    if gzipped {
        let mut json = String::new();
        GzDecoder::new(body)
            .read_to_string(&mut json)
            .expect("body is not gzip");
        serde_json::from_str(&json).expect("body is not json")
    } else {
        serde_json::from_slice(body).expect("body is not json")
    }
}

/// Buffer handing out whatever was pushed since the last flush.
#[derive(Default)]
pub struct StubBuffer {
    records: Mutex<Vec<Value>>,
    flushes: AtomicUsize,
}

impl StubBuffer {
    pub fn push(&self, n: usize) {
        let mut records = self.records.lock().expect("lock poisoned");
        records.extend((0..n).map(|i| json!({ "id": format!("{i:016x}") })));
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl Buffer for StubBuffer {
    fn flush(&self) -> Batch {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.lock().expect("lock poisoned");
        Batch::new(std::mem::take(&mut *records))
    }
}

/// Reporter that parks inside `report` until released.
#[derive(Default)]
pub struct GatedReporter {
    pub entered: Notify,
    pub release: Notify,
    reports: AtomicUsize,
}

impl GatedReporter {
    pub fn reports(&self) -> usize {
        self.reports.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reporter for GatedReporter {
    async fn report(&self, batch: Batch) -> Result<ReportSummary, ClientError> {
        self.reports.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(ReportSummary {
            delivered: batch.len(),
            attempts: 1,
            ..Default::default()
        })
    }
}

/// Reporter that only counts batches.
#[derive(Default)]
pub struct CountingReporter {
    records: AtomicUsize,
    reports: AtomicUsize,
}

impl CountingReporter {
    pub fn records(&self) -> usize {
        self.records.load(Ordering::SeqCst)
    }

    pub fn reports(&self) -> usize {
        self.reports.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reporter for CountingReporter {
    async fn report(&self, batch: Batch) -> Result<ReportSummary, ClientError> {
        self.reports.fetch_add(1, Ordering::SeqCst);
        self.records.fetch_add(batch.len(), Ordering::SeqCst);
        Ok(ReportSummary {
            delivered: batch.len(),
            attempts: 1,
            ..Default::default()
        })
    }
}
