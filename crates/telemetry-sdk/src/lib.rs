// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Background export of in-process telemetry to an HTTPS ingest API.
//!
//! Producers record into a [`buffer::Buffer`]. A [`harvester::Harvester`]
//! drains every registered buffer on a fixed interval and hands the batch
//! to a [`client::Client`], which gzips it, POSTs it, retries transient
//! failures with exponential backoff and splits payloads the server
//! rejects as too large.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod buffer;
pub mod client;
pub mod config;
pub mod error;
pub mod harvester;
pub mod logger;
pub mod span;

pub use buffer::{Batch, Buffer, SpanBuffer};
pub use client::{Client, ClientConfig, Reporter, ReportSummary, RetryPolicy, Transport};
pub use config::Config;
pub use error::{ClientError, ConfigError, HarvesterError, TransportError};
pub use harvester::{Harvestable, Harvester, HarvesterState};
pub use span::{Record, Span};
