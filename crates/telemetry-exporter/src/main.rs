// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::sync::Arc;
use telemetry_sdk::client::SPANS_PAYLOAD_TYPE;
use telemetry_sdk::{logger, Client, Config, Harvester, Span, SpanBuffer};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
pub async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading telemetry exporter configuration: {e}");
            return;
        }
    };

    if let Err(e) = logger::init(&config.log_level) {
        eprintln!("Failed to initialize logging: {e}");
        return;
    }
    debug!("Logging subsystem enabled");

    if let Err(e) = run(config).await {
        error!("Telemetry exporter stopped with error: {e:#}");
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let service_name =
        env::var("TELEMETRY_SERVICE_NAME").unwrap_or_else(|_| "telemetry-exporter".to_string());

    let mut common_attributes = serde_json::Map::new();
    common_attributes.insert("service.name".to_string(), service_name.clone().into());
    let buffer = Arc::new(SpanBuffer::with_common_attributes(common_attributes));
    let client = Arc::new(Client::span_client(&config)?);
    info!("Exporting spans to {}", client.url());

    let harvester = Harvester::from_config(&config);
    harvester
        .register(SPANS_PAYLOAD_TYPE, buffer.clone(), client)
        .await;
    harvester.start()?;
    info!(
        "Harvester started, interval {} ms",
        config.harvest_interval.as_millis()
    );

    let trace_id = Span::new().trace_id;
    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = heartbeat.tick() => {
                let mut span = Span::new()
                    .with_trace_id(trace_id.clone())
                    .with_name("heartbeat")
                    .with_service_name(service_name.clone());
                span.finish();
                buffer.record(span);
            }
        }
    }

    info!("Shutting down, flushing {} buffered spans", buffer.len());
    harvester.stop().await?;
    Ok(())
}
