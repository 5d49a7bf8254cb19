// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Logging helpers shared by the harvester and the clients.
//!
//! The SDK only emits `tracing` events. Binaries embedding it decide where
//! those go; [`init`] installs the default fmt subscriber for them.

use std::error::Error;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Logs `err` and its source chain with a short description of what was
/// being attempted. Never panics.
pub fn log_error(err: &(dyn Error + 'static), context: &str) {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    error!("{context} {chain}");
}

/// Installs a global fmt subscriber filtered at `log_level`.
///
/// HTTP stack internals are silenced so that a `debug` level only shows
/// harvester and client activity.
pub fn init(log_level: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    let env_filter = format!("h2=off,hyper=off,hyper_util=off,rustls=off,reqwest=off,{log_level}");

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_new(env_filter)?)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
