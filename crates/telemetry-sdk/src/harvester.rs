// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic drain of every registered buffer into its client.
//!
//! One background task owns the schedule. Every `interval` it takes the
//! registry lock, flushes each buffer and reports non-empty batches. A
//! failing, panicking or hanging stream only costs that stream its batch.
//! `stop` cancels the schedule and waits for one last harvest so nothing
//! buffered is left behind.

use crate::buffer::Buffer;
use crate::client::Reporter;
use crate::config::{Config, DEFAULT_REPORT_TIMEOUT};
use crate::error::{ClientError, HarvesterError};
use crate::logger::log_error;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// A buffer and the client its batches are reported to.
#[derive(Clone)]
pub struct Harvestable {
    pub buffer: Arc<dyn Buffer>,
    pub client: Arc<dyn Reporter>,
}

type Registry = Arc<TokioMutex<HashMap<String, Harvestable>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvesterState {
    Stopped,
    Running,
    ShuttingDown,
}

struct Worker {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Harvester {
    interval: Duration,
    report_timeout: Duration,
    registry: Registry,
    state: Mutex<HarvesterState>,
    worker: Mutex<Option<Worker>>,
}

impl Harvester {
    pub fn new(interval: Duration) -> Self {
        Harvester {
            interval,
            report_timeout: DEFAULT_REPORT_TIMEOUT,
            registry: Arc::new(TokioMutex::new(HashMap::new())),
            state: Mutex::new(HarvesterState::Stopped),
            worker: Mutex::new(None),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.harvest_interval).with_report_timeout(config.report_timeout)
    }

    /// Caps how long a single stream may take to report within one cycle.
    pub fn with_report_timeout(mut self, report_timeout: Duration) -> Self {
        self.report_timeout = report_timeout;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Adds a stream, replacing any stream already registered under `name`.
    ///
    /// Never fails the caller: a rejected registration is logged and
    /// reported as `false`.
    pub async fn register(
        &self,
        name: impl Into<String>,
        buffer: Arc<dyn Buffer>,
        client: Arc<dyn Reporter>,
    ) -> bool {
        let name = name.into();
        if name.trim().is_empty() {
            log_error(
                &HarvesterError::EmptyStreamName,
                "Encountered error while registering buffer.",
            );
            return false;
        }

        let mut registry = self.registry.lock().await;
        if registry
            .insert(name.clone(), Harvestable { buffer, client })
            .is_some()
        {
            debug!("Replaced harvestable {name}");
        } else {
            debug!("Registered harvestable {name}");
        }
        true
    }

    pub async fn lookup(&self, name: &str) -> Option<Harvestable> {
        self.registry.lock().await.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn state(&self) -> HarvesterState {
        #[allow(clippy::expect_used)]
        let state = self.state.lock().expect("lock poisoned");
        *state
    }

    pub fn is_running(&self) -> bool {
        self.state() == HarvesterState::Running
    }

    fn set_state(&self, state: HarvesterState) {
        #[allow(clippy::expect_used)]
        let mut current = self.state.lock().expect("lock poisoned");
        *current = state;
    }

    /// Spawns the harvest loop on the current Tokio runtime. Only a
    /// stopped harvester can be started.
    pub fn start(&self) -> Result<(), HarvesterError> {
        #[allow(clippy::expect_used)]
        let mut worker = self.worker.lock().expect("lock poisoned");
        match self.state() {
            HarvesterState::Stopped => {}
            HarvesterState::Running => return Err(HarvesterError::AlreadyRunning),
            HarvesterState::ShuttingDown => return Err(HarvesterError::ShuttingDown),
        }
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| HarvesterError::NoRuntime)?;

        let shutdown = CancellationToken::new();
        let handle = runtime.spawn(run(
            Arc::clone(&self.registry),
            self.interval,
            self.report_timeout,
            shutdown.clone(),
        ));
        *worker = Some(Worker { shutdown, handle });
        self.set_state(HarvesterState::Running);
        Ok(())
    }

    /// Stops the loop and waits until its final harvest has completed.
    /// In-flight deliveries are awaited, not aborted.
    pub async fn stop(&self) -> Result<(), HarvesterError> {
        // state and worker change together under the worker lock
        let Worker { shutdown, handle } = {
            #[allow(clippy::expect_used)]
            let mut worker = self.worker.lock().expect("lock poisoned");
            let Some(taken) = worker.take() else {
                return Err(HarvesterError::NotRunning);
            };
            self.set_state(HarvesterState::ShuttingDown);
            taken
        };

        shutdown.cancel();
        let result = handle.await;
        self.set_state(HarvesterState::Stopped);

        result.map_err(|e| {
            error!("Encountered error stopping harvester: {e}");
            HarvesterError::LoopFailed(e.to_string())
        })
    }

    /// Runs one harvest immediately, outside the schedule.
    pub async fn harvest_cycle(&self) {
        harvest(&self.registry, self.report_timeout).await;
    }
}

impl Drop for Harvester {
    fn drop(&mut self) {
        if let Ok(mut worker) = self.worker.lock() {
            if let Some(worker) = worker.take() {
                // the detached task still performs its final harvest
                worker.shutdown.cancel();
            }
        }
    }
}

async fn run(
    registry: Registry,
    interval: Duration,
    report_timeout: Duration,
    shutdown: CancellationToken,
) {
    debug!("Harvester started, interval {} ms", interval.as_millis());

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(interval) => {
                harvest(&registry, report_timeout).await;
            }
        }
    }

    debug!("Harvester shutting down, running final harvest");
    harvest(&registry, report_timeout).await;
    debug!("Harvester stopped");
}

async fn harvest(registry: &TokioMutex<HashMap<String, Harvestable>>, report_timeout: Duration) {
    let registry = registry.lock().await;
    for (name, harvestable) in registry.iter() {
        process_harvestable(name, harvestable, report_timeout).await;
    }
}

async fn process_harvestable(name: &str, harvestable: &Harvestable, report_timeout: Duration) {
    let buffer = Arc::clone(&harvestable.buffer);
    let batch = match std::panic::catch_unwind(AssertUnwindSafe(|| buffer.flush())) {
        Ok(batch) => batch,
        Err(_) => {
            error!("Buffer {name} panicked while flushing, skipping this harvest");
            return;
        }
    };
    if batch.is_empty() {
        return;
    }

    let records = batch.len();
    let report = AssertUnwindSafe(harvestable.client.report(batch)).catch_unwind();
    match tokio::time::timeout(report_timeout, report).await {
        Ok(Ok(Ok(summary))) => debug!(
            "Harvested {name}: {} records delivered in {} attempts",
            summary.delivered, summary.attempts
        ),
        Ok(Ok(Err(e))) => log_error(&e, &format!("Encountered error reporting {name}.")),
        Ok(Err(_)) => error!("Client for {name} panicked while reporting {records} records"),
        Err(_) => {
            let error = ClientError::ReportTimedOut(report_timeout);
            log_error(&error, &format!("Encountered error reporting {name}."));
            harvestable.client.abandoned(records, &error);
        }
    }
}
