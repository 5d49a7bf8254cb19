// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde_json::{json, Map, Value};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A telemetry record that can be put on the wire.
pub trait Record: Send {
    /// JSON representation of the record as expected by the ingest API.
    fn to_wire(&self) -> Value;
}

fn random_hex_id(words: usize) -> String {
    (0..words).map(|_| format!("{:016x}", fastrand::u64(..))).collect()
}

/// One unit of work in a distributed trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub id: String,
    pub trace_id: String,
    pub start_time: SystemTime,
    pub duration_ms: Option<u64>,
    pub parent_id: Option<String>,
    pub name: Option<String>,
    pub service_name: Option<String>,
    pub custom_attributes: Map<String, Value>,
}

impl Default for Span {
    fn default() -> Self {
        Self::new()
    }
}

impl Span {
    /// Starts a span now, with a random 16 hex char id and a random 32 hex
    /// char trace id.
    pub fn new() -> Self {
        Self {
            id: random_hex_id(1),
            trace_id: random_hex_id(2),
            start_time: SystemTime::now(),
            duration_ms: None,
            parent_id: None,
            name: None,
            service_name: None,
            custom_attributes: Map::new(),
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    pub fn with_parent_id(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom_attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_start_time(mut self, start_time: SystemTime) -> Self {
        self.start_time = start_time;
        self
    }

    /// Records the elapsed time since `start_time` unless a duration was
    /// already set.
    pub fn finish(&mut self) {
        self.finish_at(SystemTime::now());
    }

    /// Like [`Span::finish`], ending the span at `end_time`. An end before
    /// the start yields zero.
    pub fn finish_at(&mut self, end_time: SystemTime) {
        if self.duration_ms.is_none() {
            let elapsed = end_time
                .duration_since(self.start_time)
                .unwrap_or(Duration::ZERO);
            self.duration_ms = Some(elapsed.as_millis() as u64);
        }
    }

    fn timestamp_ms(&self) -> u64 {
        self.start_time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

impl Record for Span {
    fn to_wire(&self) -> Value {
        let mut attributes = self.custom_attributes.clone();
        if let Some(duration_ms) = self.duration_ms {
            attributes.insert("duration.ms".to_string(), json!(duration_ms));
        }
        if let Some(parent_id) = &self.parent_id {
            attributes.insert("parent.id".to_string(), json!(parent_id));
        }
        if let Some(name) = &self.name {
            attributes.insert("name".to_string(), json!(name));
        }
        if let Some(service_name) = &self.service_name {
            attributes.insert("service.name".to_string(), json!(service_name));
        }

        let mut wire = json!({
            "id": self.id,
            "trace.id": self.trace_id,
            "timestamp": self.timestamp_ms(),
        });
        if !attributes.is_empty() {
            wire["attributes"] = Value::Object(attributes);
        }
        wire
    }
}
