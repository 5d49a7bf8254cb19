// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::span::{Record, Span};
use serde_json::{Map, Value};
use std::mem;
use std::sync::Mutex;

/// Wire-encoded records drained from a buffer in one harvest, plus the
/// attributes shared by all of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub records: Vec<Value>,
    pub common_attributes: Option<Map<String, Value>>,
}

impl Batch {
    pub fn new(records: Vec<Value>) -> Self {
        Self {
            records,
            common_attributes: None,
        }
    }

    pub fn with_common_attributes(mut self, common_attributes: Map<String, Value>) -> Self {
        self.common_attributes = Some(common_attributes);
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Splits the batch into two halves, keeping record order. Both halves
    /// carry the common attributes.
    pub fn split(mut self) -> (Batch, Batch) {
        let tail = self.records.split_off(self.records.len() / 2);
        let second = Batch {
            records: tail,
            common_attributes: self.common_attributes.clone(),
        };
        (self, second)
    }
}

/// Accumulates records between harvests.
pub trait Buffer: Send + Sync {
    /// Drains everything recorded so far. Records added concurrently land
    /// either in this batch or in the next one, never in both.
    fn flush(&self) -> Batch;
}

#[derive(Debug, Default)]
struct Pending {
    spans: Vec<Span>,
    common_attributes: Option<Map<String, Value>>,
}

/// Buffer of finished spans.
#[derive(Debug, Default)]
pub struct SpanBuffer {
    pending: Mutex<Pending>,
}

impl SpanBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_common_attributes(common_attributes: Map<String, Value>) -> Self {
        Self {
            pending: Mutex::new(Pending {
                spans: Vec::new(),
                common_attributes: Some(common_attributes),
            }),
        }
    }

    pub fn record(&self, span: Span) {
        #[allow(clippy::expect_used)]
        let mut pending = self.pending.lock().expect("lock poisoned");
        pending.spans.push(span);
    }

    pub fn len(&self) -> usize {
        #[allow(clippy::expect_used)]
        let pending = self.pending.lock().expect("lock poisoned");
        pending.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Buffer for SpanBuffer {
    fn flush(&self) -> Batch {
        let (spans, common_attributes) = {
            #[allow(clippy::expect_used)]
            let mut pending = self.pending.lock().expect("lock poisoned");
            (
                mem::take(&mut pending.spans),
                pending.common_attributes.clone(),
            )
        };

        Batch {
            records: spans.iter().map(Record::to_wire).collect(),
            common_attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_flush_drains_buffer() {
        let buffer = SpanBuffer::new();
        buffer.record(Span::new().with_name("a"));
        buffer.record(Span::new().with_name("b"));
        assert_eq!(buffer.len(), 2);

        let batch = buffer.flush();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.records[0]["attributes"]["name"], json!("a"));
        assert_eq!(batch.records[1]["attributes"]["name"], json!("b"));
        assert!(buffer.is_empty());
        assert!(buffer.flush().is_empty());
    }

    #[test]
    fn test_flush_carries_common_attributes() {
        let mut common = Map::new();
        common.insert("host".to_string(), json!("web-1"));
        let buffer = SpanBuffer::with_common_attributes(common.clone());
        buffer.record(Span::new());

        let batch = buffer.flush();
        assert_eq!(batch.common_attributes, Some(common));
    }

    #[test]
    fn test_split_halves_keep_order_and_attributes() {
        let mut common = Map::new();
        common.insert("env".to_string(), json!("prod"));
        let batch = Batch::new((0..5).map(|i| json!(i)).collect())
            .with_common_attributes(common.clone());

        let (first, second) = batch.split();
        assert_eq!(first.records, vec![json!(0), json!(1)]);
        assert_eq!(second.records, vec![json!(2), json!(3), json!(4)]);
        assert_eq!(first.common_attributes, Some(common.clone()));
        assert_eq!(second.common_attributes, Some(common));
    }

    #[test]
    fn test_concurrent_record_and_flush_loses_nothing() {
        let buffer = Arc::new(SpanBuffer::new());
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        buffer.record(Span::new());
                    }
                })
            })
            .collect();

        let mut seen = Vec::new();
        for _ in 0..20 {
            seen.extend(buffer.flush().records);
        }
        for writer in writers {
            writer.join().expect("writer thread panicked");
        }
        seen.extend(buffer.flush().records);

        assert_eq!(seen.len(), 1000);
        let mut ids: Vec<_> = seen.iter().map(|r| r["id"].to_string()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 1000);
    }
}
