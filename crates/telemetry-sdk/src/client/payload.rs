// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::buffer::Batch;
use crate::error::ClientError;
use flate2::{write::GzEncoder, Compression};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Write;

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(flatten)]
    records: BTreeMap<&'a str, &'a [Value]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    common_attributes: Option<&'a Map<String, Value>>,
}

/// Builds the body the ingest API expects, a one element array holding the
/// envelope `{"<payload_type>": [...], "common_attributes": {...}}`,
/// serialized to JSON and gzipped when `gzip` is set.
pub fn encode_payload(payload_type: &str, batch: &Batch, gzip: bool) -> Result<Vec<u8>, ClientError> {
    let envelope = Envelope {
        records: BTreeMap::from([(payload_type, batch.records.as_slice())]),
        common_attributes: batch.common_attributes.as_ref(),
    };

    let body = serde_json::to_vec(&[envelope]).map_err(|e| ClientError::Encode(e.to_string()))?;

    if gzip {
        compress(&body).map_err(|e| ClientError::Encode(format!("gzip: {e}")))
    } else {
        Ok(body)
    }
}

fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
