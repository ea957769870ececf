// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::EncodingError;
use crate::span::{validate_batch, ServiceMap, TraceBatch};

/// Self-describing wire formats accepted by the agent's v0.3 endpoints.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Encoding {
    #[default]
    Msgpack,
    Json,
}

impl Encoding {
    pub fn content_type(&self) -> &'static str {
        match self {
            Encoding::Msgpack => "application/msgpack",
            Encoding::Json => "application/json",
        }
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "msgpack" => Ok(Encoding::Msgpack),
            "json" => Ok(Encoding::Json),
            other => Err(format!("unknown trace encoding: {other}")),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Msgpack => write!(f, "msgpack"),
            Encoding::Json => write!(f, "json"),
        }
    }
}

/// Serializes trace batches and service metadata into request bodies.
///
/// Batch order and span order within each batch are preserved. Msgpack output uses named fields
/// so a collector can decode it without a schema.
#[derive(Clone, Copy, Debug, Default)]
pub struct BatchEncoder {
    encoding: Encoding,
}

impl BatchEncoder {
    pub fn new(encoding: Encoding) -> Self {
        BatchEncoder { encoding }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn content_type(&self) -> &'static str {
        self.encoding.content_type()
    }

    /// Fails without producing a partial payload if any span cannot be represented.
    pub fn encode_traces(&self, batches: &[TraceBatch]) -> Result<Vec<u8>, EncodingError> {
        for batch in batches {
            validate_batch(batch)?;
        }
        self.encode(batches)
    }

    pub fn encode_services(&self, services: &ServiceMap) -> Result<Vec<u8>, EncodingError> {
        self.encode(services)
    }

    pub fn decode_traces(&self, payload: &[u8]) -> Result<Vec<TraceBatch>, EncodingError> {
        self.decode(payload)
    }

    pub fn decode_services(&self, payload: &[u8]) -> Result<ServiceMap, EncodingError> {
        self.decode(payload)
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, EncodingError> {
        match self.encoding {
            Encoding::Msgpack => Ok(rmp_serde::to_vec_named(value)?),
            Encoding::Json => Ok(serde_json::to_vec(value)?),
        }
    }

    fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, EncodingError> {
        match self.encoding {
            Encoding::Msgpack => Ok(rmp_serde::from_slice(payload)?),
            Encoding::Json => Ok(serde_json::from_slice(payload)?),
        }
    }
}
