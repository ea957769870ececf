// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Span, batch and service records exactly as they go over the wire to the agent.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::EncodingError;

/// Ordered spans belonging to one logical trace. Never split across deliveries.
pub type TraceBatch = Vec<Span>;

/// Service name to service metadata, as sent to the services endpoint.
pub type ServiceMap = HashMap<String, ServiceMetadata>;

/// A primitive tag value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl TagValue {
    fn is_representable(&self) -> bool {
        match self {
            TagValue::Float(value) => value.is_finite(),
            _ => true,
        }
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        TagValue::Bool(value)
    }
}

impl From<i32> for TagValue {
    fn from(value: i32) -> Self {
        TagValue::Int(i64::from(value))
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        TagValue::Int(value)
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        TagValue::Float(value)
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::String(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::String(value)
    }
}

/// A single traced operation. Timestamps and durations are in nanoseconds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub trace_id: u64,
    pub span_id: u64,
    pub parent_id: u64,
    pub name: String,
    pub resource: String,
    pub service: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub span_type: Option<String>,
    pub start: i64,
    pub duration: i64,
    #[serde(with = "error_flag")]
    pub error: bool,
    #[serde(default)]
    pub meta: BTreeMap<String, TagValue>,
}

impl Span {
    /// Creates a span whose resource defaults to its operation name.
    pub fn new(trace_id: u64, span_id: u64, parent_id: u64, name: &str, service: &str) -> Self {
        Span {
            trace_id,
            span_id,
            parent_id,
            name: name.to_string(),
            resource: name.to_string(),
            service: service.to_string(),
            ..Default::default()
        }
    }

    pub fn with_resource(mut self, resource: &str) -> Self {
        self.resource = resource.to_string();
        self
    }

    pub fn with_type(mut self, span_type: &str) -> Self {
        self.span_type = Some(span_type.to_string());
        self
    }

    pub fn with_timing(mut self, start: i64, duration: i64) -> Self {
        self.start = start;
        self.duration = duration;
        self
    }

    pub fn with_error(mut self, error: bool) -> Self {
        self.error = error;
        self
    }

    pub fn with_tag(mut self, key: &str, value: impl Into<TagValue>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    /// Adds a tag coming from loosely typed host glue.
    ///
    /// Objects, arrays and null have no primitive representation and are rejected.
    pub fn try_with_json_tag(
        mut self,
        key: &str,
        value: serde_json::Value,
    ) -> Result<Self, EncodingError> {
        let tag = match value {
            serde_json::Value::Bool(b) => TagValue::Bool(b),
            serde_json::Value::String(s) => TagValue::String(s),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => TagValue::Int(i),
                None => match n.as_f64() {
                    Some(f) => TagValue::Float(f),
                    None => {
                        return Err(EncodingError::NonPrimitiveTag {
                            key: key.to_string(),
                            span_id: self.span_id,
                        })
                    }
                },
            },
            serde_json::Value::Null
            | serde_json::Value::Array(_)
            | serde_json::Value::Object(_) => {
                return Err(EncodingError::NonPrimitiveTag {
                    key: key.to_string(),
                    span_id: self.span_id,
                })
            }
        };
        self.meta.insert(key.to_string(), tag);
        Ok(self)
    }

    /// Checks that every field of the span can be written without loss.
    pub fn validate(&self) -> Result<(), EncodingError> {
        match self.meta.iter().find(|(_, value)| !value.is_representable()) {
            Some((key, _)) => Err(EncodingError::NonFiniteTag {
                key: key.clone(),
                span_id: self.span_id,
            }),
            None => Ok(()),
        }
    }
}

/// Checks every span of a batch, stopping at the first unrepresentable one.
pub fn validate_batch(batch: &[Span]) -> Result<(), EncodingError> {
    batch.iter().try_for_each(Span::validate)
}

/// Descriptive attributes of a service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMetadata {
    pub app: String,
    pub app_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

impl ServiceMetadata {
    pub fn new(app: &str, app_type: &str) -> Self {
        ServiceMetadata {
            app: app.to_string(),
            app_type: app_type.to_string(),
            env: None,
        }
    }

    pub fn with_env(mut self, env: &str) -> Self {
        self.env = Some(env.to_string());
        self
    }
}

/// The agent expects the error flag as an integer.
mod error_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(error: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(i32::from(*error))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(i32::deserialize(deserializer)? != 0)
    }
}
