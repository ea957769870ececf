// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while turning spans or service metadata into a payload.
///
/// These indicate malformed data handed over by the producer and are the only errors the
/// delivery path lets through to the caller.
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("tag `{key}` on span {span_id} is not a primitive value")]
    NonPrimitiveTag { key: String, span_id: u64 },

    #[error("tag `{key}` on span {span_id} is not a finite number")]
    NonFiniteTag { key: String, span_id: u64 },

    #[error("failed to encode msgpack payload: {0}")]
    MsgpackEncode(#[from] rmp_serde::encode::Error),

    #[error("failed to decode msgpack payload: {0}")]
    MsgpackDecode(#[from] rmp_serde::decode::Error),

    #[error("failed to process json payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while building a [`crate::delivery::DeliveryClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Invalid agent endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid header value for {name}: {value}")]
    InvalidHeader { name: &'static str, value: String },

    #[error("Failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
