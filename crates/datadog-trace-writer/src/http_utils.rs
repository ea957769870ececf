// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use core::time::Duration;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

use crate::error::ClientError;

pub const HEADER_CLIENT_LANG: &str = "X-Client-Lang";
pub const HEADER_CLIENT_LANG_VERSION: &str = "X-Client-Lang-Version";
pub const HEADER_CLIENT_INTERPRETER: &str = "X-Client-Interpreter";
pub const HEADER_CLIENT_TRACER_VERSION: &str = "X-Client-Tracer-Version";

/// Who is sending the payload. Lets the agent make compatibility decisions without a handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientIdentity {
    pub lang: String,
    pub lang_version: String,
    pub interpreter: String,
    pub tracer_version: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        ClientIdentity {
            lang: "rust".to_string(),
            lang_version: env!("DD_WRITER_RUSTC_VERSION").to_string(),
            interpreter: "rustc".to_string(),
            tracer_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Builds the headers sent with every PUT, whatever the payload.
pub fn build_headers(
    content_type: &'static str,
    identity: &ClientIdentity,
) -> Result<HeaderMap, ClientError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    for (name, value) in [
        (HEADER_CLIENT_LANG, &identity.lang),
        (HEADER_CLIENT_LANG_VERSION, &identity.lang_version),
        (HEADER_CLIENT_INTERPRETER, &identity.interpreter),
        (HEADER_CLIENT_TRACER_VERSION, &identity.tracer_version),
    ] {
        let value = HeaderValue::from_str(value).map_err(|_| ClientError::InvalidHeader {
            name,
            value: value.clone(),
        })?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Builds a reqwest client bounded by the given timeouts.
///
/// Idle connections are never kept, so every delivery attempt opens and owns its own
/// connection. The agent is local: proxy settings from the environment are ignored.
pub fn build_client(
    connect_timeout: Duration,
    request_timeout: Duration,
) -> Result<reqwest::Client, ClientError> {
    Ok(reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()?)
}
