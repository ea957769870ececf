// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP delivery of encoded payloads to the trace agent.
//!
//! Every call is one PUT over a connection of its own. Network problems never escape this module:
//! they are logged and folded into a [`DeliveryOutcome`]. Only [`EncodingError`]s, which point at
//! bad data from the producer, are returned as errors.

use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url};
use tracing::{debug, warn};

use crate::config::Config;
use crate::encoder::BatchEncoder;
use crate::error::{ClientError, EncodingError};
use crate::http_utils::{build_client, build_headers, ClientIdentity};
use crate::span::{ServiceMap, TraceBatch};

pub const TRACES_ENDPOINT_PATH: &str = "/v0.3/traces";
pub const SERVICES_ENDPOINT_PATH: &str = "/v0.3/services";

/// Result of a single delivery attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The agent answered 200.
    Delivered(StatusCode),
    /// The agent answered with any other status.
    Rejected(StatusCode),
    /// No status was obtained: connect, write, read or timeout failure.
    TransportFailure,
}

impl DeliveryOutcome {
    fn from_status(status: StatusCode) -> Self {
        if status == StatusCode::OK {
            DeliveryOutcome::Delivered(status)
        } else {
            DeliveryOutcome::Rejected(status)
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered(_))
    }

    /// The agent's status code, if one was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            DeliveryOutcome::Delivered(status) | DeliveryOutcome::Rejected(status) => {
                Some(status.as_u16())
            }
            DeliveryOutcome::TransportFailure => None,
        }
    }
}

/// Client for the agent's v0.3 trace and service endpoints.
///
/// Holds only immutable configuration, so it can be cloned and shared between tasks freely.
#[derive(Clone, Debug)]
pub struct DeliveryClient {
    client: reqwest::Client,
    encoder: BatchEncoder,
    headers: HeaderMap,
    traces_endpoint: Url,
    services_endpoint: Url,
}

impl DeliveryClient {
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        Self::with_identity(config, ClientIdentity::default())
    }

    /// Like [`DeliveryClient::new`], reporting a custom client identity to the agent.
    pub fn with_identity(config: &Config, identity: ClientIdentity) -> Result<Self, ClientError> {
        let base_url = config.agent_base_url();
        let traces_endpoint = endpoint_url(&base_url, TRACES_ENDPOINT_PATH)?;
        let services_endpoint = endpoint_url(&base_url, SERVICES_ENDPOINT_PATH)?;
        let encoder = BatchEncoder::new(config.encoding);
        let headers = build_headers(encoder.content_type(), &identity)?;
        let client = build_client(config.connect_timeout, config.request_timeout)?;

        debug!(
            "Trace delivery client targeting {traces_endpoint} ({})",
            encoder.encoding()
        );
        Ok(DeliveryClient {
            client,
            encoder,
            headers,
            traces_endpoint,
            services_endpoint,
        })
    }

    /// Shortcut for a client with default settings pointed at `host:port`.
    pub fn from_host_port(host: &str, port: u16) -> Result<Self, ClientError> {
        let config = Config {
            agent_host: host.to_string(),
            agent_port: port,
            ..Config::default()
        };
        Self::new(&config)
    }

    pub fn traces_endpoint(&self) -> &Url {
        &self.traces_endpoint
    }

    pub fn services_endpoint(&self) -> &Url {
        &self.services_endpoint
    }

    /// Sends the batches, returning true iff the agent answered 200.
    ///
    /// An empty sequence is a success and touches no network.
    pub async fn send_traces(&self, batches: &[TraceBatch]) -> Result<bool, EncodingError> {
        Ok(self.deliver_traces(batches).await?.is_delivered())
    }

    /// Same as [`DeliveryClient::send_traces`], keeping the status code for the caller's retry
    /// policy.
    pub async fn deliver_traces(
        &self,
        batches: &[TraceBatch],
    ) -> Result<DeliveryOutcome, EncodingError> {
        if batches.is_empty() {
            debug!("No traces to send to the agent");
            return Ok(DeliveryOutcome::Delivered(StatusCode::OK));
        }
        let payload = self.encoder.encode_traces(batches)?;
        let outcome = self.put_payload(&self.traces_endpoint, payload).await;
        match outcome {
            DeliveryOutcome::Delivered(_) => {
                debug!("Successfully sent {} traces to the agent", batches.len());
            }
            DeliveryOutcome::Rejected(status) => warn!(
                "Error while sending {} traces to the agent. Status: {}",
                batches.len(),
                status.as_u16()
            ),
            DeliveryOutcome::TransportFailure => warn!(
                "Error while sending {} traces to the agent. Status: transport failure",
                batches.len()
            ),
        }
        Ok(outcome)
    }

    /// Sends service metadata. Absent metadata is a success and touches no network.
    pub async fn send_services(&self, services: Option<&ServiceMap>) -> Result<bool, EncodingError> {
        Ok(self.deliver_services(services).await?.is_delivered())
    }

    pub async fn deliver_services(
        &self,
        services: Option<&ServiceMap>,
    ) -> Result<DeliveryOutcome, EncodingError> {
        let Some(services) = services else {
            return Ok(DeliveryOutcome::Delivered(StatusCode::OK));
        };
        let payload = self.encoder.encode_services(services)?;
        let outcome = self.put_payload(&self.services_endpoint, payload).await;
        match outcome {
            DeliveryOutcome::Delivered(_) => {
                debug!("Successfully sent {} services to the agent", services.len());
            }
            DeliveryOutcome::Rejected(status) => warn!(
                "Error while sending {} services to the agent. Status: {}",
                services.len(),
                status.as_u16()
            ),
            DeliveryOutcome::TransportFailure => warn!(
                "Error while sending {} services to the agent. Status: transport failure",
                services.len()
            ),
        }
        Ok(outcome)
    }

    async fn put_payload(&self, endpoint: &Url, payload: Vec<u8>) -> DeliveryOutcome {
        let time = std::time::Instant::now();
        let response = self
            .client
            .put(endpoint.clone())
            .headers(self.headers.clone())
            .body(payload)
            .send()
            .await;
        let elapsed = time.elapsed();

        match response {
            Ok(response) => {
                let status = response.status();
                if status == StatusCode::OK {
                    debug!(
                        "Sent the payload to the agent in {} ms",
                        elapsed.as_millis()
                    );
                } else {
                    let body = response.text().await.unwrap_or_default();
                    warn!("Could not send the payload to the agent. Status: {status} Response: {body}");
                }
                DeliveryOutcome::from_status(status)
            }
            Err(e) => {
                if e.is_timeout() {
                    warn!(
                        "Could not send the payload to the agent: timed out after {} ms",
                        elapsed.as_millis()
                    );
                } else if e.is_connect() {
                    warn!("Could not connect to the agent at {endpoint}: {e}");
                } else {
                    warn!("Could not send the payload to the agent: {e}");
                }
                DeliveryOutcome::TransportFailure
            }
        }
    }
}

fn endpoint_url(base_url: &str, path: &str) -> Result<Url, ClientError> {
    let url = Url::parse(&format!("{base_url}{path}"))
        .map_err(|e| ClientError::InvalidEndpoint(format!("{base_url}{path}: {e}")))?;
    if url.host_str().is_none() {
        return Err(ClientError::InvalidEndpoint(format!(
            "{base_url}{path}: missing host"
        )));
    }
    Ok(url)
}
