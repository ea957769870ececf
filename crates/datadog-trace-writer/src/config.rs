// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::encoder::Encoding;

const DEFAULT_AGENT_HOST: &str = "localhost";
const DEFAULT_AGENT_PORT: u16 = 8126;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 1;
const DEFAULT_MAX_QUEUE_ITEMS: usize = 1_000;
const DEFAULT_MAX_PAYLOAD_SPANS: usize = 1_000;
const DEFAULT_MAX_FLUSH_ATTEMPTS: u32 = 3;
const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;

#[derive(Clone, Debug)]
pub struct Config {
    /// Full base url of the agent. Takes precedence over `agent_host`/`agent_port`.
    pub agent_url: Option<String>,
    pub agent_host: String,
    pub agent_port: u16,
    /// Upper bound on a whole delivery attempt, connect included
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub encoding: Encoding,
    /// how often the writer flushes buffered batches
    pub flush_interval: Duration,
    /// batches buffered by the writer before the oldest is evicted
    pub max_queue_items: usize,
    /// span budget of one payload; a single batch over budget is still sent whole
    pub max_payload_spans: usize,
    /// deliveries tried for a batch before it is dropped
    pub max_flush_attempts: u32,
    /// capacity of the channel between producers and the writer task
    pub channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            agent_url: None,
            agent_host: DEFAULT_AGENT_HOST.to_string(),
            agent_port: DEFAULT_AGENT_PORT,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            encoding: Encoding::default(),
            flush_interval: Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS),
            max_queue_items: DEFAULT_MAX_QUEUE_ITEMS,
            max_payload_spans: DEFAULT_MAX_PAYLOAD_SPANS,
            max_flush_attempts: DEFAULT_MAX_FLUSH_ATTEMPTS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl Config {
    /// Reads the configuration from `DD_*` environment variables.
    ///
    /// Absent or unparseable values fall back to their defaults.
    pub fn new() -> Self {
        let defaults = Config::default();
        Config {
            agent_url: env::var("DD_TRACE_AGENT_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            agent_host: env::var("DD_AGENT_HOST")
                .ok()
                .filter(|host| !host.trim().is_empty())
                .unwrap_or(defaults.agent_host),
            agent_port: parse_env("DD_TRACE_AGENT_PORT").unwrap_or(defaults.agent_port),
            request_timeout: parse_env("DD_TRACE_AGENT_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            connect_timeout: parse_env("DD_TRACE_AGENT_CONNECT_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.connect_timeout),
            encoding: parse_env("DD_TRACE_ENCODING").unwrap_or(defaults.encoding),
            flush_interval: parse_env("DD_TRACE_FLUSH_INTERVAL")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.flush_interval),
            max_queue_items: parse_env("DD_TRACE_MAX_QUEUE_ITEMS")
                .filter(|items| *items > 0)
                .unwrap_or(defaults.max_queue_items),
            max_payload_spans: parse_env("DD_TRACE_MAX_PAYLOAD_SPANS")
                .filter(|spans| *spans > 0)
                .unwrap_or(defaults.max_payload_spans),
            max_flush_attempts: parse_env("DD_TRACE_MAX_FLUSH_ATTEMPTS")
                .filter(|attempts| *attempts > 0)
                .unwrap_or(defaults.max_flush_attempts),
            channel_capacity: defaults.channel_capacity,
        }
    }

    /// Base url of the agent, without a trailing slash.
    pub fn agent_base_url(&self) -> String {
        match &self.agent_url {
            Some(url) => url.trim().trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.agent_host, self.agent_port),
        }
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|val| val.trim().parse::<T>().ok())
}
