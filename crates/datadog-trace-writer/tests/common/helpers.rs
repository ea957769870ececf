// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use datadog_trace_writer::config::Config;
use datadog_trace_writer::span::{Span, TraceBatch};
use std::time::Duration;

/// Create a trace of `spans` spans, all children of the first one. Deterministic for a given id.
pub fn create_test_trace(trace_id: u64, spans: u64) -> TraceBatch {
    let start = 1_700_000_000_000_000_000 + trace_id as i64;
    (0..spans)
        .map(|i| {
            let parent_id = if i == 0 { 0 } else { trace_id * 100 };
            Span::new(trace_id, trace_id * 100 + i, parent_id, "http.request", "web")
                .with_timing(start, 1_000_000)
                .with_tag("trace.index", i as i64)
        })
        .collect()
}

/// Config pointing at a local agent with short timeouts
pub fn test_config(host: &str, port: u16) -> Config {
    Config {
        agent_host: host.to_string(),
        agent_port: port,
        connect_timeout: Duration::from_millis(500),
        request_timeout: Duration::from_secs(2),
        ..Config::default()
    }
}
