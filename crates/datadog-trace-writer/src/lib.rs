// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of finished traces to a local Datadog trace agent.
//!
//! Producers hand over already formed [`span::TraceBatch`]es. The
//! [`delivery::DeliveryClient`] encodes them with [`encoder::BatchEncoder`] and PUTs them to the
//! agent's `/v0.3/traces` endpoint, reporting the outcome instead of raising. The
//! [`trace_flusher::TraceWriter`] is the accumulation layer in front of the client: it buffers
//! batches behind the [`trace_flusher::BatchSink`] adapter and flushes them on an interval.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod delivery;
pub mod encoder;
pub mod error;
pub mod http_utils;
pub mod span;
pub mod trace_aggregator;
pub mod trace_flusher;
