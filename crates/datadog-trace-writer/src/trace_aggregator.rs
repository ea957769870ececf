// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Buffering of trace batches between producers and the flusher.
//!
//! The `TraceAggregator` is a FIFO queue of whole batches:
//! 1. Batches are appended with `add()`; when the queue is full the oldest one is evicted
//! 2. `get_payload()` pulls batches from the front until the span budget of a payload is reached
//! 3. Batches of a failed payload go back to the front with `requeue()`, keeping their order
//!
//! A batch is never split, so a single batch larger than the span budget is handed out alone.

use std::collections::VecDeque;
use tracing::warn;

use crate::span::TraceBatch;

/// A batch waiting for delivery, with the number of deliveries already tried.
#[derive(Clone, Debug, PartialEq)]
pub struct QueuedBatch {
    pub batch: TraceBatch,
    pub attempts: u32,
}

impl QueuedBatch {
    pub fn new(batch: TraceBatch) -> Self {
        QueuedBatch { batch, attempts: 0 }
    }

    fn span_count(&self) -> usize {
        self.batch.len()
    }
}

#[allow(clippy::module_name_repetitions)]
pub struct TraceAggregator {
    queue: VecDeque<QueuedBatch>,
    /// Span budget of one payload.
    max_payload_spans: usize,
    /// Queued batches before eviction.
    max_queue_items: usize,
}

impl TraceAggregator {
    pub fn new(max_payload_spans: usize, max_queue_items: usize) -> Self {
        TraceAggregator {
            queue: VecDeque::new(),
            max_payload_spans,
            max_queue_items,
        }
    }

    /// Appends a batch, evicting the oldest one when the queue is at capacity.
    pub fn add(&mut self, batch: QueuedBatch) {
        if self.queue.len() >= self.max_queue_items {
            if let Some(evicted) = self.queue.pop_front() {
                warn!(
                    "Trace aggregator queue full ({} items), dropping oldest trace batch ({} spans)",
                    self.max_queue_items,
                    evicted.span_count()
                );
            }
        }
        self.queue.push_back(batch);
    }

    /// Puts the batches of a failed payload back at the front of the queue, in their original
    /// order. Batches that no longer fit are dropped, newest first.
    pub fn requeue(&mut self, batches: Vec<QueuedBatch>) {
        for batch in batches.into_iter().rev() {
            if self.queue.len() >= self.max_queue_items {
                warn!(
                    "Trace aggregator queue full ({} items), dropping trace batch ({} spans) pending retry",
                    self.max_queue_items,
                    batch.span_count()
                );
                continue;
            }
            self.queue.push_front(batch);
        }
    }

    /// Returns the next payload's worth of batches, or an empty vector if nothing is queued.
    pub fn get_payload(&mut self) -> Vec<QueuedBatch> {
        let mut payload = Vec::new();
        let mut payload_spans = 0;

        while let Some(batch) = self.queue.pop_front() {
            let spans = batch.span_count();
            if !payload.is_empty() && payload_spans + spans > self.max_payload_spans {
                self.queue.push_front(batch);
                break;
            }
            payload_spans += spans;
            payload.push(batch);
            if payload_spans >= self.max_payload_spans {
                break;
            }
        }
        payload
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
