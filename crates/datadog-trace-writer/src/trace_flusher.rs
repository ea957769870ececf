// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The accumulation layer in front of the [`DeliveryClient`].
//!
//! Host glue hands finished batches to a [`BatchSink`]. The [`TraceWriter`] implementation buffers
//! them in a [`TraceAggregator`] and a background task flushes them to the agent on an interval.
//! Retrying is decided here, not in the client: the batches of a failed payload are requeued and
//! dropped once they have failed `max_flush_attempts` times.

use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::delivery::DeliveryClient;
use crate::span::{validate_batch, ServiceMap, TraceBatch};
use crate::trace_aggregator::{QueuedBatch, TraceAggregator};

/// Narrow adapter implemented by whatever consumes finished trace batches.
pub trait BatchSink: Send + Sync {
    fn on_batch_ready(&self, batch: TraceBatch);
}

enum WriterMessage {
    Batch(TraceBatch),
    Services(ServiceMap),
}

/// Buffers batches and service metadata, and flushes them through a [`DeliveryClient`].
pub struct TraceFlusher {
    client: DeliveryClient,
    aggregator: TraceAggregator,
    pending_services: Option<ServiceMap>,
    max_flush_attempts: u32,
}

impl TraceFlusher {
    pub fn new(client: DeliveryClient, config: &Config) -> Self {
        TraceFlusher {
            client,
            aggregator: TraceAggregator::new(config.max_payload_spans, config.max_queue_items),
            pending_services: None,
            max_flush_attempts: config.max_flush_attempts.max(1),
        }
    }

    /// Queues a batch for the next flush. Empty batches and batches that cannot be encoded are
    /// dropped here so they never reach a payload.
    pub fn add(&mut self, batch: TraceBatch) -> bool {
        if !accepts(&batch) {
            return false;
        }
        self.aggregator.add(QueuedBatch::new(batch));
        true
    }

    /// Replaces any service metadata not yet sent.
    pub fn set_services(&mut self, services: ServiceMap) {
        self.pending_services = Some(services);
    }

    /// Number of batches waiting for delivery.
    pub fn queued(&self) -> usize {
        self.aggregator.len()
    }

    pub fn has_pending_services(&self) -> bool {
        self.pending_services.is_some()
    }

    /// Sends pending service metadata, then queued batches payload by payload.
    ///
    /// Stops at the first failed payload. Returns true if nothing failed.
    pub async fn flush(&mut self) -> bool {
        let mut flushed = true;

        if let Some(services) = self.pending_services.take() {
            match self.client.deliver_services(Some(&services)).await {
                Ok(outcome) if outcome.is_delivered() => {}
                Ok(_) => {
                    flushed = false;
                    self.pending_services = Some(services);
                }
                Err(e) => {
                    flushed = false;
                    error!("Failed to prepare service payload. Data dropped: {e}");
                }
            }
        }

        loop {
            let payload = self.aggregator.get_payload();
            if payload.is_empty() {
                break;
            }
            let (batches, attempts): (Vec<TraceBatch>, Vec<u32>) = payload
                .into_iter()
                .map(|queued| (queued.batch, queued.attempts))
                .unzip();
            debug!("Flushing {} traces", batches.len());

            match self.client.deliver_traces(&batches).await {
                Ok(outcome) if outcome.is_delivered() => {}
                Ok(_) => {
                    flushed = false;
                    let retry = self.retryable(batches, attempts);
                    if !retry.is_empty() {
                        debug!("Retrying {} traces on next flush", retry.len());
                    }
                    self.aggregator.requeue(retry);
                    break;
                }
                Err(e) => {
                    flushed = false;
                    error!("Failed to prepare trace payload. Data dropped: {e}");
                }
            }
        }
        flushed
    }

    fn retryable(&self, batches: Vec<TraceBatch>, attempts: Vec<u32>) -> Vec<QueuedBatch> {
        batches
            .into_iter()
            .zip(attempts)
            .filter_map(|(batch, attempts)| {
                let attempts = attempts + 1;
                if attempts >= self.max_flush_attempts {
                    warn!(
                        "Dropping trace batch ({} spans) after {attempts} failed attempts",
                        batch.len()
                    );
                    None
                } else {
                    Some(QueuedBatch { batch, attempts })
                }
            })
            .collect()
    }

    fn receive(&mut self, message: WriterMessage) {
        match message {
            WriterMessage::Batch(batch) => {
                self.add(batch);
            }
            WriterMessage::Services(services) => self.set_services(services),
        }
    }
}

/// Producer side of a running [`TraceWriter`]. Never blocks the caller.
#[derive(Clone)]
pub struct TraceWriterHandle {
    tx: Sender<WriterMessage>,
}

impl TraceWriterHandle {
    /// Queues service metadata for the next flush. Returns false if it could not be queued.
    pub fn update_services(&self, services: ServiceMap) -> bool {
        self.try_send(WriterMessage::Services(services))
    }

    fn try_send(&self, message: WriterMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Trace writer channel full, dropping data");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Trace writer stopped, dropping data");
                false
            }
        }
    }
}

impl BatchSink for TraceWriterHandle {
    fn on_batch_ready(&self, batch: TraceBatch) {
        if accepts(&batch) {
            self.try_send(WriterMessage::Batch(batch));
        }
    }
}

fn accepts(batch: &TraceBatch) -> bool {
    if batch.is_empty() {
        return false;
    }
    if let Err(e) = validate_batch(batch) {
        error!("Dropping trace batch that cannot be encoded: {e}");
        return false;
    }
    true
}

pub struct TraceWriter;

impl TraceWriter {
    /// Starts the background flush task.
    ///
    /// Cancelling the token drains what producers already queued, flushes once more and ends the
    /// task.
    pub fn spawn(
        client: DeliveryClient,
        config: &Config,
        cancel: CancellationToken,
    ) -> (TraceWriterHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let flusher = TraceFlusher::new(client, config);
        let task = tokio::spawn(run(flusher, rx, config.flush_interval, cancel));
        (TraceWriterHandle { tx }, task)
    }
}

async fn run(
    mut flusher: TraceFlusher,
    mut rx: Receiver<WriterMessage>,
    flush_interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval(flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => flusher.receive(message),
                None => break,
            },
            _ = ticker.tick() => {
                flusher.flush().await;
            }
        }
    }

    rx.close();
    while let Some(message) = rx.recv().await {
        flusher.receive(message);
    }
    if !flusher.flush().await {
        warn!(
            "Trace writer stopped with {} traces undelivered",
            flusher.queued()
        );
    }
    debug!("Trace writer stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::encoder::Encoding;
    use crate::span::{ServiceMetadata, Span};
    use mockito::{Matcher, Server};
    use tracing_test::traced_test;

    fn test_config(server: &Server) -> Config {
        let addr = server.socket_address();
        Config {
            agent_host: addr.ip().to_string(),
            agent_port: addr.port(),
            flush_interval: Duration::from_secs(60),
            ..Config::default()
        }
    }

    fn test_flusher(config: &Config) -> TraceFlusher {
        TraceFlusher::new(DeliveryClient::new(config).unwrap(), config)
    }

    fn batch(trace_id: u64) -> TraceBatch {
        vec![
            Span::new(trace_id, 1, 0, "parent", "svc"),
            Span::new(trace_id, 2, 1, "child", "svc"),
        ]
    }

    #[tokio::test]
    async fn test_flush_sends_queued_batches_in_one_payload() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/v0.3/traces")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let mut flusher = test_flusher(&test_config(&server));
        flusher.add(batch(1));
        flusher.add(batch(2));

        assert!(flusher.flush().await);
        assert_eq!(flusher.queued(), 0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_flush_with_nothing_queued_skips_network() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let mut flusher = test_flusher(&test_config(&server));
        assert!(flusher.flush().await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_flush_requeues_batches() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("PUT", "/v0.3/traces")
            .with_status(500)
            .create_async()
            .await;

        let mut flusher = test_flusher(&test_config(&server));
        flusher.add(batch(1));
        flusher.add(batch(2));

        assert!(!flusher.flush().await);
        assert_eq!(flusher.queued(), 2);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_add_drops_only_the_unencodable_batch() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/v0.3/traces")
            .match_body(Matcher::Regex(
                r#"^\[\[\{"trace_id":1,.*\],\[\{"trace_id":3,.*\]\]$"#.to_string(),
            ))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let config = Config {
            encoding: Encoding::Json,
            ..test_config(&server)
        };
        let mut flusher = test_flusher(&config);
        assert!(flusher.add(batch(1)));
        assert!(!flusher.add(vec![
            Span::new(2, 1, 0, "op", "svc").with_tag("x", f64::NAN)
        ]));
        assert!(!flusher.add(Vec::new()));
        assert!(flusher.add(batch(3)));
        assert_eq!(flusher.queued(), 2);

        assert!(flusher.flush().await);
        assert_eq!(flusher.queued(), 0);
        assert!(logs_contain("Dropping trace batch that cannot be encoded"));
        mock.assert_async().await;
    }

    #[tokio::test]
    #[traced_test]
    async fn test_batches_dropped_after_max_attempts() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/v0.3/traces")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let config = Config {
            max_flush_attempts: 2,
            ..test_config(&server)
        };
        let mut flusher = test_flusher(&config);
        flusher.add(batch(1));

        assert!(!flusher.flush().await);
        assert_eq!(flusher.queued(), 1);
        assert!(!flusher.flush().await);
        assert_eq!(flusher.queued(), 0);
        assert!(logs_contain("after 2 failed attempts"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_services_stay_pending() {
        let mut server = Server::new_async().await;
        let failing = server
            .mock("PUT", "/v0.3/services")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let mut flusher = test_flusher(&test_config(&server));
        let mut services = ServiceMap::new();
        services.insert("web".to_string(), ServiceMetadata::new("django", "web"));
        flusher.set_services(services);

        assert!(!flusher.flush().await);
        assert!(flusher.has_pending_services());
        failing.assert_async().await;
        failing.remove_async().await;

        let succeeding = server
            .mock("PUT", "/v0.3/services")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        assert!(flusher.flush().await);
        assert!(!flusher.has_pending_services());
        succeeding.assert_async().await;
    }

    #[tokio::test]
    async fn test_writer_flushes_on_cancel() {
        let mut server = Server::new_async().await;
        let traces = server
            .mock("PUT", "/v0.3/traces")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let services = server
            .mock("PUT", "/v0.3/services")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let config = test_config(&server);
        let cancel = CancellationToken::new();
        let (handle, task) =
            TraceWriter::spawn(DeliveryClient::new(&config).unwrap(), &config, cancel.clone());

        handle.on_batch_ready(batch(1));
        handle.on_batch_ready(batch(2));
        let mut service_map = ServiceMap::new();
        service_map.insert("web".to_string(), ServiceMetadata::new("django", "web"));
        assert!(handle.update_services(service_map));

        cancel.cancel();
        task.await.unwrap();

        traces.assert_async().await;
        services.assert_async().await;
    }

    #[tokio::test]
    async fn test_writer_flushes_on_interval() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/v0.3/traces")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let config = Config {
            flush_interval: Duration::from_millis(50),
            ..test_config(&server)
        };
        let cancel = CancellationToken::new();
        let (handle, task) =
            TraceWriter::spawn(DeliveryClient::new(&config).unwrap(), &config, cancel.clone());

        handle.on_batch_ready(batch(1));

        let flushed = async {
            while !mock.matched_async().await {
                time::sleep(Duration::from_millis(10)).await;
            }
        };
        time::timeout(Duration::from_secs(2), flushed)
            .await
            .expect("timed out before the writer flushed");

        cancel.cancel();
        task.await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    #[traced_test]
    async fn test_writer_drops_unencodable_batch() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let config = test_config(&server);
        let cancel = CancellationToken::new();
        let (handle, task) =
            TraceWriter::spawn(DeliveryClient::new(&config).unwrap(), &config, cancel.clone());

        handle.on_batch_ready(vec![Span::new(1, 1, 0, "op", "svc").with_tag("x", f64::NAN)]);
        handle.on_batch_ready(Vec::new());

        cancel.cancel();
        task.await.unwrap();

        assert!(logs_contain("Dropping trace batch that cannot be encoded"));
        mock.assert_async().await;
    }

    #[tokio::test]
    #[traced_test]
    async fn test_writer_drops_when_channel_full() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/v0.3/traces")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let config = Config {
            channel_capacity: 1,
            ..test_config(&server)
        };
        let cancel = CancellationToken::new();
        let (handle, task) =
            TraceWriter::spawn(DeliveryClient::new(&config).unwrap(), &config, cancel.clone());

        // The writer task cannot run before this test yields, so the second batch finds the
        // channel full.
        handle.on_batch_ready(batch(1));
        handle.on_batch_ready(batch(2));
        assert!(logs_contain("Trace writer channel full"));

        cancel.cancel();
        task.await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    #[traced_test]
    async fn test_handle_after_shutdown() {
        let server = Server::new_async().await;
        let config = test_config(&server);
        let cancel = CancellationToken::new();
        let (handle, task) =
            TraceWriter::spawn(DeliveryClient::new(&config).unwrap(), &config, cancel.clone());

        cancel.cancel();
        task.await.unwrap();

        assert!(!handle.update_services(ServiceMap::new()));
        assert!(logs_contain("Trace writer stopped, dropping data"));
    }
}
