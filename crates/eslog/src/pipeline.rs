// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Owner of one ingress queue and the workers draining it.

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{EnqueueError, PipelineError};
use crate::hook::{FailureHook, LogAndDrop};
use crate::pool::{WorkerPool, WorkerSettings};
use crate::queue::IngressQueue;
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::transport::{BulkTransport, ElasticsearchTransport};
use crate::writer::{enqueue_counted, PipelineWriter};

/// A running log pipeline.
///
/// Created with the workers already started. Producers reach it through
/// [`Pipeline::enqueue`] or any number of [`PipelineWriter`]s. Call
/// [`Pipeline::shutdown`] to deliver what is still buffered; dropping the
/// pipeline only closes the queue and lets the workers finish unsupervised.
#[derive(Debug)]
pub struct Pipeline {
    queue: Arc<IngressQueue>,
    stats: Arc<PipelineStats>,
    pool: Option<WorkerPool>,
}

impl Pipeline {
    /// Starts a pipeline shipping to the Elasticsearch cluster described by
    /// `config`. Must be called from within a tokio runtime.
    pub fn new(config: &Config) -> Result<Self, PipelineError> {
        config.validate()?;
        let transport = ElasticsearchTransport::new(config)?;
        Self::with_transport(config, Arc::new(transport), Arc::new(LogAndDrop))
    }

    /// Like [`Pipeline::new`], but when `verify_connectivity` is set the
    /// cluster must answer a ping before any worker is started.
    pub async fn connect(config: &Config) -> Result<Self, PipelineError> {
        config.validate()?;
        let transport = ElasticsearchTransport::new(config)?;
        if config.verify_connectivity {
            transport.ping().await.map_err(|e| {
                PipelineError::Unreachable(format!("{}: {e}", config.base_url()))
            })?;
            debug!("ESLOG | Connected to {}", config.base_url());
        }
        Self::with_transport(config, Arc::new(transport), Arc::new(LogAndDrop))
    }

    /// Starts a pipeline on a custom transport and failure hook.
    pub fn with_transport(
        config: &Config,
        transport: Arc<dyn BulkTransport>,
        failure_hook: Arc<dyn FailureHook>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| PipelineError::Creation(format!("no tokio runtime available: {e}")))?;

        let (queue, receiver) = IngressQueue::bounded(config.max_queue_size);
        let stats = Arc::new(PipelineStats::default());
        let settings = WorkerSettings {
            workers: config.workers,
            max_batch_size: config.max_batch_size,
            flush_interval: config.flush_interval,
        };
        let pool = WorkerPool::start(
            &runtime,
            settings,
            &receiver,
            &transport,
            &failure_hook,
            &stats,
        );
        debug!(
            "ESLOG | Pipeline started with {} workers, queue capacity {}, batch size {}",
            pool.len(),
            queue.capacity(),
            config.max_batch_size
        );

        Ok(Pipeline {
            queue: Arc::new(queue),
            stats,
            pool: Some(pool),
        })
    }

    /// Hands one record to the pipeline without waiting.
    ///
    /// A [`EnqueueError::QueueFull`] record is dropped; do not retry in a loop.
    pub fn enqueue(&self, record: &[u8]) -> Result<(), EnqueueError> {
        enqueue_counted(&self.queue, &self.stats, record)
    }

    #[must_use]
    pub fn writer(&self) -> PipelineWriter {
        PipelineWriter::new(Arc::clone(&self.queue), Arc::clone(&self.stats))
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stops accepting records, waits until every worker has flushed its tail
    /// and terminated, then returns.
    ///
    /// Failed final flushes are reported to the failure hook and do not make
    /// shutdown fail; only a panicked worker does.
    pub async fn shutdown(mut self) -> Result<(), PipelineError> {
        self.queue.close();
        let result = match self.pool.take() {
            Some(pool) => pool.join().await.map(|summaries| {
                let flushes: usize = summaries.iter().map(|s| s.flushes).sum();
                debug!(
                    "ESLOG | {} workers terminated after {flushes} flushes",
                    summaries.len()
                );
            }),
            None => Ok(()),
        };

        let snapshot = self.stats.snapshot();
        info!(
            "ESLOG | Pipeline stopped: accepted={} rejected_full={} rejected_closed={} flushed_records={} dropped_records={}",
            snapshot.accepted,
            snapshot.rejected_full,
            snapshot.rejected_closed,
            snapshot.flushed_records,
            snapshot.dropped_records
        );
        result
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.queue.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingTransport;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;
    use tracing_test::traced_test;

    use crate::transport::{BulkRequest, TransportError};

    fn config(max_queue_size: usize, workers: usize, max_batch_size: usize) -> Config {
        Config {
            log_index: "app-logs".to_string(),
            max_queue_size,
            workers,
            max_batch_size,
            ..Config::default()
        }
    }

    /// Holds every bulk request until released, then records it.
    #[derive(Default)]
    struct GatedTransport {
        gate: Notify,
        inner: RecordingTransport,
    }

    #[async_trait]
    impl BulkTransport for GatedTransport {
        async fn send_bulk(&self, request: BulkRequest) -> Result<(), TransportError> {
            self.gate.notified().await;
            self.inner.send_bulk(request).await
        }
    }

    struct PanickingTransport;

    #[async_trait]
    impl BulkTransport for PanickingTransport {
        async fn send_bulk(&self, _request: BulkRequest) -> Result<(), TransportError> {
            panic!("transport exploded");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_rejects_then_recovers() {
        let transport = Arc::new(GatedTransport::default());
        let pipeline = Pipeline::with_transport(
            &config(2, 1, 2),
            transport.clone(),
            Arc::new(LogAndDrop),
        )
        .expect("pipeline");

        // The worker claims A and B into a full batch and blocks on the gate.
        pipeline.enqueue(b"A").expect("A accepted");
        pipeline.enqueue(b"B").expect("B accepted");
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Refill the queue while the flush is in flight.
        pipeline.enqueue(b"C").expect("C accepted");
        pipeline.enqueue(b"D").expect("D accepted");
        assert_eq!(pipeline.enqueue(b"E"), Err(EnqueueError::QueueFull));

        transport.gate.notify_one();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.inner.batches(), vec![vec!["A", "B"]]);

        // C and D left the queue, so E can be offered again.
        assert_eq!(pipeline.enqueue(b"E"), Ok(()));
        let stats = pipeline.stats();
        assert_eq!(stats.accepted, 5);
        assert_eq!(stats.rejected_full, 1);

        transport.gate.notify_one();
        transport.gate.notify_one();
        let shutdown = tokio::spawn(pipeline.shutdown());
        // Each notify_one stores at most one permit, so keep releasing.
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            transport.gate.notify_one();
        }
        shutdown
            .await
            .expect("shutdown task panicked")
            .expect("shutdown failed");
        assert_eq!(transport.inner.all_documents(), vec!["A", "B", "C", "D", "E"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_third_record_rejected_until_first_batch_ships() {
        let transport = Arc::new(GatedTransport::default());
        let pipeline = Pipeline::with_transport(
            &config(2, 1, 2),
            transport.clone(),
            Arc::new(LogAndDrop),
        )
        .expect("pipeline");

        // No await in between: the worker has not claimed anything yet.
        assert_eq!(pipeline.enqueue(b"A"), Ok(()));
        assert_eq!(pipeline.enqueue(b"B"), Ok(()));
        assert_eq!(pipeline.enqueue(b"C"), Err(EnqueueError::QueueFull));

        // The worker claims [A, B] as a full batch and ships it.
        tokio::time::sleep(Duration::from_millis(10)).await;
        transport.gate.notify_one();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.inner.batches(), vec![vec!["A", "B"]]);

        assert_eq!(pipeline.enqueue(b"C"), Ok(()));
        let stats = pipeline.stats();
        assert_eq!(stats.accepted, 3);
        assert_eq!(stats.rejected_full, 1);

        // Store a permit for the tail flush of [C].
        transport.gate.notify_one();
        pipeline.shutdown().await.expect("shutdown failed");
        assert_eq!(
            transport.inner.batches(),
            vec![vec!["A", "B"], vec!["C"]]
        );
    }

    #[tokio::test]
    async fn test_capacity_plus_k_rejects_exactly_k() {
        let transport = Arc::new(GatedTransport::default());
        let pipeline =
            Pipeline::with_transport(&config(5, 1, 100), transport.clone(), Arc::new(LogAndDrop))
                .expect("pipeline");

        // Nothing is awaited below, so the worker cannot claim a record yet.
        let results: Vec<_> = (0..20)
            .map(|i| pipeline.enqueue(format!("r{i}").as_bytes()))
            .collect();
        let accepted = results.iter().filter(|r| r.is_ok()).count();
        let rejected = results
            .iter()
            .filter(|r| **r == Err(EnqueueError::QueueFull))
            .count();
        assert_eq!(accepted, 5);
        assert_eq!(rejected, 15);

        drop(pipeline);
    }

    #[tokio::test]
    async fn test_shutdown_drains_tail() {
        let transport = Arc::new(RecordingTransport::default());
        let pipeline =
            Pipeline::with_transport(&config(100, 3, 50), transport.clone(), Arc::new(LogAndDrop))
                .expect("pipeline");

        for i in 0..7 {
            pipeline.enqueue(format!("tail-{i}").as_bytes()).expect("enqueue");
        }
        pipeline.shutdown().await.expect("shutdown failed");

        let mut docs = transport.all_documents();
        docs.sort();
        assert_eq!(
            docs,
            (0..7).map(|i| format!("tail-{i}")).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_started_is_closed() {
        let pipeline = Pipeline::with_transport(
            &config(10, 1, 10),
            Arc::new(RecordingTransport::default()),
            Arc::new(LogAndDrop),
        )
        .expect("pipeline");
        let writer = pipeline.writer();

        pipeline.shutdown().await.expect("shutdown failed");
        assert_eq!(writer.enqueue(b"late"), Err(EnqueueError::Closed));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_final_flush_still_shuts_down_cleanly() {
        let transport = Arc::new(RecordingTransport::failing_first(1));
        let pipeline =
            Pipeline::with_transport(&config(10, 1, 10), transport.clone(), Arc::new(LogAndDrop))
                .expect("pipeline");
        pipeline.enqueue(b"doomed").expect("enqueue");

        assert!(pipeline.shutdown().await.is_ok());
        assert_eq!(transport.batches(), vec![vec!["doomed"]]);
        assert!(logs_contain("dropped_records=1"));
    }

    #[tokio::test]
    async fn test_worker_panic_is_reported() {
        let pipeline = Pipeline::with_transport(
            &config(10, 2, 1),
            Arc::new(PanickingTransport),
            Arc::new(LogAndDrop),
        )
        .expect("pipeline");
        pipeline.enqueue(b"boom").expect("enqueue");

        let err = pipeline.shutdown().await.expect_err("a worker panicked");
        assert!(matches!(err, PipelineError::WorkerPanicked { .. }));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let err = Pipeline::new(&Config::default()).expect_err("log_index is missing");
        assert!(matches!(err, PipelineError::InvalidConfig(_)));

        let err = Pipeline::new(&Config {
            workers: 0,
            ..config(1, 1, 1)
        })
        .expect_err("no workers");
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let err = Pipeline::new(&config(1, 1, 1)).expect_err("no runtime");
        assert!(matches!(err, PipelineError::Creation(_)));
    }

    #[tokio::test]
    async fn test_connect_verifies_connectivity() {
        let unreachable = Config {
            url: Some("http://127.0.0.1:1".to_string()),
            verify_connectivity: true,
            ..config(1, 1, 1)
        };
        let err = Pipeline::connect(&unreachable)
            .await
            .expect_err("nothing listens on port 1");
        assert!(matches!(err, PipelineError::Unreachable(_)));

        // Without verification nothing is contacted up front.
        let lazy = Config {
            verify_connectivity: false,
            ..unreachable
        };
        let pipeline = Pipeline::connect(&lazy).await.expect("pipeline");
        pipeline.shutdown().await.expect("shutdown failed");
    }
}
