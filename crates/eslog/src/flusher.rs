// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-worker batching loop.
//!
//! Every worker owns one [`BatchFlusher`]. The flusher races the shared
//! ingress queue against its own flush timer:
//!
//! ```text
//!   record ──> append ──> full? ──yes──> flush, reset timer
//!   tick   ──> non-empty? ──yes──> flush
//!   queue closed and drained ──> flush tail (if any) ──> terminate
//! ```
//!
//! Nothing inside a worker runs concurrently, and no lock is held while the
//! bulk request is in flight: the batch belongs to the worker alone.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use crate::batch::Batch;
use crate::hook::{FailureHook, FlushFailure};
use crate::queue::QueueReceiver;
use crate::stats::PipelineStats;
use crate::transport::{BulkRequest, BulkTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    FlushingTail,
    Terminated,
}

/// What a worker did before it terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSummary {
    pub worker_id: usize,
    pub state: WorkerState,
    pub flushes: usize,
}

pub struct BatchFlusher {
    worker_id: usize,
    receiver: QueueReceiver,
    transport: Arc<dyn BulkTransport>,
    failure_hook: Arc<dyn FailureHook>,
    stats: Arc<PipelineStats>,
    batch: Batch,
    flush_interval: Duration,
    state: WorkerState,
    flushes: usize,
}

impl BatchFlusher {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        worker_id: usize,
        receiver: QueueReceiver,
        transport: Arc<dyn BulkTransport>,
        failure_hook: Arc<dyn FailureHook>,
        stats: Arc<PipelineStats>,
        max_batch_size: usize,
        flush_interval: Duration,
    ) -> Self {
        BatchFlusher {
            worker_id,
            receiver,
            transport,
            failure_hook,
            stats,
            batch: Batch::new(max_batch_size),
            flush_interval,
            state: WorkerState::Running,
            flushes: 0,
        }
    }

    /// Runs until the ingress queue is closed and drained, then ships whatever
    /// is left in the batch.
    pub async fn run(mut self) -> WorkerSummary {
        debug!("ESLOG | Worker {} started", self.worker_id);

        let receiver = self.receiver.clone();
        let mut ticker = interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                record = receiver.recv() => {
                    let Some(record) = record else {
                        break;
                    };
                    if self.batch.push(record) {
                        self.flush().await;
                        ticker.reset();
                    }
                }
                _ = ticker.tick() => {
                    if !self.batch.is_empty() {
                        self.flush().await;
                    }
                }
            }
        }

        self.state = WorkerState::FlushingTail;
        if !self.batch.is_empty() {
            debug!(
                "ESLOG | Worker {} flushing {} remaining records",
                self.worker_id,
                self.batch.len()
            );
            self.flush().await;
        }
        self.state = WorkerState::Terminated;
        debug!("ESLOG | Worker {} stopped", self.worker_id);

        WorkerSummary {
            worker_id: self.worker_id,
            state: self.state,
            flushes: self.flushes,
        }
    }

    async fn flush(&mut self) {
        let documents = self.batch.len();
        let request = BulkRequest {
            body: self.batch.encode_bulk(),
            documents,
        };
        self.flushes += 1;

        match self.transport.send_bulk(request).await {
            Ok(()) => {
                debug!(
                    "ESLOG | Worker {} flushed {} records",
                    self.worker_id, documents
                );
                self.stats.record_flush(documents);
            }
            Err(e) => {
                self.stats.record_failed_flush(e.lost_documents(documents));
                self.failure_hook
                    .on_flush_failure(FlushFailure {
                        worker_id: self.worker_id,
                        records: self.batch.records(),
                        error: &e,
                    })
                    .await;
            }
        }

        self.batch.clear();
    }
}
