// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, error};

use crate::error::PipelineError;
use crate::flusher::{BatchFlusher, WorkerSummary};
use crate::hook::FailureHook;
use crate::queue::QueueReceiver;
use crate::stats::PipelineStats;
use crate::transport::BulkTransport;

/// Settings shared by every worker of a pool.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub workers: usize,
    pub max_batch_size: usize,
    pub flush_interval: Duration,
}

/// Owns the handles of all workers draining one ingress queue.
///
/// Workers are never detached: the only way to get rid of a pool is
/// [`WorkerPool::join`], which waits for each of them.
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<WorkerSummary>>,
}

impl WorkerPool {
    /// Spawns exactly `settings.workers` workers on `runtime`.
    #[must_use]
    pub fn start(
        runtime: &Handle,
        settings: WorkerSettings,
        receiver: &QueueReceiver,
        transport: &Arc<dyn BulkTransport>,
        failure_hook: &Arc<dyn FailureHook>,
        stats: &Arc<PipelineStats>,
    ) -> Self {
        let handles = (0..settings.workers)
            .map(|worker_id| {
                let flusher = BatchFlusher::new(
                    worker_id,
                    receiver.clone(),
                    Arc::clone(transport),
                    Arc::clone(failure_hook),
                    Arc::clone(stats),
                    settings.max_batch_size,
                    settings.flush_interval,
                );
                runtime.spawn(flusher.run())
            })
            .collect();
        debug!("ESLOG | Started {} workers", settings.workers);

        WorkerPool { handles }
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }

    /// Waits for every worker to terminate. Workers only terminate once the
    /// ingress queue is closed and drained, so close it first.
    ///
    /// All workers are awaited even if one of them panicked; the first panic is
    /// reported.
    pub async fn join(self) -> Result<Vec<WorkerSummary>, PipelineError> {
        let mut summaries = Vec::with_capacity(self.handles.len());
        let mut first_error = None;

        for (worker_id, handle) in self.handles.into_iter().enumerate() {
            match handle.await {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    error!("ESLOG | Worker {worker_id} did not terminate cleanly: {e}");
                    first_error.get_or_insert(PipelineError::WorkerPanicked {
                        worker_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(summaries),
        }
    }
}
