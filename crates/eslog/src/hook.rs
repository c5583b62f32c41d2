// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! What happens to a batch whose flush failed.
//!
//! The flush protocol itself never retries: the worker hands the failed batch
//! to a [`FailureHook`], waits for it, and then clears the batch. The default
//! hook, [`LogAndDrop`], only reports the loss. A hook that wants retries or a
//! dead-letter file can implement them here without touching the workers.

use async_trait::async_trait;
use tracing::error;

use crate::queue::LogRecord;
use crate::transport::TransportError;

/// A batch that could not be delivered.
#[derive(Debug)]
pub struct FlushFailure<'a> {
    pub worker_id: usize,
    /// The records of the batch, in the order they were encoded.
    pub records: &'a [LogRecord],
    pub error: &'a TransportError,
}

#[async_trait]
pub trait FailureHook: Send + Sync {
    /// Called by the worker that owns the batch, before the batch is cleared.
    /// Blocking here stalls that worker only.
    async fn on_flush_failure(&self, failure: FlushFailure<'_>);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogAndDrop;

#[async_trait]
impl FailureHook for LogAndDrop {
    async fn on_flush_failure(&self, failure: FlushFailure<'_>) {
        let total = failure.records.len();
        error!(
            "ESLOG | Worker {} dropped {} of {} records: {}",
            failure.worker_id,
            failure.error.lost_documents(total),
            total,
            failure.error
        );
    }
}
