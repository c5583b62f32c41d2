// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;

/// Errors that stop the pipeline from starting or from shutting down cleanly.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to create pipeline: {0}")]
    Creation(String),

    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("Worker {worker_id} panicked: {reason}")]
    WorkerPanicked { worker_id: usize, reason: String },
}

/// Reasons a record is refused by the ingress queue.
///
/// Both variants are final for the record: it is dropped, and the caller is
/// expected to move on rather than retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    #[error("channel full")]
    QueueFull,

    #[error("channel closed")]
    Closed,
}

impl From<EnqueueError> for io::Error {
    fn from(e: EnqueueError) -> Self {
        let kind = match e {
            EnqueueError::QueueFull => io::ErrorKind::WouldBlock,
            EnqueueError::Closed => io::ErrorKind::BrokenPipe,
        };
        io::Error::new(kind, e)
    }
}
