// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! [`std::io::Write`] front end of a pipeline.
//!
//! Every `write` call is one record. This matches how `tracing_subscriber`'s
//! fmt layer emits one buffered write per event, so a [`PipelineWriter`] can be
//! handed to `fmt::layer().with_writer(..)` as is.

use std::io;
use std::sync::Arc;

use tracing_subscriber::fmt::MakeWriter;

use crate::error::EnqueueError;
use crate::queue::IngressQueue;
use crate::stats::PipelineStats;

/// Cheap, cloneable producer handle.
///
/// Writes never block. A full queue yields an [`io::ErrorKind::WouldBlock`]
/// error with the message "channel full" and the record is dropped; once the
/// pipeline is shutting down writes fail with [`io::ErrorKind::BrokenPipe`].
#[derive(Debug, Clone)]
pub struct PipelineWriter {
    queue: Arc<IngressQueue>,
    stats: Arc<PipelineStats>,
}

impl PipelineWriter {
    pub(crate) fn new(queue: Arc<IngressQueue>, stats: Arc<PipelineStats>) -> Self {
        PipelineWriter { queue, stats }
    }

    /// Same as [`io::Write::write`] with the typed error.
    pub fn enqueue(&self, record: &[u8]) -> Result<(), EnqueueError> {
        enqueue_counted(&self.queue, &self.stats, record)
    }
}

/// Enqueues and counts the outcome. Must not log: producers may be running
/// inside a `tracing` writer.
pub(crate) fn enqueue_counted(
    queue: &IngressQueue,
    stats: &PipelineStats,
    record: &[u8],
) -> Result<(), EnqueueError> {
    match queue.enqueue(record) {
        Ok(()) => {
            stats.record_accepted();
            Ok(())
        }
        Err(EnqueueError::QueueFull) => {
            stats.record_rejected_full();
            Err(EnqueueError::QueueFull)
        }
        Err(EnqueueError::Closed) => {
            stats.record_rejected_closed();
            Err(EnqueueError::Closed)
        }
    }
}

impl io::Write for PipelineWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.enqueue(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for PipelineWriter {
    type Writer = PipelineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
