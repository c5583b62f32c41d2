// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters shared by the producers and the workers of one pipeline.
///
/// Producers only ever touch `accepted` and the `rejected_*` counters, with a
/// single relaxed increment, so counting never slows the producer path down.
#[derive(Debug, Default)]
pub struct PipelineStats {
    accepted: AtomicU64,
    rejected_full: AtomicU64,
    rejected_closed: AtomicU64,
    flushed_batches: AtomicU64,
    flushed_records: AtomicU64,
    failed_batches: AtomicU64,
    dropped_records: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub accepted: u64,
    pub rejected_full: u64,
    pub rejected_closed: u64,
    pub flushed_batches: u64,
    pub flushed_records: u64,
    pub failed_batches: u64,
    pub dropped_records: u64,
}

impl PipelineStats {
    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected_full(&self) {
        self.rejected_full.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected_closed(&self) {
        self.rejected_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self, records: usize) {
        self.flushed_batches.fetch_add(1, Ordering::Relaxed);
        self.flushed_records
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failed_flush(&self, dropped: usize) {
        self.failed_batches.fetch_add(1, Ordering::Relaxed);
        self.dropped_records
            .fetch_add(dropped as u64, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected_full: self.rejected_full.load(Ordering::Relaxed),
            rejected_closed: self.rejected_closed.load(Ordering::Relaxed),
            flushed_batches: self.flushed_batches.load(Ordering::Relaxed),
            flushed_records: self.flushed_records.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            dropped_records: self.dropped_records.load(Ordering::Relaxed),
        }
    }
}
