// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory transports for unit tests.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;

use crate::transport::{BulkRequest, BulkTransport, TransportError};

/// Splits a bulk body back into its documents, dropping the action lines.
pub(crate) fn documents(body: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(body)
        .lines()
        .skip(1)
        .step_by(2)
        .map(str::to_string)
        .collect()
}

/// Records every batch it receives. The first `fail_first` calls fail with a
/// 500 after being recorded.
#[derive(Debug, Default)]
pub(crate) struct RecordingTransport {
    batches: Mutex<Vec<Vec<String>>>,
    calls: AtomicUsize,
    fail_first: usize,
}

impl RecordingTransport {
    pub(crate) fn failing_first(fail_first: usize) -> Self {
        RecordingTransport {
            fail_first,
            ..Default::default()
        }
    }

    pub(crate) fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().expect("lock poisoned").clone()
    }

    pub(crate) fn all_documents(&self) -> Vec<String> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait]
impl BulkTransport for RecordingTransport {
    async fn send_bulk(&self, request: BulkRequest) -> Result<(), TransportError> {
        let docs = documents(&request.body);
        assert_eq!(docs.len(), request.documents);
        self.batches.lock().expect("lock poisoned").push(docs);

        if self.calls.fetch_add(1, Ordering::SeqCst) < self.fail_first {
            return Err(TransportError::Status {
                status: 500,
                body: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}
