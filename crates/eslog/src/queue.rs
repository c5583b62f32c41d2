// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded ingress queue shared by every producer and every worker.
//!
//! Producers call [`IngressQueue::enqueue`] from any thread, with or without a
//! tokio runtime. The call never waits: when the queue is at capacity the record
//! is refused with [`EnqueueError::QueueFull`] and dropped.
//!
//! Workers pull through cloned [`QueueReceiver`]s. Closing the queue drops the
//! only sender, so receivers keep draining what is buffered and then observe
//! `None`, which is the closed-and-drained signal workers terminate on.

use std::sync::{Arc, RwLock, RwLockReadGuard};

use bytes::Bytes;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    Mutex,
};

use crate::error::EnqueueError;

/// One already-formatted log line.
///
/// The bytes are always an independent copy of what the producer handed in, so
/// the producer may reuse its buffer as soon as `enqueue` returns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogRecord(Bytes);

impl LogRecord {
    #[must_use]
    pub fn copy_from_slice(data: &[u8]) -> Self {
        LogRecord(Bytes::copy_from_slice(data))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for LogRecord {
    fn from(data: Vec<u8>) -> Self {
        LogRecord(Bytes::from(data))
    }
}

impl From<String> for LogRecord {
    fn from(data: String) -> Self {
        LogRecord(Bytes::from(data))
    }
}

impl AsRef<[u8]> for LogRecord {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

#[derive(Debug)]
pub struct IngressQueue {
    // `None` once closed. Readers only hold the lock for a `try_reserve`.
    sender: RwLock<Option<mpsc::Sender<LogRecord>>>,
    capacity: usize,
}

impl IngressQueue {
    /// Creates a queue holding at most `capacity` records and the receiver
    /// workers drain it through.
    ///
    /// tokio channels cannot be unbuffered, so a capacity of 0 behaves like 1.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, QueueReceiver) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let queue = IngressQueue {
            sender: RwLock::new(Some(tx)),
            capacity,
        };
        let receiver = QueueReceiver {
            rx: Arc::new(Mutex::new(rx)),
        };
        (queue, receiver)
    }

    /// Admits a copy of `data`, or refuses it without waiting.
    pub fn enqueue(&self, data: &[u8]) -> Result<(), EnqueueError> {
        let guard = self.read_sender();
        let Some(sender) = guard.as_ref() else {
            return Err(EnqueueError::Closed);
        };
        // Reserve first so a refused record is never copied.
        let permit = sender.try_reserve().map_err(|e| match e {
            TrySendError::Full(()) => EnqueueError::QueueFull,
            TrySendError::Closed(()) => EnqueueError::Closed,
        })?;
        permit.send(LogRecord::copy_from_slice(data));
        Ok(())
    }

    /// Closes the producer side. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        let mut guard = match self.sender.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.take().is_some()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.read_sender().is_none()
    }

    /// Number of records currently buffered. Always 0 once closed.
    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.read_sender()
            .as_ref()
            .map_or(0, |sender| sender.max_capacity() - sender.capacity())
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn read_sender(&self) -> RwLockReadGuard<'_, Option<mpsc::Sender<LogRecord>>> {
        match self.sender.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Consumer side of the ingress queue, cloned into every worker.
#[derive(Debug, Clone)]
pub struct QueueReceiver {
    rx: Arc<Mutex<mpsc::Receiver<LogRecord>>>,
}

impl QueueReceiver {
    /// Waits for the next record. Returns `None` once the queue is closed and
    /// every buffered record has been handed out.
    ///
    /// Cancel safe: dropping the future never loses a record, which lets
    /// workers race it against their flush timer.
    pub async fn recv(&self) -> Option<LogRecord> {
        self.rx.lock().await.recv().await
    }
}
