// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::BULK_INDEX_ACTION;
use crate::queue::LogRecord;

/// Records accumulated by a single worker, in the order it dequeued them.
#[derive(Debug)]
pub struct Batch {
    records: Vec<LogRecord>,
    max_size: usize,
}

impl Batch {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Batch {
            records: Vec::with_capacity(max_size),
            max_size,
        }
    }

    /// Appends a record and reports whether the batch reached its size limit.
    pub fn push(&mut self, record: LogRecord) -> bool {
        self.records.push(record);
        self.is_full()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.records.len() >= self.max_size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    /// Drops every record while keeping the allocation for the next batch.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Encodes the batch as a bulk request body: an `index` action line followed
    /// by the record itself for every record. Records missing a trailing newline
    /// get one.
    #[must_use]
    pub fn encode_bulk(&self) -> Bytes {
        let size: usize = self
            .records
            .iter()
            .map(|r| BULK_INDEX_ACTION.len() + r.len() + 2)
            .sum();
        let mut buf = BytesMut::with_capacity(size);
        for record in &self.records {
            buf.put_slice(BULK_INDEX_ACTION);
            buf.put_u8(b'\n');
            buf.put_slice(record.as_bytes());
            if !record.as_bytes().ends_with(b"\n") {
                buf.put_u8(b'\n');
            }
        }
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(s: &str) -> LogRecord {
        LogRecord::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn test_push_reports_full_at_max_size() {
        let mut batch = Batch::new(2);
        assert!(!batch.push(record("a")));
        assert!(batch.push(record("b")));
        assert_eq!(batch.len(), 2);

        batch.clear();
        assert!(batch.is_empty());
        assert!(!batch.is_full());
    }

    #[test]
    fn test_encode_bulk_payload() {
        let mut batch = Batch::new(10);
        batch.push(record(r#"{"msg":"first"}"#));
        batch.push(record("{\"msg\":\"second\"}\n"));

        let body = batch.encode_bulk();

        assert_eq!(
            &body[..],
            b"{\"index\":{}}\n{\"msg\":\"first\"}\n{\"index\":{}}\n{\"msg\":\"second\"}\n"
        );
    }

    #[test]
    fn test_encode_empty_batch() {
        let batch = Batch::new(10);
        assert!(batch.encode_bulk().is_empty());
    }

    #[test]
    fn test_encode_keeps_arrival_order() {
        let mut batch = Batch::new(100);
        for i in 0..50 {
            batch.push(record(&format!(r#"{{"seq":{i}}}"#)));
        }

        let body = batch.encode_bulk();
        let docs: Vec<&[u8]> = body
            .split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .skip(1)
            .step_by(2)
            .collect();

        assert_eq!(docs.len(), 50);
        for (i, doc) in docs.iter().enumerate() {
            assert_eq!(*doc, format!(r#"{{"seq":{i}}}"#).as_bytes());
        }
    }
}
