// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Defaults for the shipping pipeline.
//!
//! The numeric defaults match the `elasticsearch` section of the service
//! configuration this pipeline was built for.

use std::time::Duration;

/// Interval after which a worker ships a partial batch.
///
/// A size-triggered flush restarts this window, so a worker never fires a time
/// flush right after shipping a full batch.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Capacity of the ingress queue.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;

/// Number of background workers draining the ingress queue.
pub const DEFAULT_WORKERS: usize = 3;

/// Number of records that triggers an immediate flush.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 20;

pub const DEFAULT_HOST: &str = "localhost";

pub const DEFAULT_PORT: u16 = 9200;

/// Bulk action line written before every record. Documents get backend
/// generated ids and land in the index named in the request path.
pub(crate) const BULK_INDEX_ACTION: &[u8] = br#"{"index":{}}"#;

pub(crate) const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";
