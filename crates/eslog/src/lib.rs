// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Asynchronous log shipping to Elasticsearch.
//!
//! Synchronous producers hand already-formatted log lines to a bounded ingress
//! queue. A fixed pool of tokio workers drains the queue, each one accumulating
//! its own batch, and ships every batch to the bulk API when it is full or when
//! the flush interval elapses.
//!
//! ```text
//!   producers (any thread)
//!        │  enqueue / io::Write   (never blocks, drops when full)
//!        v
//!   ┌─────────────┐
//!   │IngressQueue │  bounded, shared by all workers
//!   └──────┬──────┘
//!          │
//!    ┌─────┴──────┬───────────┐
//!    v            v           v
//!  worker 0    worker 1 … worker N-1   (BatchFlusher: size / time triggers)
//!    │            │           │
//!    └─────┬──────┴───────────┘
//!          v
//!   ┌─────────────┐
//!   │BulkTransport│  POST /{index}/_bulk
//!   └─────────────┘
//! ```
//!
//! Delivery is at-most-once: a batch whose flush fails is handed to the
//! [`hook::FailureHook`] and then discarded.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod batch;
pub mod config;
pub mod constants;
pub mod error;
pub mod flusher;
pub mod hook;
pub mod http;
pub mod pipeline;
pub mod pool;
pub mod queue;
pub mod stats;
pub mod transport;
pub mod writer;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{EnqueueError, PipelineError};
pub use pipeline::Pipeline;
pub use queue::LogRecord;
pub use writer::PipelineWriter;
