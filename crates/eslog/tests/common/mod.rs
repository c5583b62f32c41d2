// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Mutex;

use async_trait::async_trait;
use eslog::hook::{FailureHook, FlushFailure};
use eslog::Config;

pub const INDEX: &str = "app-logs";

/// Configuration pointing a single worker at `url`.
pub fn config(url: &str, max_batch_size: usize) -> Config {
    Config {
        url: Some(url.to_string()),
        log_index: INDEX.to_string(),
        workers: 1,
        max_queue_size: 100,
        max_batch_size,
        ..Config::default()
    }
}

pub fn bulk_body(records: &[&str]) -> String {
    records
        .iter()
        .map(|record| format!("{{\"index\":{{}}}}\n{record}\n"))
        .collect()
}

/// Keeps a description of every failure it is told about.
#[derive(Default)]
pub struct CollectingHook {
    failures: Mutex<Vec<(usize, String)>>,
}

impl CollectingHook {
    pub fn failures(&self) -> Vec<(usize, String)> {
        self.failures.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl FailureHook for CollectingHook {
    async fn on_flush_failure(&self, failure: FlushFailure<'_>) {
        self.failures
            .lock()
            .expect("lock poisoned")
            .push((failure.records.len(), failure.error.to_string()));
    }
}
