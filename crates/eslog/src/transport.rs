// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bulk transport to the indexing backend.
//!
//! Workers only know the [`BulkTransport`] trait. [`ElasticsearchTransport`]
//! is the production implementation: one `POST /{index}/_bulk` per flush with
//! an NDJSON body, no retries.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::constants::NDJSON_CONTENT_TYPE;
use crate::error::PipelineError;
use crate::http::build_client;

/// One encoded batch, ready to be shipped.
#[derive(Debug, Clone)]
pub struct BulkRequest {
    /// NDJSON bulk body (action line + document per record).
    pub body: Bytes,
    /// Number of documents encoded in `body`.
    pub documents: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("bulk request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("bulk request rejected with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{failed} of {total} documents rejected: {reason}")]
    PartialFailure {
        failed: usize,
        total: usize,
        reason: String,
    },
}

impl TransportError {
    /// Number of documents of a `total`-document request that did not make it.
    #[must_use]
    pub fn lost_documents(&self, total: usize) -> usize {
        match self {
            TransportError::PartialFailure { failed, .. } => *failed,
            _ => total,
        }
    }
}

#[async_trait]
pub trait BulkTransport: Send + Sync {
    /// Ships one batch. Called by a single worker at a time per batch, with no
    /// lock held.
    async fn send_bulk(&self, request: BulkRequest) -> Result<(), TransportError>;
}

#[derive(Debug, Clone)]
pub struct ElasticsearchTransport {
    client: reqwest::Client,
    base_url: Url,
    bulk_url: Url,
    username: Option<String>,
    password: Option<String>,
}

impl ElasticsearchTransport {
    pub fn new(config: &Config) -> Result<Self, PipelineError> {
        let base = config.base_url();
        let base_url = Url::parse(&base)
            .map_err(|e| PipelineError::InvalidConfig(format!("invalid backend url {base}: {e}")))?;
        let bulk = format!(
            "{}/{}/_bulk",
            base.trim_end_matches('/'),
            config.log_index.trim()
        );
        let bulk_url = Url::parse(&bulk)
            .map_err(|e| PipelineError::InvalidConfig(format!("invalid bulk url {bulk}: {e}")))?;
        let client = build_client(config)
            .map_err(|e| PipelineError::Creation(format!("failed to build HTTP client: {e}")))?;

        Ok(ElasticsearchTransport {
            client,
            base_url,
            bulk_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    #[must_use]
    pub fn bulk_url(&self) -> &Url {
        &self.bulk_url
    }

    /// Checks that the backend answers on its root endpoint.
    pub async fn ping(&self) -> Result<(), TransportError> {
        let resp = self.authorize(self.client.get(self.base_url.clone())).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        Err(TransportError::Status {
            status: status.as_u16(),
            body: resp.text().await.unwrap_or_default(),
        })
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(user) => req.basic_auth(user, self.password.as_deref()),
            None => req,
        }
    }
}

#[async_trait]
impl BulkTransport for ElasticsearchTransport {
    async fn send_bulk(&self, request: BulkRequest) -> Result<(), TransportError> {
        let req = self
            .client
            .post(self.bulk_url.clone())
            .header(CONTENT_TYPE, NDJSON_CONTENT_TYPE)
            .body(request.body);
        let resp = self.authorize(req).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(());
        }

        match resp.bytes().await {
            Ok(body) => check_bulk_response(&body, request.documents),
            Err(e) => {
                // The status already says the request was accepted.
                debug!("ESLOG | Ignoring unreadable bulk response: {e}");
                Ok(())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Turns a 2xx bulk response that still carries per-item errors into a
/// [`TransportError::PartialFailure`].
fn check_bulk_response(body: &[u8], documents: usize) -> Result<(), TransportError> {
    let response: BulkResponse = match serde_json::from_slice(body) {
        Ok(response) => response,
        Err(e) => {
            // The status already says the request was accepted.
            debug!("ESLOG | Ignoring unparsable bulk response: {e}");
            return Ok(());
        }
    };
    if !response.errors {
        return Ok(());
    }

    let mut failed = 0;
    let mut reason = None;
    for item in response.items.iter().flat_map(|action| action.values()) {
        if let Some(error) = &item.error {
            failed += 1;
            if reason.is_none() {
                reason = Some(
                    error
                        .get("reason")
                        .and_then(serde_json::Value::as_str)
                        .map_or_else(|| error.to_string(), str::to_string),
                );
            }
        }
    }

    Err(TransportError::PartialFailure {
        failed,
        total: documents,
        reason: reason.unwrap_or_else(|| "unknown".to_string()),
    })
}
