// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client used by the Elasticsearch transport.
//!
//! The client is built once per pipeline and shared by every worker; reqwest
//! pools connections internally, so concurrent flushes reuse keep-alive
//! connections to the backend.
//!
//! - **Timeout**: only applied when `flush_timeout` is configured. Without it a
//!   hung bulk call stalls the worker that issued it, and only that worker.
//! - **Proxy**: `proxy_https` (or `HTTPS_PROXY`, resolved by the config
//!   builder) routes every request through the given proxy.

use core::time::Duration;
use std::error::Error;

use tracing::debug;

use crate::config::Config;

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const TCP_KEEPALIVE: Duration = Duration::from_secs(60);

/// Builds the reqwest client described by `config`. An unparsable proxy is an
/// error, not a fallback to a direct connection.
pub fn build_client(config: &Config) -> Result<reqwest::Client, Box<dyn Error + Send + Sync>> {
    let mut builder = reqwest::Client::builder()
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .tcp_keepalive(TCP_KEEPALIVE);

    if let Some(timeout) = config.flush_timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(proxy) = &config.proxy_https {
        debug!("ESLOG | Routing bulk requests through proxy {proxy}");
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }

    Ok(builder.build()?)
}
