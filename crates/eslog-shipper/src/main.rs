// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{
    env, io,
    path::PathBuf,
    process::ExitCode,
    str::FromStr,
    sync::{Arc, OnceLock},
    time::Duration,
};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::{
    filter::filter_fn,
    fmt::{self, writer::OptionalWriter, MakeWriter},
    layer::SubscriberExt,
    reload,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use eslog::{
    config::{get_config, log_level::LogLevel},
    Pipeline, PipelineWriter,
};

const CONFIG_DIR_ENV: &str = "ESLOG_CONFIG_DIR";
const LOG_LEVEL_ENV: &str = "ESLOG_LOG_LEVEL";
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Crates whose events are never shipped: the pipeline itself and the HTTP
/// stack it ships with. Any `hyper*` crate is matched by prefix.
const UNSHIPPABLE_CRATES: &[&str] = &["eslog", "h2", "reqwest", "rustls", "tokio_rustls"];

type FilterHandle = reload::Handle<EnvFilter, Registry>;

pub fn main() -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let code = runtime.block_on(run());
    // A pending stdin read never returns on its own after ctrl-c.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    code
}

async fn run() -> ExitCode {
    let sink = PipelineSink::default();
    let initial_level = initial_log_level(env::var(LOG_LEVEL_ENV).ok().as_deref());
    let filter_handle = init_tracing(initial_level, sink.clone());

    let config_dir = env::var(CONFIG_DIR_ENV).map_or_else(|_| PathBuf::from("."), PathBuf::from);
    let config = get_config(&config_dir);
    if config.log_level != initial_level {
        if let Some(handle) = &filter_handle {
            if let Err(e) = handle.reload(log_filter(config.log_level)) {
                error!("Failed to apply configured log level: {e}");
            }
        }
    }

    let pipeline = match Pipeline::connect(&config).await {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Failed to start log pipeline: {e}");
            return ExitCode::FAILURE;
        }
    };
    sink.attach(pipeline.writer());
    info!(
        "Shipping stdin to {} (index {})",
        config.base_url(),
        config.log_index
    );

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    match pump(BufReader::new(tokio::io::stdin()), &pipeline, &cancel).await {
        Ok(accepted) => debug!("Accepted {accepted} lines from stdin"),
        Err(e) => error!("Failed to read stdin: {e}"),
    }

    match pipeline.shutdown().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Log pipeline did not shut down cleanly: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            debug!("Received ctrl-c, shutting down");
            cancel.cancel();
        }
        Err(e) => error!("Unable to listen for ctrl-c: {e}"),
    }
}

/// Enqueues every non-blank line of `reader` until it is exhausted or `cancel`
/// fires. Returns how many lines were accepted; refused lines are dropped and
/// only show up in the pipeline stats.
async fn pump<R>(reader: R, pipeline: &Pipeline, cancel: &CancellationToken) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut accepted = 0;
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                if pipeline.enqueue(line.as_bytes()).is_ok() {
                    accepted += 1;
                }
            }
        }
    }
    Ok(accepted)
}

/// Destination of the shipped log layer. Discards events until a pipeline
/// writer is attached, so nothing logged while loading the configuration or
/// connecting is queued.
#[derive(Clone, Default)]
struct PipelineSink(Arc<OnceLock<PipelineWriter>>);

impl PipelineSink {
    fn attach(&self, writer: PipelineWriter) {
        if self.0.set(writer).is_err() {
            debug!("Pipeline writer already attached");
        }
    }
}

impl<'a> MakeWriter<'a> for PipelineSink {
    type Writer = OptionalWriter<PipelineWriter>;

    fn make_writer(&'a self) -> Self::Writer {
        self.0.get().map(|writer| writer.make_writer()).into()
    }
}

/// Neither the pipeline's own diagnostics nor those of the HTTP client it
/// ships with may be shipped through the pipeline: every flush would enqueue
/// more records to flush.
fn is_shippable(target: &str) -> bool {
    let krate = target.split("::").next().unwrap_or(target);
    !krate.starts_with("hyper") && !UNSHIPPABLE_CRATES.contains(&krate)
}

fn initial_log_level(value: Option<&str>) -> LogLevel {
    value
        .and_then(|value| LogLevel::from_str(value).ok())
        .unwrap_or_default()
}

fn log_filter(log_level: LogLevel) -> EnvFilter {
    let directives = format!(
        "h2=off,hyper=off,reqwest=off,rustls=off,{}",
        log_level.as_ref()
    );
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn pipeline_layer<S>(sink: PipelineSink) -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .json()
        .with_writer(sink)
        .log_internal_errors(false)
        .with_filter(filter_fn(|meta| is_shippable(meta.target())))
}

/// Installs stderr logging plus the shipped JSON layer. Returns the handle
/// used to change the level once the configuration is known.
fn init_tracing(log_level: LogLevel, sink: PipelineSink) -> Option<FilterHandle> {
    let (filter, handle) = reload::Layer::new(log_filter(log_level));
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false);

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(pipeline_layer(sink))
        .try_init();
    if let Err(e) = installed {
        eprintln!("Failed to install tracing subscriber: {e}");
        return None;
    }
    debug!("Logging subsystem enabled");
    Some(handle)
}
