// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `ESLOG_*` environment variables.
//!
//! Every field of the `elasticsearch` YAML section has an upper-case
//! counterpart, e.g. `ESLOG_LOG_INDEX`, `ESLOG_MAX_QUEUE_SIZE` or
//! `ESLOG_FLUSH_INTERVAL` (seconds). `ESLOG_LOG_LEVEL` sets the log level.

use figment::{providers::Env, Figment};

use crate::config::{Config, ConfigError, ConfigOverrides, ConfigSource};

pub const ENV_PREFIX: &str = "ESLOG_";

#[allow(clippy::module_name_repetitions)]
pub struct EnvConfigSource;

impl ConfigSource for EnvConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
        let figment = Figment::new().merge(Env::prefixed(ENV_PREFIX));

        let overrides = figment.extract::<ConfigOverrides>().map_err(|e| {
            ConfigError::ParseError(format!(
                "Failed to parse config from environment variables: {e}, ignoring them."
            ))
        })?;

        overrides.merge_into(config);
        Ok(())
    }
}
