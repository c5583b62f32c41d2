// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `eslog.yaml` configuration file.
//!
//! ```yaml
//! log_level: debug
//! elasticsearch:
//!   url: "https://es.example.com:9243"
//!   log_index: app-logs
//!   max_queue_size: 1000
//!   workers: 4
//!   flush_interval: 2
//! ```
//!
//! A missing file is not an error: every field simply keeps its current value.

use std::path::PathBuf;

use figment::{
    providers::{Format, Yaml},
    Figment,
};
use serde::Deserialize;

use crate::config::{log_level::LogLevel, Config, ConfigError, ConfigOverrides, ConfigSource};

#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
#[allow(clippy::module_name_repetitions)]
pub struct YamlConfig {
    pub log_level: Option<LogLevel>,
    pub elasticsearch: ConfigOverrides,
}

#[allow(clippy::module_name_repetitions)]
pub struct YamlConfigSource {
    pub path: PathBuf,
}

impl ConfigSource for YamlConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
        let figment = Figment::new().merge(Yaml::file(self.path.clone()));

        let yaml_config = figment.extract::<YamlConfig>().map_err(|e| {
            ConfigError::ParseError(format!(
                "Failed to parse config from yaml file {}: {e}, ignoring it.",
                self.path.display()
            ))
        })?;

        yaml_config.elasticsearch.merge_into(config);
        if let Some(level) = yaml_config.log_level {
            config.log_level = level;
        }
        Ok(())
    }
}
