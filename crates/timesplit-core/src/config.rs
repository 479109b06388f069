//! Runtime configuration: defaults, then an optional TOML file, then
//! `TIMESPLIT_*` environment variables.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::TimestampAnchor;

pub const DEFAULT_BATCH_SIZE: usize = 50_000;
pub const DEFAULT_MAX_LOGGED_WARNINGS: usize = 20;

pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    pub batch_size: usize,
    pub workers: usize,
    pub anchor: TimestampAnchor,
    pub storage_root: PathBuf,
    pub max_logged_warnings: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            workers: default_workers(),
            anchor: TimestampAnchor::default(),
            storage_root: PathBuf::from("storage"),
            max_logged_warnings: DEFAULT_MAX_LOGGED_WARNINGS,
        }
    }
}

impl IngestConfig {
    /// Loads the file (when given) and applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_toml_str(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: IngestConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `TIMESPLIT_*` overrides from `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("TIMESPLIT_BATCH_SIZE") {
            self.batch_size = parse_count("TIMESPLIT_BATCH_SIZE", &value)?;
        }
        if let Some(value) = lookup("TIMESPLIT_WORKERS") {
            self.workers = parse_count("TIMESPLIT_WORKERS", &value)?;
        }
        if let Some(value) = lookup("TIMESPLIT_ANCHOR") {
            self.anchor = value.parse().map_err(|message| ConfigError::Invalid {
                key: "TIMESPLIT_ANCHOR",
                message,
            })?;
        }
        if let Some(value) = lookup("TIMESPLIT_STORAGE_DIR") {
            self.storage_root = PathBuf::from(value);
        }
        if let Some(value) = lookup("TIMESPLIT_MAX_LOGGED_WARNINGS") {
            self.max_logged_warnings = value.trim().parse().map_err(|err| ConfigError::Invalid {
                key: "TIMESPLIT_MAX_LOGGED_WARNINGS",
                message: format!("{err}"),
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "batch_size",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                key: "workers",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_count(key: &'static str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|err| ConfigError::Invalid {
        key,
        message: format!("'{value}' is not a count: {err}"),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::timestamps::parse_timestamp;

    #[test]
    fn toml_overrides_defaults() {
        let config = IngestConfig::from_toml_str(
            r#"
            batch_size = 1000
            workers = 3
            anchor = "2024-05-01 00:00:00"
            storage_root = "/tmp/sessions"
            "#,
        )
        .expect("parse config");

        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.workers, 3);
        assert_eq!(
            config.anchor,
            TimestampAnchor::Epoch(parse_timestamp("2024-05-01 00:00:00").expect("ts"))
        );
        assert_eq!(config.storage_root, PathBuf::from("/tmp/sessions"));
        assert_eq!(config.max_logged_warnings, DEFAULT_MAX_LOGGED_WARNINGS);
    }

    #[test]
    fn environment_wins_over_file() {
        let env: HashMap<&str, &str> = [
            ("TIMESPLIT_BATCH_SIZE", "250"),
            ("TIMESPLIT_ANCHOR", "now"),
        ]
        .into_iter()
        .collect();

        let config = IngestConfig::from_toml_str("batch_size = 10")
            .expect("parse config")
            .with_overrides(|key| env.get(key).map(|v| v.to_string()))
            .expect("apply env");

        assert_eq!(config.batch_size, 250);
        assert_eq!(config.anchor, TimestampAnchor::Now);
    }

    #[test]
    fn rejects_zero_batch_size() {
        let err = IngestConfig::from_toml_str("batch_size = 0").expect_err("zero batch");
        assert!(matches!(err, ConfigError::Invalid { key: "batch_size", .. }));

        let err = IngestConfig::default()
            .with_overrides(|key| (key == "TIMESPLIT_WORKERS").then(|| "none".to_string()))
            .expect_err("bad workers");
        assert!(matches!(err, ConfigError::Invalid { key: "TIMESPLIT_WORKERS", .. }));
    }
}
