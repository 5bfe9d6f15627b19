//! Configuration for the devlink controller.
//!
//! A TOML file layered under `DEVLINK_` environment variables, and the
//! translation into `devlink_core::ReconcilerConfig`. The CLI adds its own
//! flag overrides on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use devlink_core::ReconcilerConfig;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Node this controller instance serves.
    #[serde(default)]
    pub node_name: String,

    /// Concurrent reconcile workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default)]
    pub requeue: Requeue,

    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_name: String::new(),
            workers: default_workers(),
            requeue: Requeue::default(),
            log: Log::default(),
        }
    }
}

fn default_workers() -> usize {
    2
}

/// Retry delays for failed passes, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Requeue {
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for Requeue {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

fn default_base_delay() -> u64 {
    5
}
fn default_max_delay() -> u64 {
    1_000_000
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Log {
    /// Default filter directive when neither flags nor `RUST_LOG` say otherwise.
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_level() -> String {
    "warn".into()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Config {
    /// Validate and convert into the runtime configuration.
    pub fn to_reconciler_config(&self) -> Result<ReconcilerConfig, ConfigError> {
        if self.node_name.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "node_name".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::Validation {
                field: "workers".into(),
                reason: "at least one worker is required".into(),
            });
        }
        if self.requeue.base_delay_ms > self.requeue.max_delay_ms {
            return Err(ConfigError::Validation {
                field: "requeue.base_delay_ms".into(),
                reason: format!(
                    "{} exceeds requeue.max_delay_ms ({})",
                    self.requeue.base_delay_ms, self.requeue.max_delay_ms
                ),
            });
        }

        Ok(ReconcilerConfig {
            node_name: self.node_name.clone(),
            workers: self.workers,
            requeue_base_delay: Duration::from_millis(self.requeue.base_delay_ms),
            requeue_max_delay: Duration::from_millis(self.requeue.max_delay_ms),
        })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "devlink", "devlink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("devlink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load from the canonical path plus environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` plus environment. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("DEVLINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_convert_once_node_is_set() {
        let mut config = Config::default();
        assert!(matches!(
            config.to_reconciler_config(),
            Err(ConfigError::Validation { ref field, .. }) if field == "node_name"
        ));

        config.node_name = "edge-1".into();
        let runtime = config.to_reconciler_config().unwrap();
        assert_eq!(runtime.node_name, "edge-1");
        assert_eq!(runtime.workers, 2);
        assert_eq!(runtime.requeue_base_delay, Duration::from_millis(5));
    }

    #[test]
    fn inverted_delays_are_rejected() {
        let config = Config {
            node_name: "edge-1".into(),
            requeue: Requeue {
                base_delay_ms: 10,
                max_delay_ms: 1,
            },
            ..Config::default()
        };
        assert!(config.to_reconciler_config().is_err());
    }

    #[test]
    fn log_format_is_lowercase_in_toml() {
        let toml = toml::to_string(&Log {
            level: "debug".into(),
            format: LogFormat::Json,
        })
        .unwrap();
        assert!(toml.contains("format = \"json\""));
    }
}
