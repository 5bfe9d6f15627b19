//! CLI error types with miette diagnostics.

use miette::Diagnostic;
use thiserror::Error;

use devlink_config::ConfigError;
use devlink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const NOT_SETTLED: i32 = 4;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Input ────────────────────────────────────────────────────────

    #[error("Could not read manifest {path}")]
    #[diagnostic(code(devlink::manifest_unreadable))]
    ManifestUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid DeviceLink manifest {path}: {reason}")]
    #[diagnostic(
        code(devlink::manifest_invalid),
        help("The manifest must be a single DeviceLink document in YAML or JSON.")
    )]
    ManifestInvalid { path: String, reason: String },

    #[error("Cannot render a device: {reason}")]
    #[diagnostic(
        code(devlink::template),
        help("Check spec.model and spec.template.spec; the template spec must be a mapping.")
    )]
    Template { reason: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(devlink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Configuration file already exists")]
    #[diagnostic(
        code(devlink::config_exists),
        help("Use --force to overwrite it.\nPath: {path}")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(
        code(devlink::config),
        help("Inspect the resolved configuration with: devlink config show")
    )]
    Config(#[from] ConfigError),

    // ── Simulation ───────────────────────────────────────────────────

    #[error("Link did not settle within {passes} passes")]
    #[diagnostic(
        code(devlink::not_settled),
        help("Raise the limit with --max-passes, or inspect the reported passes with -vv.")
    )]
    NotSettled { passes: u32 },

    #[error("Link did not settle within {waited_ms} ms")]
    #[diagnostic(
        code(devlink::not_idle),
        help("Raise the limit with --wait-ms, or inspect the dispatcher with -vv.")
    )]
    NotIdle { waited_ms: u64 },

    #[error(transparent)]
    #[diagnostic(code(devlink::core))]
    Core(#[from] CoreError),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize output: {0}")]
    #[diagnostic(code(devlink::serialize))]
    Serialize(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ManifestUnreadable { .. }
            | Self::ManifestInvalid { .. }
            | Self::Template { .. }
            | Self::Validation { .. } => exit_code::USAGE,
            Self::ConfigExists { .. } | Self::Config(_) => exit_code::CONFIG,
            Self::NotSettled { .. } | Self::NotIdle { .. } => exit_code::NOT_SETTLED,
            _ => exit_code::GENERAL,
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialize(err.to_string())
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialize(err.to_string())
    }
}

impl From<toml::ser::Error> for CliError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialize(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_class() {
        let usage = CliError::Validation {
            field: "node".into(),
            reason: "empty".into(),
        };
        assert_eq!(usage.exit_code(), exit_code::USAGE);
        assert_eq!(
            CliError::NotSettled { passes: 3 }.exit_code(),
            exit_code::NOT_SETTLED
        );
        assert_eq!(
            CliError::NotIdle { waited_ms: 10 }.exit_code(),
            exit_code::NOT_SETTLED
        );
        assert_eq!(
            CliError::Core(CoreError::Shutdown).exit_code(),
            exit_code::GENERAL
        );
    }
}
