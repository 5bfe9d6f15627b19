// ── Core error types ──
//
// Collaborator-facing errors. The reconciler never lets any of these escape
// a pass: each one is either absorbed into a condition transition or turned
// into a requeue signal. `CoreError` is what the surrounding services
// (admission, dispatcher) hand back to their callers.

use thiserror::Error;

use crate::model::ObjectKey;

/// Failures reported by a [`ResourceStore`](crate::store::ResourceStore).
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: ObjectKey },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: String, key: ObjectKey },

    #[error("conflict writing {kind} {key}: expected resourceVersion {expected}, found {actual}")]
    Conflict {
        kind: String,
        key: ObjectKey,
        expected: String,
        actual: String,
    },

    /// The model kind has no registered schema in the store.
    #[error("no matches for kind \"{kind}\" in version \"{api_version}\"")]
    NoMatch { api_version: String, kind: String },

    #[error("store transport error: {0}")]
    Transport(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_no_match(&self) -> bool {
        matches!(self, Self::NoMatch { .. })
    }
}

/// Failures reported by a [`ConnectionManager`](crate::bridge::ConnectionManager).
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    #[error("adaptor {name} is not registered")]
    AdaptorNotFound { name: String },

    #[error("link {key} has no live connection")]
    NotConnected { key: ObjectKey },

    #[error("adaptor {adaptor} rejected the request: {message}")]
    Rejected { adaptor: String, message: String },

    #[error("bridge transport error: {0}")]
    Transport(String),
}

/// Failures rendering a device from a link's template.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to decode template spec: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("template spec must be a mapping, got {found}")]
    NotAMapping { found: &'static str },

    #[error("device model is not resolved (apiVersion and kind are required)")]
    MissingModel,

    #[error("adaptor parameters are not valid UTF-8: {0}")]
    ParametersNotUtf8(#[from] std::str::Utf8Error),
}

/// Unified error type for the services around the reconciler.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("dispatcher is shut down")]
    Shutdown,
}
