// ── Adaptor bridge seam ──
//
// The connection manager owns every live data-plane session. Connect and
// disconnect are idempotent and mutually exclusive per link; the reconciler
// relies on that and never tracks sessions itself.

mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BridgeError;
use crate::model::{DeviceLink, DynamicObject, ObjectKey};

pub use memory::{BridgeCalls, MemoryBridge};

#[async_trait]
pub trait ConnectionManager: Send + Sync {
    /// Whether an adaptor with this name is currently registered.
    async fn adaptor_exists(&self, name: &str) -> bool;

    /// Open (or replace) the link's session. Returns `true` when an existing
    /// session was overwritten.
    async fn connect(&self, link: &DeviceLink) -> Result<bool, BridgeError>;

    /// Close the link's session. Returns `true` when a session existed.
    async fn disconnect(&self, link: &DeviceLink) -> bool;

    async fn send(&self, device: &DynamicObject, link: &DeviceLink) -> Result<(), BridgeError>;

    fn register_adaptor_handler(&self, handler: Arc<dyn AdaptorHandler>);

    fn register_connection_handler(&self, handler: Arc<dyn ConnectionHandler>);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdaptorNotification {
    Registered(String),
    Unregistered(String),
}

impl AdaptorNotification {
    pub fn adaptor(&self) -> &str {
        match self {
            Self::Registered(name) | Self::Unregistered(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Broken(String),
    Recovered,
}

/// Receives adaptor registration changes from the bridge.
#[async_trait]
pub trait AdaptorHandler: Send + Sync {
    async fn on_adaptor(&self, notification: AdaptorNotification);
}

/// Receives session health changes for individual links.
#[async_trait]
pub trait ConnectionHandler: Send + Sync {
    async fn on_connection(&self, key: ObjectKey, status: ConnectionStatus);
}
