// ── In-memory adaptor bridge ──
//
// A session table keyed by link identity. Faults can be injected per call
// kind, and every call is counted so callers can assert on leak-freedom.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tracing::debug;

use super::{AdaptorHandler, AdaptorNotification, ConnectionHandler, ConnectionManager, ConnectionStatus};
use crate::error::BridgeError;
use crate::model::{DeviceLink, DynamicObject, ObjectKey, RawExtension};

#[derive(Debug, Clone)]
struct Session {
    adaptor: String,
    parameters: Option<RawExtension>,
    last_sent: Option<DynamicObject>,
}

/// Call counts seen by the bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeCalls {
    pub connects: u64,
    pub disconnects: u64,
    pub sends: u64,
}

#[derive(Default)]
pub struct MemoryBridge {
    adaptors: DashSet<String>,
    sessions: DashMap<ObjectKey, Session>,
    fail_connects: AtomicU32,
    fail_sends: AtomicU32,
    connects: AtomicU64,
    disconnects: AtomicU64,
    sends: AtomicU64,
    adaptor_handlers: Mutex<Vec<Arc<dyn AdaptorHandler>>>,
    connection_handlers: Mutex<Vec<Arc<dyn ConnectionHandler>>>,
}

impl MemoryBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adaptors<I, S>(adaptors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let bridge = Self::new();
        for name in adaptors {
            bridge.adaptors.insert(name.into());
        }
        bridge
    }

    /// Register an adaptor and notify adaptor handlers.
    pub async fn register_adaptor(&self, name: &str) {
        if self.adaptors.insert(name.to_owned()) {
            debug!(adaptor = name, "adaptor registered");
            self.notify_adaptor(AdaptorNotification::Registered(name.to_owned()))
                .await;
        }
    }

    /// Unregister an adaptor. Its sessions are dropped and reported broken.
    pub async fn unregister_adaptor(&self, name: &str) {
        if self.adaptors.remove(name).is_none() {
            return;
        }
        debug!(adaptor = name, "adaptor unregistered");

        let orphaned: Vec<ObjectKey> = self
            .sessions
            .iter()
            .filter(|s| s.adaptor == name)
            .map(|s| s.key().clone())
            .collect();
        for key in &orphaned {
            self.sessions.remove(key);
        }

        self.notify_adaptor(AdaptorNotification::Unregistered(name.to_owned()))
            .await;
        for key in orphaned {
            self.notify_connection(key, ConnectionStatus::Broken(format!("adaptor {name} went away")))
                .await;
        }
    }

    /// Drop a live session as if the adaptor side had failed.
    pub async fn break_connection(&self, key: &ObjectKey, message: &str) {
        if self.sessions.remove(key).is_some() {
            self.notify_connection(key.clone(), ConnectionStatus::Broken(message.to_owned()))
                .await;
        }
    }

    pub async fn recover_connection(&self, key: &ObjectKey) {
        self.notify_connection(key.clone(), ConnectionStatus::Recovered)
            .await;
    }

    /// Fail the next `count` connect calls.
    pub fn fail_connects(&self, count: u32) {
        self.fail_connects.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` send calls.
    pub fn fail_sends(&self, count: u32) {
        self.fail_sends.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> BridgeCalls {
        BridgeCalls {
            connects: self.connects.load(Ordering::SeqCst),
            disconnects: self.disconnects.load(Ordering::SeqCst),
            sends: self.sends.load(Ordering::SeqCst),
        }
    }

    pub fn live_connections(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_connected(&self, key: &ObjectKey) -> bool {
        self.sessions.contains_key(key)
    }

    /// Adaptor a link's session is bound to, if connected.
    pub fn session_adaptor(&self, key: &ObjectKey) -> Option<String> {
        self.sessions.get(key).map(|s| s.adaptor.clone())
    }

    pub fn session_parameters(&self, key: &ObjectKey) -> Option<RawExtension> {
        self.sessions.get(key).and_then(|s| s.parameters.clone())
    }

    pub fn last_sent(&self, key: &ObjectKey) -> Option<DynamicObject> {
        self.sessions.get(key).and_then(|s| s.last_sent.clone())
    }

    fn take_fault(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn notify_adaptor(&self, notification: AdaptorNotification) {
        let handlers = self
            .adaptor_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for handler in handlers {
            handler.on_adaptor(notification.clone()).await;
        }
    }

    async fn notify_connection(&self, key: ObjectKey, status: ConnectionStatus) {
        let handlers = self
            .connection_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for handler in handlers {
            handler.on_connection(key.clone(), status.clone()).await;
        }
    }
}

#[async_trait]
impl ConnectionManager for MemoryBridge {
    async fn adaptor_exists(&self, name: &str) -> bool {
        self.adaptors.contains(name)
    }

    async fn connect(&self, link: &DeviceLink) -> Result<bool, BridgeError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let adaptor = link.status.adaptor_name.clone();
        if !self.adaptors.contains(&adaptor) {
            return Err(BridgeError::AdaptorNotFound { name: adaptor });
        }
        if Self::take_fault(&self.fail_connects) {
            return Err(BridgeError::Rejected {
                adaptor,
                message: "connection refused".into(),
            });
        }

        let session = Session {
            adaptor,
            parameters: link.spec.adaptor.parameters.clone(),
            last_sent: None,
        };
        let overwrote = self.sessions.insert(link.key(), session).is_some();
        debug!(link = %link.key(), overwrote, "session opened");
        Ok(overwrote)
    }

    async fn disconnect(&self, link: &DeviceLink) -> bool {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        let existed = self.sessions.remove(&link.key()).is_some();
        if existed {
            debug!(link = %link.key(), "session closed");
        }
        existed
    }

    async fn send(&self, device: &DynamicObject, link: &DeviceLink) -> Result<(), BridgeError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        let key = link.key();
        let mut session = self
            .sessions
            .get_mut(&key)
            .ok_or_else(|| BridgeError::NotConnected { key: key.clone() })?;
        if Self::take_fault(&self.fail_sends) {
            return Err(BridgeError::Rejected {
                adaptor: session.adaptor.clone(),
                message: "adaptor did not accept the payload".into(),
            });
        }
        session.last_sent = Some(device.clone());
        Ok(())
    }

    fn register_adaptor_handler(&self, handler: Arc<dyn AdaptorHandler>) {
        self.adaptor_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    fn register_connection_handler(&self, handler: Arc<dyn ConnectionHandler>) {
        self.connection_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }
}
