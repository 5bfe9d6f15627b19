// ── Event recording ──
//
// Events are a side channel: recording never fails and never blocks a pass.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;
use tracing::{info, warn};

use crate::model::{DeviceLink, ObjectKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum EventType {
    Normal,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum EventReason {
    FailedCreated,
    Created,
    FailedSent,
    FailedConnected,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub link: ObjectKey,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub reason: EventReason,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

pub trait EventRecorder: Send + Sync {
    fn record(&self, link: &DeviceLink, event_type: EventType, reason: EventReason, message: &str);
}

/// Emits every event as a log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRecorder;

impl EventRecorder for TracingRecorder {
    fn record(&self, link: &DeviceLink, event_type: EventType, reason: EventReason, message: &str) {
        match event_type {
            EventType::Normal => info!(link = %link.key(), %reason, "{message}"),
            EventType::Warning => warn!(link = %link.key(), %reason, "{message}"),
        }
    }
}

/// Keeps every event in memory, oldest first.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    events: Mutex<Vec<Event>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reasons(&self) -> Vec<EventReason> {
        self.events().into_iter().map(|e| e.reason).collect()
    }

    /// Remove and return everything recorded so far.
    pub fn drain(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EventRecorder for MemoryRecorder {
    fn record(&self, link: &DeviceLink, event_type: EventType, reason: EventReason, message: &str) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Event {
                link: link.key(),
                event_type,
                reason,
                message: message.to_owned(),
                timestamp: Utc::now(),
            });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::DeviceLinkSpec;

    #[test]
    fn memory_recorder_keeps_order_and_drains() {
        let recorder = MemoryRecorder::new();
        let link = DeviceLink::new(&ObjectKey::new("default", "fan"), DeviceLinkSpec::default());
        recorder.record(&link, EventType::Normal, EventReason::Created, "device instance is created");
        recorder.record(&link, EventType::Normal, EventReason::Connected, "connected to adaptor");

        assert_eq!(
            recorder.reasons(),
            vec![EventReason::Created, EventReason::Connected]
        );
        assert_eq!(recorder.drain().len(), 2);
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn reasons_display_as_identifiers() {
        assert_eq!(EventReason::FailedConnected.to_string(), "FailedConnected");
        assert_eq!(EventType::Warning.to_string(), "Warning");
    }
}
