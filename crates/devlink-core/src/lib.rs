//! Reconciliation core linking `DeviceLink` records to devices and adaptor
//! connections.
//!
//! A `DeviceLink` declares a device (its model, a template for it, and the
//! adaptor that talks to the hardware). This crate drives such a link to
//! its realized state:
//!
//! - **[`DeviceLinkReconciler`]**: one level-triggered pass per call. Walks
//!   the four ordered conditions (`ModelExisted`, `AdaptorExisted`,
//!   `DeviceCreated`, `DeviceConnected`), performs at most one write, and
//!   returns [`ReconcileOutcome::Done`] or [`ReconcileOutcome::Requeue`].
//!
//! - **[`Dispatcher`]**: worker pool over a keyed [`WorkQueue`], fed by the
//!   store's link watch through a [`LinkChangedPredicate`]. Retries with
//!   exponential backoff.
//!
//! - **Collaborator seams**: [`ResourceStore`] for records,
//!   [`ConnectionManager`] for adaptor sessions, [`EventRecorder`] for
//!   events, and [`LimbMetrics`] for connection metrics. [`MemoryStore`] and
//!   [`MemoryBridge`] are complete in-process implementations.
//!
//! - **Templates** ([`template`]): pure rendering of a link's template into
//!   a runtime-typed [`DynamicObject`].

pub mod admission;
pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod model;
pub mod predicate;
pub mod reconciler;
pub mod recorder;
pub mod store;
pub mod template;

// ── Primary re-exports ──────────────────────────────────────────────
pub use admission::LinkAdmitter;
pub use bridge::{
    AdaptorHandler, AdaptorNotification, ConnectionHandler, ConnectionManager, ConnectionStatus,
    MemoryBridge,
};
pub use config::ReconcilerConfig;
pub use dispatch::{Dispatcher, WorkQueue};
pub use error::{BridgeError, CoreError, StoreError, TemplateError};
pub use metrics::{LimbMetrics, MetricsSnapshot};
pub use predicate::LinkChangedPredicate;
pub use reconciler::{DeviceLinkReconciler, ReconcileOutcome};
pub use recorder::{Event, EventReason, EventRecorder, EventType, MemoryRecorder, TracingRecorder};
pub use store::{LinkEvent, MemoryStore, ResourceStore};

pub use model::{
    ConditionStatus, ConditionType, DeviceAdaptor, DeviceLink, DeviceLinkSpec, DeviceLinkStatus,
    DeviceTemplate, DynamicObject, ObjectKey, RawExtension, TypeMeta,
};
