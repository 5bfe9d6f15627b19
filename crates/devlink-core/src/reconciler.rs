// ── DeviceLink reconciler ──
//
// One call to `reconcile` is one level-triggered pass over a single link:
// read, decide, perform at most one status or metadata write, and report
// whether the link should come back. Conditions are walked in order and a
// pass stops at the first stage that changed something; later stages run
// on a later pass. Nothing in here loops or spawns.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;

use tracing::{Instrument, debug, error, info_span, warn};

use crate::bridge::{ConnectionManager, ConnectionStatus};
use crate::error::{CoreError, StoreError};
use crate::metrics::LimbMetrics;
use crate::model::{
    ConditionStatus, ConditionType, DEVICE_LINK_FINALIZER, DeviceLink, DynamicObject, ObjectKey,
    reason,
};
use crate::recorder::{EventReason, EventRecorder, EventType};
use crate::store::ResourceStore;
use crate::template;

/// What the caller should do with the link after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing left to do until the link changes again.
    Done,
    /// A retryable failure happened; run another pass later.
    Requeue,
}

impl ReconcileOutcome {
    pub fn is_requeue(self) -> bool {
        self == Self::Requeue
    }
}

type Stage<T> = ControlFlow<ReconcileOutcome, T>;

pub struct DeviceLinkReconciler {
    store: Arc<dyn ResourceStore>,
    bridge: Arc<dyn ConnectionManager>,
    recorder: Arc<dyn EventRecorder>,
    metrics: Arc<LimbMetrics>,
    node_name: String,
}

impl DeviceLinkReconciler {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        bridge: Arc<dyn ConnectionManager>,
        recorder: Arc<dyn EventRecorder>,
        metrics: Arc<LimbMetrics>,
        node_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bridge,
            recorder,
            metrics,
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn metrics(&self) -> &Arc<LimbMetrics> {
        &self.metrics
    }

    /// Run one pass for the link identified by `key`. Never fails: every
    /// collaborator error is folded into a condition or a requeue.
    pub async fn reconcile(&self, key: &ObjectKey) -> ReconcileOutcome {
        let span = info_span!("reconcile", link = %key);
        self.pass(key).instrument(span).await
    }

    /// Apply a session health change reported by the bridge.
    ///
    /// A broken session flips a connected link to `DeviceConnected=False`;
    /// a recovered one sends a failed link back to `Unknown` so the next pass
    /// reconnects.
    pub async fn mark_connection(
        &self,
        key: &ObjectKey,
        status: ConnectionStatus,
    ) -> Result<(), CoreError> {
        let mut link = match self.store.get_link(key).await {
            Ok(link) => link,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if link.status.node_name != self.node_name {
            return Ok(());
        }

        let conditions = &mut link.status.conditions;
        match (status, conditions.status(ConditionType::DeviceConnected)) {
            (ConnectionStatus::Broken(message), ConditionStatus::True) => {
                conditions.fail_on(
                    ConditionType::DeviceConnected,
                    reason::CONNECTION_BROKEN,
                    &message,
                );
                // The bridge already dropped the session.
                self.metrics.decrease_connections(&link.status.adaptor_name);
            }
            (ConnectionStatus::Recovered, ConditionStatus::False) => {
                conditions.to_check(ConditionType::DeviceConnected);
            }
            _ => return Ok(()),
        }

        debug!(link = %key, "connection status changed");
        self.store.update_link_status(&link).await?;
        Ok(())
    }

    // ── Pass ─────────────────────────────────────────────────────────

    async fn pass(&self, key: &ObjectKey) -> ReconcileOutcome {
        let mut link = match self.store.get_link(key).await {
            Ok(link) => link,
            Err(e) if e.is_not_found() => {
                debug!("link no longer exists");
                return ReconcileOutcome::Done;
            }
            Err(e) => {
                error!(error = %e, "unable to fetch DeviceLink");
                return ReconcileOutcome::Requeue;
            }
        };

        if link.status.node_name != self.node_name {
            debug!(node = %link.status.node_name, "link is bound to another node");
            self.release(&link).await;
            return ReconcileOutcome::Done;
        }

        if !link.status.conditions.is_true(ConditionType::ModelExisted) {
            debug!("model is not confirmed");
            self.release(&link).await;
            return ReconcileOutcome::Done;
        }

        if link.is_deleting() {
            if !link.metadata.has_finalizer(DEVICE_LINK_FINALIZER) {
                return ReconcileOutcome::Done;
            }
            self.release(&link).await;
            link.metadata.remove_finalizer(DEVICE_LINK_FINALIZER);
            return self.write_link(&link, "remove finalizer from").await;
        }

        if link.metadata.add_finalizer(DEVICE_LINK_FINALIZER) {
            return self.write_link(&link, "add finalizer to").await;
        }

        if let ControlFlow::Break(outcome) = self.check_adaptor(&mut link).await {
            return outcome;
        }
        let device = match self.check_device(&mut link).await {
            ControlFlow::Continue(device) => device,
            ControlFlow::Break(outcome) => return outcome,
        };
        self.check_connection(&mut link, &device).await
    }

    // ── AdaptorExisted ───────────────────────────────────────────────

    async fn check_adaptor(&self, link: &mut DeviceLink) -> Stage<()> {
        let declared = &link.spec.adaptor;
        let renamed = link.status.adaptor_name != declared.name;
        let reparameterized = template::adaptor_parameters_changed(declared, &link.status.adaptor);

        match link.status.condition_status(ConditionType::AdaptorExisted) {
            ConditionStatus::False => {
                let exists = self.bridge.adaptor_exists(&declared.name).await;
                if exists || renamed || reparameterized {
                    debug!(exists, renamed, reparameterized, "re-checking adaptor");
                    link.status.conditions.to_check(ConditionType::AdaptorExisted);
                    return ControlFlow::Break(self.write_status(link).await);
                }
                ControlFlow::Break(ReconcileOutcome::Done)
            }
            ConditionStatus::True => {
                let exists = self.bridge.adaptor_exists(&declared.name).await;
                if !exists || renamed || reparameterized {
                    debug!(exists, renamed, reparameterized, "adaptor changed, dropping session");
                    self.release(link).await;
                    link.status.conditions.to_check(ConditionType::AdaptorExisted);
                    return ControlFlow::Break(self.write_status(link).await);
                }
                ControlFlow::Continue(())
            }
            ConditionStatus::Unknown => {
                let name = declared.name.clone();
                let parameters = declared.parameters.clone();
                if self.bridge.adaptor_exists(&name).await {
                    link.status
                        .conditions
                        .succeed_on(ConditionType::AdaptorExisted, reason::ADAPTOR_FOUND);
                } else {
                    link.status.conditions.fail_on(
                        ConditionType::AdaptorExisted,
                        reason::ADAPTOR_NOT_FOUND,
                        "the adaptor isn't existed",
                    );
                }
                link.status.adaptor_name = name;
                link.status.adaptor.parameters = parameters;
                ControlFlow::Break(self.write_status(link).await)
            }
        }
    }

    // ── DeviceCreated ────────────────────────────────────────────────

    async fn check_device(&self, link: &mut DeviceLink) -> Stage<DynamicObject> {
        match link.status.condition_status(ConditionType::DeviceCreated) {
            ConditionStatus::False => ControlFlow::Break(ReconcileOutcome::Done),
            ConditionStatus::Unknown => ControlFlow::Break(self.create_device(link).await),
            ConditionStatus::True => self.sync_device(link).await,
        }
    }

    async fn create_device(&self, link: &mut DeviceLink) -> ReconcileOutcome {
        match template::construct_device(link) {
            Err(e) => {
                link.status.conditions.fail_on(
                    ConditionType::DeviceCreated,
                    reason::TEMPLATE_INVALID,
                    "unable to construct device from template",
                );
                self.recorder.record(
                    link,
                    EventType::Warning,
                    EventReason::FailedCreated,
                    &format!("cannot create device from template: {e}"),
                );
            }
            Ok(device) => match self.store.create_device(&device).await {
                Ok(_) => self.device_created(link),
                Err(e) if e.is_already_exists() => self.device_created(link),
                Err(e) if e.is_no_match() => {
                    link.status.conditions.fail_on(
                        ConditionType::DeviceCreated,
                        reason::MODEL_NOT_REGISTERED,
                        "unable to construct device from template",
                    );
                    self.recorder.record(
                        link,
                        EventType::Warning,
                        EventReason::FailedCreated,
                        "cannot create device from template: the model isn't existed",
                    );
                }
                Err(e) => {
                    error!(error = %e, "unable to create the device of DeviceLink");
                    return ReconcileOutcome::Requeue;
                }
            },
        }
        self.write_status(link).await
    }

    fn device_created(&self, link: &mut DeviceLink) {
        link.status
            .conditions
            .succeed_on(ConditionType::DeviceCreated, reason::DEVICE_CREATED);
        self.recorder.record(
            link,
            EventType::Normal,
            EventReason::Created,
            "device instance is created",
        );
    }

    async fn sync_device(&self, link: &mut DeviceLink) -> Stage<DynamicObject> {
        let fetched = match self.store.get_device(&link.status.model, &link.key()).await {
            Ok(device) => Some(device),
            Err(e) if e.is_not_found() || e.is_no_match() => None,
            Err(e) => {
                error!(error = %e, "unable to fetch the device of DeviceLink");
                return ControlFlow::Break(ReconcileOutcome::Requeue);
            }
        };

        let Some(mut device) = fetched.filter(|d| !d.is_deleting()) else {
            debug!("device is not active, re-checking");
            link.status.conditions.to_check(ConditionType::DeviceCreated);
            return ControlFlow::Break(self.write_status(link).await);
        };

        match template::update_device(link, &mut device) {
            Err(e) => {
                link.status.conditions.fail_on(
                    ConditionType::DeviceCreated,
                    reason::TEMPLATE_INVALID,
                    "unable to update device from template",
                );
                self.recorder.record(
                    link,
                    EventType::Warning,
                    EventReason::FailedCreated,
                    &format!("cannot update device from template: {e}"),
                );
                ControlFlow::Break(self.write_status(link).await)
            }
            Ok(false) => ControlFlow::Continue(device),
            Ok(true) => match self.store.update_device(&device).await {
                Ok(updated) => {
                    debug!("device updated from template");
                    ControlFlow::Continue(updated)
                }
                Err(e) => {
                    error!(error = %e, "failed to update device");
                    ControlFlow::Break(ReconcileOutcome::Requeue)
                }
            },
        }
    }

    // ── DeviceConnected ──────────────────────────────────────────────

    async fn check_connection(&self, link: &mut DeviceLink, device: &DynamicObject) -> ReconcileOutcome {
        let adaptor = link.status.adaptor_name.clone();
        match link.status.condition_status(ConditionType::DeviceConnected) {
            ConditionStatus::False => ReconcileOutcome::Done,
            ConditionStatus::True => {
                let started = Instant::now();
                let sent = self.bridge.send(device, link).await;
                self.metrics.observe_send_latency(&adaptor, started.elapsed());

                let Err(e) = sent else {
                    return ReconcileOutcome::Done;
                };
                warn!(error = %e, "cannot send data to adaptor");
                self.metrics.increase_send_errors(&adaptor);
                // Stays failed until the connection manager reports Recovered.
                link.status.conditions.fail_on(
                    ConditionType::DeviceConnected,
                    reason::SEND_FAILED,
                    "cannot send data to adaptor",
                );
                self.recorder.record(
                    link,
                    EventType::Warning,
                    EventReason::FailedSent,
                    &format!("cannot send data to adaptor: {e}"),
                );
                self.write_status(link).await
            }
            ConditionStatus::Unknown => {
                match self.bridge.connect(link).await {
                    Err(e) => {
                        warn!(error = %e, "cannot connect to adaptor");
                        self.metrics.increase_connect_errors(&adaptor);
                        link.status.conditions.fail_on(
                            ConditionType::DeviceConnected,
                            reason::CONNECT_FAILED,
                            "unable to connect to adaptor",
                        );
                        self.recorder.record(
                            link,
                            EventType::Warning,
                            EventReason::FailedConnected,
                            &format!("cannot connect to adaptor: {e}"),
                        );
                    }
                    Ok(overwrote) => {
                        if !overwrote {
                            self.metrics.increase_connections(&adaptor);
                        }
                        link.status
                            .conditions
                            .succeed_on(ConditionType::DeviceConnected, reason::CONNECTED);
                        self.recorder.record(
                            link,
                            EventType::Normal,
                            EventReason::Connected,
                            "connected to adaptor",
                        );
                    }
                }
                self.write_status(link).await
            }
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────

    /// Best-effort disconnect. The gauge only moves when a session existed.
    async fn release(&self, link: &DeviceLink) {
        if self.bridge.disconnect(link).await {
            debug!(adaptor = %link.status.adaptor_name, "session released");
            self.metrics.decrease_connections(&link.status.adaptor_name);
        }
    }

    async fn write_status(&self, link: &DeviceLink) -> ReconcileOutcome {
        match self.store.update_link_status(link).await {
            Ok(_) => ReconcileOutcome::Done,
            Err(e) => {
                log_write_failure(&e, "change the status of");
                ReconcileOutcome::Requeue
            }
        }
    }

    async fn write_link(&self, link: &DeviceLink, action: &str) -> ReconcileOutcome {
        match self.store.update_link(link).await {
            Ok(_) => ReconcileOutcome::Done,
            Err(e) => {
                log_write_failure(&e, action);
                ReconcileOutcome::Requeue
            }
        }
    }
}

fn log_write_failure(err: &StoreError, action: &str) {
    if err.is_conflict() {
        debug!(error = %err, "unable to {action} DeviceLink, retrying");
    } else {
        error!(error = %err, "unable to {action} DeviceLink");
    }
}
