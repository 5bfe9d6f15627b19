// ── In-memory resource store ──
//
// `DashMap`-backed store with the semantics the reconciler relies on:
// monotonically increasing resource versions, conflict detection on stale
// writes, finalizer-aware deletion, owner cascade for devices, and a
// broadcast watch of link changes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use super::{LinkEvent, ResourceStore};
use crate::error::StoreError;
use crate::model::{DEVICE_LINK_KIND, DeviceLink, DeviceLinkSpec, DynamicObject, ObjectKey, TypeMeta};

const WATCH_CHANNEL_SIZE: usize = 1024;

type DeviceKey = (TypeMeta, ObjectKey);

/// Successful writes seen by the store, by kind of write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub link_updates: u64,
    pub status_updates: u64,
    pub device_creates: u64,
    pub device_updates: u64,
}

impl WriteStats {
    pub fn total(&self) -> u64 {
        self.link_updates + self.status_updates + self.device_creates + self.device_updates
    }
}

#[derive(Default)]
struct WriteCounters {
    link_updates: AtomicU64,
    status_updates: AtomicU64,
    device_creates: AtomicU64,
    device_updates: AtomicU64,
}

pub struct MemoryStore {
    links: DashMap<ObjectKey, DeviceLink>,
    devices: DashMap<DeviceKey, DynamicObject>,
    models: DashSet<TypeMeta>,
    revision: AtomicU64,
    injected_failures: AtomicU32,
    injected_conflicts: AtomicU32,
    writes: WriteCounters,
    events: broadcast::Sender<LinkEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CHANNEL_SIZE);
        Self {
            links: DashMap::new(),
            devices: DashMap::new(),
            models: DashSet::new(),
            revision: AtomicU64::new(0),
            injected_failures: AtomicU32::new(0),
            injected_conflicts: AtomicU32::new(0),
            writes: WriteCounters::default(),
            events,
        }
    }

    /// Subscribe to link changes.
    pub fn watch(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    pub fn register_model(&self, model: TypeMeta) {
        self.models.insert(model);
    }

    /// Drop a model along with every device of that model.
    pub fn unregister_model(&self, model: &TypeMeta) {
        self.models.remove(model);
        self.devices.retain(|(kind, _), _| kind != model);
    }

    /// Make the next `count` trait calls fail with a transport error.
    pub fn inject_transport_failures(&self, count: u32) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` link writes lose the race to another writer.
    pub fn inject_conflicts(&self, count: u32) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    pub fn write_stats(&self) -> WriteStats {
        WriteStats {
            link_updates: self.writes.link_updates.load(Ordering::SeqCst),
            status_updates: self.writes.status_updates.load(Ordering::SeqCst),
            device_creates: self.writes.device_creates.load(Ordering::SeqCst),
            device_updates: self.writes.device_updates.load(Ordering::SeqCst),
        }
    }

    pub fn list_devices(&self) -> Vec<DynamicObject> {
        let mut devices: Vec<_> = self.devices.iter().map(|r| r.value().clone()).collect();
        devices.sort_by_key(DynamicObject::key);
        devices
    }

    pub fn contains_link(&self, key: &ObjectKey) -> bool {
        self.links.contains_key(key)
    }

    // ── Declarer operations ──────────────────────────────────────────

    /// Create a link as its declarer would. Identity fields are assigned here.
    pub fn create_link(&self, link: DeviceLink) -> Result<DeviceLink, StoreError> {
        let key = link.key();
        let mut stored = link;
        stored.metadata.uid = Uuid::new_v4().to_string();
        stored.metadata.resource_version = self.next_revision();
        stored.metadata.generation = 1;
        stored.metadata.deletion_timestamp = None;

        match self.links.entry(key.clone()) {
            Entry::Occupied(_) => {
                return Err(StoreError::AlreadyExists {
                    kind: DEVICE_LINK_KIND.into(),
                    key,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(stored.clone());
            }
        }
        debug!(link = %key, "link created");
        let _ = self.events.send(LinkEvent::Created(Arc::new(stored.clone())));
        Ok(stored)
    }

    /// Replace a link's spec as its declarer would.
    pub fn apply_link_spec(
        &self,
        key: &ObjectKey,
        spec: DeviceLinkSpec,
    ) -> Result<DeviceLink, StoreError> {
        let (old, new) = {
            let mut entry = self.links.get_mut(key).ok_or_else(|| link_not_found(key))?;
            let old = entry.clone();
            if entry.spec != spec {
                entry.spec = spec;
                entry.metadata.generation += 1;
            }
            entry.metadata.resource_version = self.next_revision();
            (old, entry.clone())
        };
        self.notify_updated(old, new.clone());
        Ok(new)
    }

    /// Request deletion. Links still carrying finalizers are only marked.
    pub fn delete_link(&self, key: &ObjectKey) -> Result<(), StoreError> {
        let marked = {
            let mut entry = self.links.get_mut(key).ok_or_else(|| link_not_found(key))?;
            if entry.metadata.finalizers.is_empty() {
                None
            } else {
                let old = entry.clone();
                if entry.metadata.deletion_timestamp.is_none() {
                    entry.metadata.deletion_timestamp = Some(Utc::now());
                }
                entry.metadata.resource_version = self.next_revision();
                Some((old, entry.clone()))
            }
        };

        match marked {
            Some((old, new)) => {
                debug!(link = %key, "link marked for deletion");
                self.notify_updated(old, new);
            }
            None => self.remove_link(key),
        }
        Ok(())
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn next_revision(&self) -> String {
        (self.revision.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn check_transport(&self) -> Result<(), StoreError> {
        if take_one(&self.injected_failures) {
            return Err(StoreError::Transport("injected failure".into()));
        }
        Ok(())
    }

    fn notify_updated(&self, old: DeviceLink, new: DeviceLink) {
        let _ = self.events.send(LinkEvent::Updated {
            old: Arc::new(old),
            new: Arc::new(new),
        });
    }

    /// Physically remove a link and cascade to the devices it controls.
    fn remove_link(&self, key: &ObjectKey) {
        let Some((_, removed)) = self.links.remove(key) else {
            return;
        };
        let uid = removed.metadata.uid.clone();
        self.devices
            .retain(|_, device| device.controller_uid().as_deref() != Some(uid.as_str()));
        debug!(link = %key, "link removed");
        let _ = self.events.send(LinkEvent::Deleted(Arc::new(removed)));
    }

    fn write_link<F>(&self, link: &DeviceLink, apply: F) -> Result<DeviceLink, StoreError>
    where
        F: FnOnce(&mut DeviceLink, &DeviceLink),
    {
        let key = link.key();
        let (old, new) = {
            let mut entry = self.links.get_mut(&key).ok_or_else(|| link_not_found(&key))?;
            if take_one(&self.injected_conflicts) {
                entry.metadata.resource_version = self.next_revision();
            }
            if entry.metadata.resource_version != link.metadata.resource_version {
                return Err(StoreError::Conflict {
                    kind: DEVICE_LINK_KIND.into(),
                    key,
                    expected: link.metadata.resource_version.clone(),
                    actual: entry.metadata.resource_version.clone(),
                });
            }
            let old = entry.clone();
            apply(&mut *entry, link);
            entry.metadata.resource_version = self.next_revision();
            (old, entry.clone())
        };

        if new.is_deleting() && new.metadata.finalizers.is_empty() {
            self.remove_link(&key);
        } else {
            self.notify_updated(old, new.clone());
        }
        Ok(new)
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn link_not_found(key: &ObjectKey) -> StoreError {
    StoreError::NotFound {
        kind: DEVICE_LINK_KIND.into(),
        key: key.clone(),
    }
}

fn device_not_found(model: &TypeMeta, key: &ObjectKey) -> StoreError {
    StoreError::NotFound {
        kind: model.kind.clone(),
        key: key.clone(),
    }
}

fn no_match(model: &TypeMeta) -> StoreError {
    StoreError::NoMatch {
        api_version: model.api_version.clone(),
        kind: model.kind.clone(),
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get_link(&self, key: &ObjectKey) -> Result<DeviceLink, StoreError> {
        self.check_transport()?;
        self.links
            .get(key)
            .map(|r| r.value().clone())
            .ok_or_else(|| link_not_found(key))
    }

    async fn list_links(&self) -> Result<Vec<DeviceLink>, StoreError> {
        self.check_transport()?;
        let mut links: Vec<_> = self.links.iter().map(|r| r.value().clone()).collect();
        links.sort_by_key(DeviceLink::key);
        Ok(links)
    }

    async fn update_link(&self, link: &DeviceLink) -> Result<DeviceLink, StoreError> {
        self.check_transport()?;
        let updated = self.write_link(link, |stored, incoming| {
            if stored.spec != incoming.spec {
                stored.metadata.generation += 1;
            }
            stored.spec = incoming.spec.clone();
            stored.metadata.labels = incoming.metadata.labels.clone();
            stored.metadata.annotations = incoming.metadata.annotations.clone();
            stored.metadata.finalizers = incoming.metadata.finalizers.clone();
            stored.metadata.owner_references = incoming.metadata.owner_references.clone();
        })?;
        self.writes.link_updates.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }

    async fn update_link_status(&self, link: &DeviceLink) -> Result<DeviceLink, StoreError> {
        self.check_transport()?;
        let updated = self.write_link(link, |stored, incoming| {
            stored.status = incoming.status.clone();
        })?;
        self.writes.status_updates.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }

    async fn model_registered(&self, model: &TypeMeta) -> Result<bool, StoreError> {
        self.check_transport()?;
        Ok(self.models.contains(model))
    }

    async fn get_device(
        &self,
        model: &TypeMeta,
        key: &ObjectKey,
    ) -> Result<DynamicObject, StoreError> {
        self.check_transport()?;
        if !self.models.contains(model) {
            return Err(no_match(model));
        }
        self.devices
            .get(&(model.clone(), key.clone()))
            .map(|r| r.value().clone())
            .ok_or_else(|| device_not_found(model, key))
    }

    async fn create_device(&self, device: &DynamicObject) -> Result<DynamicObject, StoreError> {
        self.check_transport()?;
        let model = device.type_meta();
        if !self.models.contains(&model) {
            return Err(no_match(&model));
        }
        let key = device.key();
        let mut stored = device.clone();
        stored.set_uid(&Uuid::new_v4().to_string());
        stored.set_resource_version(&self.next_revision());

        match self.devices.entry((model.clone(), key.clone())) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists {
                kind: model.kind,
                key,
            }),
            Entry::Vacant(slot) => {
                slot.insert(stored.clone());
                self.writes.device_creates.fetch_add(1, Ordering::SeqCst);
                Ok(stored)
            }
        }
    }

    async fn update_device(&self, device: &DynamicObject) -> Result<DynamicObject, StoreError> {
        self.check_transport()?;
        let model = device.type_meta();
        if !self.models.contains(&model) {
            return Err(no_match(&model));
        }
        let key = device.key();
        let mut entry = self
            .devices
            .get_mut(&(model.clone(), key.clone()))
            .ok_or_else(|| device_not_found(&model, &key))?;
        if entry.resource_version() != device.resource_version() {
            return Err(StoreError::Conflict {
                kind: model.kind,
                key,
                expected: device.resource_version().to_owned(),
                actual: entry.resource_version().to_owned(),
            });
        }
        let mut stored = device.clone();
        stored.set_uid(entry.uid());
        stored.set_resource_version(&self.next_revision());
        *entry = stored.clone();
        self.writes.device_updates.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }
}
