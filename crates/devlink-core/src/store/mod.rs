// ── Resource store seam ──
//
// The reconciler talks to the record store only through this trait. Writes
// carry the resource version they were read at; a stale write is rejected
// with `StoreError::Conflict`, never merged.

mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{DeviceLink, DynamicObject, ObjectKey, TypeMeta};

pub use memory::{MemoryStore, WriteStats};

#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get_link(&self, key: &ObjectKey) -> Result<DeviceLink, StoreError>;

    async fn list_links(&self) -> Result<Vec<DeviceLink>, StoreError>;

    /// Write metadata and spec. The stored status is left as is.
    async fn update_link(&self, link: &DeviceLink) -> Result<DeviceLink, StoreError>;

    /// Write the status only.
    async fn update_link_status(&self, link: &DeviceLink) -> Result<DeviceLink, StoreError>;

    /// Whether the store has a schema registered for `model`.
    async fn model_registered(&self, model: &TypeMeta) -> Result<bool, StoreError>;

    async fn get_device(
        &self,
        model: &TypeMeta,
        key: &ObjectKey,
    ) -> Result<DynamicObject, StoreError>;

    async fn create_device(&self, device: &DynamicObject) -> Result<DynamicObject, StoreError>;

    async fn update_device(&self, device: &DynamicObject) -> Result<DynamicObject, StoreError>;
}

/// Change notification for DeviceLink records.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    Created(Arc<DeviceLink>),
    Updated {
        old: Arc<DeviceLink>,
        new: Arc<DeviceLink>,
    },
    Deleted(Arc<DeviceLink>),
}

impl LinkEvent {
    pub fn key(&self) -> ObjectKey {
        match self {
            Self::Created(link) | Self::Deleted(link) | Self::Updated { new: link, .. } => {
                link.key()
            }
        }
    }
}
