// ── Link admission ──
//
// Binds a link to the node named in its adaptor declaration and resolves
// its model. The reconciler only acts on links that went through here.

use std::sync::Arc;

use tracing::debug;

use crate::error::CoreError;
use crate::model::{ConditionStatus, ConditionType, ObjectKey, TypeMeta, reason};
use crate::store::ResourceStore;

pub struct LinkAdmitter {
    store: Arc<dyn ResourceStore>,
}

impl LinkAdmitter {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// Bind node and model for `key`. Returns whether the status was written.
    pub async fn admit(&self, key: &ObjectKey) -> Result<bool, CoreError> {
        let link = match self.store.get_link(key).await {
            Ok(link) => link,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if link.is_deleting() {
            return Ok(false);
        }

        let mut admitted = link.clone();
        admitted.status.node_name.clone_from(&link.spec.adaptor.node);

        let model = &link.spec.model;
        let registered = model.is_resolved() && self.store.model_registered(model).await?;
        let current = link.status.condition_status(ConditionType::ModelExisted);
        if registered {
            admitted.status.model = model.clone();
            if current != ConditionStatus::True {
                admitted
                    .status
                    .conditions
                    .succeed_on(ConditionType::ModelExisted, reason::MODEL_FOUND);
            }
        } else if current != ConditionStatus::False {
            admitted.status.model = TypeMeta::default();
            admitted.status.conditions.fail_on(
                ConditionType::ModelExisted,
                reason::MODEL_NOT_FOUND,
                &format!("model {model} is not registered"),
            );
        }

        if admitted.status == link.status {
            return Ok(false);
        }
        debug!(link = %key, node = %admitted.status.node_name, registered, "link admitted");
        self.store.update_link_status(&admitted).await?;
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{DeviceLink, DeviceLinkSpec};
    use crate::store::MemoryStore;

    fn model() -> TypeMeta {
        TypeMeta::new("devices.edge.cattle.io/v1alpha1", "DummyDevice")
    }

    fn seed(store: &MemoryStore) -> ObjectKey {
        let mut spec = DeviceLinkSpec::default();
        spec.adaptor.node = "edge-1".into();
        spec.model = model();
        store
            .create_link(DeviceLink::new(&ObjectKey::new("default", "fan"), spec))
            .unwrap()
            .key()
    }

    #[tokio::test]
    async fn binds_node_and_model() {
        let store = Arc::new(MemoryStore::new());
        store.register_model(model());
        let key = seed(&store);

        let admitter = LinkAdmitter::new(store.clone());
        assert!(admitter.admit(&key).await.unwrap());

        let link = store.get_link(&key).await.unwrap();
        assert_eq!(link.status.node_name, "edge-1");
        assert_eq!(link.status.model, model());
        assert!(link.status.conditions.is_true(ConditionType::ModelExisted));

        assert!(!admitter.admit(&key).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_model_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let key = seed(&store);

        LinkAdmitter::new(store.clone()).admit(&key).await.unwrap();
        let link = store.get_link(&key).await.unwrap();
        assert_eq!(
            link.status.condition_status(ConditionType::ModelExisted),
            ConditionStatus::False
        );
        assert!(!link.status.model.is_resolved());
    }

    #[tokio::test]
    async fn unregistering_the_model_revokes_it() {
        let store = Arc::new(MemoryStore::new());
        store.register_model(model());
        let key = seed(&store);
        let admitter = LinkAdmitter::new(store.clone());
        admitter.admit(&key).await.unwrap();

        store.unregister_model(&model());
        assert!(admitter.admit(&key).await.unwrap());
        let link = store.get_link(&key).await.unwrap();
        assert!(!link.status.conditions.is_true(ConditionType::ModelExisted));
    }
}
