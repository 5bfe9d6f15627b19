// ── DeviceLink domain types ──

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::condition::{ConditionStatus, ConditionType, Conditions};
use super::meta::{ObjectKey, ObjectMeta, OwnerReference, TypeMeta};
use super::raw::RawExtension;

pub const DEVICE_LINK_API_VERSION: &str = "edge.cattle.io/v1alpha1";
pub const DEVICE_LINK_KIND: &str = "DeviceLink";

/// Marks a link whose connection must be torn down before it may vanish.
pub const DEVICE_LINK_FINALIZER: &str = "edge.cattle.io/octopus-limb";

fn default_api_version() -> String {
    DEVICE_LINK_API_VERSION.into()
}
fn default_kind() -> String {
    DEVICE_LINK_KIND.into()
}

/// Declarative binding of a node, an adaptor, a device model and a template
/// into one managed connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLink {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: DeviceLinkSpec,
    #[serde(default)]
    pub status: DeviceLinkStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLinkSpec {
    pub adaptor: DeviceAdaptor,
    pub model: TypeMeta,
    #[serde(default)]
    pub template: DeviceTemplate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAdaptor {
    /// Node the adaptor (and therefore the connection) lives on.
    #[serde(default)]
    pub node: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<RawExtension>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceTemplate {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<RawExtension>,
}

/// Observed state. Owned by the controller side, never by the declarer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLinkStatus {
    /// Node the link is currently bound to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub adaptor_name: String,
    /// Mirror of the adaptor declaration last evaluated, parameters included.
    #[serde(default)]
    pub adaptor: DeviceAdaptor,
    /// Model resolved by admission.
    #[serde(default)]
    pub model: TypeMeta,
    #[serde(default)]
    pub conditions: Conditions,
}

impl DeviceLinkStatus {
    pub fn condition_status(&self, condition_type: ConditionType) -> ConditionStatus {
        self.conditions.status(condition_type)
    }
}

impl DeviceLink {
    pub fn new(key: &ObjectKey, spec: DeviceLinkSpec) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta::new(key),
            spec,
            status: DeviceLinkStatus::default(),
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.is_deleting()
    }

    /// Controlling owner reference to stamp onto the link's device.
    pub fn controller_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.metadata.name.clone(),
            uid: self.metadata.uid.clone(),
            controller: true,
            block_owner_deletion: true,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const MANIFEST: &str = r"
apiVersion: edge.cattle.io/v1alpha1
kind: DeviceLink
metadata:
  name: living-room-fan
  namespace: default
spec:
  adaptor:
    node: edge-worker
    name: adaptors.edge.cattle.io/dummy
    parameters:
      ip: 192.168.1.20
  model:
    apiVersion: devices.edge.cattle.io/v1alpha1
    kind: DummySpecialDevice
  template:
    labels:
      device: living-room-fan
    spec:
      protocol:
        location: living-room
      gear: slow
      on: true
";

    #[test]
    fn parses_manifest_without_status() {
        let link: DeviceLink = serde_yaml::from_str(MANIFEST).unwrap();
        assert_eq!(link.key(), ObjectKey::new("default", "living-room-fan"));
        assert_eq!(link.spec.adaptor.name, "adaptors.edge.cattle.io/dummy");
        assert_eq!(
            link.spec.adaptor.parameters.unwrap().as_bytes(),
            br#"{"ip":"192.168.1.20"}"#
        );
        assert_eq!(link.spec.model.kind, "DummySpecialDevice");
        assert_eq!(
            link.status.condition_status(ConditionType::ModelExisted),
            ConditionStatus::Unknown
        );
    }

    #[test]
    fn controller_reference_points_back_at_link() {
        let mut link: DeviceLink = serde_yaml::from_str(MANIFEST).unwrap();
        link.metadata.uid = "uid-1".into();
        let owner = link.controller_reference();
        assert_eq!(owner.kind, DEVICE_LINK_KIND);
        assert_eq!(owner.name, "living-room-fan");
        assert_eq!(owner.uid, "uid-1");
        assert!(owner.controller);
    }

    #[test]
    fn finalizer_matches_the_limb_marker() {
        // Links finalized by an older limb must still be released by this one.
        assert_eq!(DEVICE_LINK_FINALIZER, "edge.cattle.io/octopus-limb");
        let mut link: DeviceLink = serde_yaml::from_str(MANIFEST).unwrap();
        assert!(link.metadata.add_finalizer(DEVICE_LINK_FINALIZER));
        assert_eq!(link.metadata.finalizers, vec!["edge.cattle.io/octopus-limb".to_owned()]);
    }
}
