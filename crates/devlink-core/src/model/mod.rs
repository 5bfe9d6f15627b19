// ── Domain model ──
//
// DeviceLink (typed, declared by users) and its dependent Device
// (runtime-typed, rendered from the link's template).

pub mod condition;
pub mod device;
pub mod link;
pub mod meta;
pub mod raw;

pub use condition::{Condition, ConditionStatus, ConditionType, Conditions, reason};
pub use device::DynamicObject;
pub use link::{
    DEVICE_LINK_API_VERSION, DEVICE_LINK_FINALIZER, DEVICE_LINK_KIND, DeviceAdaptor, DeviceLink,
    DeviceLinkSpec, DeviceLinkStatus, DeviceTemplate,
};
pub use meta::{ObjectKey, ObjectMeta, OwnerReference, TypeMeta};
pub use raw::RawExtension;
