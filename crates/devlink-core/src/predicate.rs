// ── Watch filtering ──

use crate::model::DeviceLink;
use crate::store::LinkEvent;

/// Decides which link changes are worth a pass on this node.
///
/// A node cares about links bound to it, and about links that were bound to
/// it a moment ago (so it can drop their sessions). Updates that only move
/// the resource version are ignored.
#[derive(Debug, Clone)]
pub struct LinkChangedPredicate {
    pub node_name: String,
}

impl LinkChangedPredicate {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn create(&self, link: &DeviceLink) -> bool {
        self.bound_here(link)
    }

    pub fn update(&self, old: &DeviceLink, new: &DeviceLink) -> bool {
        if !self.bound_here(old) && !self.bound_here(new) {
            return false;
        }
        old.spec != new.spec
            || old.status != new.status
            || old.metadata.finalizers != new.metadata.finalizers
            || old.metadata.labels != new.metadata.labels
            || old.metadata.deletion_timestamp != new.metadata.deletion_timestamp
    }

    pub fn delete(&self, link: &DeviceLink) -> bool {
        self.bound_here(link)
    }

    pub fn matches(&self, event: &LinkEvent) -> bool {
        match event {
            LinkEvent::Created(link) => self.create(link),
            LinkEvent::Updated { old, new } => self.update(old, new),
            LinkEvent::Deleted(link) => self.delete(link),
        }
    }

    fn bound_here(&self, link: &DeviceLink) -> bool {
        link.status.node_name == self.node_name || link.spec.adaptor.node == self.node_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceLinkSpec, ObjectKey};

    fn link(node: &str) -> DeviceLink {
        let mut link = DeviceLink::new(&ObjectKey::new("default", "fan"), DeviceLinkSpec::default());
        link.spec.adaptor.node = node.into();
        link.status.node_name = node.into();
        link
    }

    #[test]
    fn ignores_links_for_other_nodes() {
        let predicate = LinkChangedPredicate::new("edge-1");
        assert!(predicate.create(&link("edge-1")));
        assert!(!predicate.create(&link("edge-2")));
        assert!(!predicate.delete(&link("edge-2")));
    }

    #[test]
    fn unbound_link_declared_for_this_node_passes() {
        let predicate = LinkChangedPredicate::new("edge-1");
        let mut fresh = link("edge-1");
        fresh.status.node_name.clear();
        assert!(predicate.create(&fresh));
    }

    #[test]
    fn resource_version_churn_is_ignored() {
        let predicate = LinkChangedPredicate::new("edge-1");
        let old = link("edge-1");
        let mut new = old.clone();
        new.metadata.resource_version = "99".into();
        assert!(!predicate.update(&old, &new));

        new.metadata.finalizers.push("x".into());
        assert!(predicate.update(&old, &new));
    }

    #[test]
    fn moving_away_still_notifies_previous_node() {
        let predicate = LinkChangedPredicate::new("edge-1");
        let old = link("edge-1");
        let new = link("edge-2");
        assert!(predicate.update(&old, &new));
    }
}
