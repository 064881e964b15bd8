//! Point-in-time view of every watched collection.

use super::{
    Gateway, Resource, ResourceKind, ResourceRef, RouteTable, Secret, Upstream, VirtualService,
};
use std::collections::BTreeMap;

/// Immutable aggregate the synchronizer translates. Every collection is keyed
/// by [`ResourceRef`], so iteration order is canonical.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiSnapshot {
    pub gateways: BTreeMap<ResourceRef, Gateway>,
    pub virtual_services: BTreeMap<ResourceRef, VirtualService>,
    pub route_tables: BTreeMap<ResourceRef, RouteTable>,
    pub upstreams: BTreeMap<ResourceRef, Upstream>,
    pub secrets: BTreeMap<ResourceRef, Secret>,
}

impl ApiSnapshot {
    pub fn from_resources<I>(resources: I) -> Self
    where
        I: IntoIterator<Item = Resource>,
    {
        let mut snapshot = Self::default();
        for resource in resources {
            snapshot.insert(resource);
        }
        snapshot
    }

    fn insert(&mut self, resource: Resource) {
        let key = resource.resource_ref();
        match resource {
            Resource::Gateway(r) => {
                self.gateways.insert(key, r);
            }
            Resource::VirtualService(r) => {
                self.virtual_services.insert(key, r);
            }
            Resource::RouteTable(r) => {
                self.route_tables.insert(key, r);
            }
            Resource::Upstream(r) => {
                self.upstreams.insert(key, r);
            }
            Resource::Secret(r) => {
                self.secrets.insert(key, r);
            }
        }
    }

    fn delete(&mut self, key: &ResourceRef) {
        match key.kind {
            ResourceKind::Gateway => {
                self.gateways.remove(key);
            }
            ResourceKind::VirtualService => {
                self.virtual_services.remove(key);
            }
            ResourceKind::RouteTable => {
                self.route_tables.remove(key);
            }
            ResourceKind::Upstream => {
                self.upstreams.remove(key);
            }
            ResourceKind::Secret => {
                self.secrets.remove(key);
            }
        }
    }

    pub fn get(&self, key: &ResourceRef) -> Option<Resource> {
        match key.kind {
            ResourceKind::Gateway => self.gateways.get(key).cloned().map(Resource::from),
            ResourceKind::VirtualService => {
                self.virtual_services.get(key).cloned().map(Resource::from)
            }
            ResourceKind::RouteTable => self.route_tables.get(key).cloned().map(Resource::from),
            ResourceKind::Upstream => self.upstreams.get(key).cloned().map(Resource::from),
            ResourceKind::Secret => self.secrets.get(key).cloned().map(Resource::from),
        }
    }

    pub fn contains(&self, key: &ResourceRef) -> bool {
        match key.kind {
            ResourceKind::Gateway => self.gateways.contains_key(key),
            ResourceKind::VirtualService => self.virtual_services.contains_key(key),
            ResourceKind::RouteTable => self.route_tables.contains_key(key),
            ResourceKind::Upstream => self.upstreams.contains_key(key),
            ResourceKind::Secret => self.secrets.contains_key(key),
        }
    }

    /// A new snapshot with `resource` inserted or replaced
    pub fn upsert(&self, resource: Resource) -> Self {
        let mut next = self.clone();
        next.insert(resource);
        next
    }

    /// A new snapshot without `key`
    pub fn remove(&self, key: &ResourceRef) -> Self {
        let mut next = self.clone();
        next.delete(key);
        next
    }

    pub fn all_refs(&self) -> Vec<ResourceRef> {
        let mut refs: Vec<ResourceRef> = self
            .gateways
            .keys()
            .chain(self.virtual_services.keys())
            .chain(self.route_tables.keys())
            .chain(self.upstreams.keys())
            .chain(self.secrets.keys())
            .cloned()
            .collect();
        refs.sort();
        refs
    }

    pub fn resource_version(&self, key: &ResourceRef) -> Option<u64> {
        self.get(key).map(|r| r.metadata().resource_version)
    }

    pub fn len(&self) -> usize {
        self.gateways.len()
            + self.virtual_services.len()
            + self.route_tables.len()
            + self.upstreams.len()
            + self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Host;

    #[test]
    fn test_upsert_and_remove_leave_original_untouched() {
        let base = ApiSnapshot::from_resources(vec![Resource::from(Upstream::with_hosts(
            "default",
            "echo",
            vec![Host::new("10.0.0.1", 80)],
        ))]);

        let added = base.upsert(Gateway::new("default", "gw", 8080).into());
        assert_eq!(base.len(), 1);
        assert_eq!(added.len(), 2);

        let key = ResourceRef::new(ResourceKind::Upstream, "default", "echo");
        let removed = added.remove(&key);
        assert!(added.contains(&key));
        assert!(!removed.contains(&key));
    }

    #[test]
    fn test_all_refs_are_canonical() {
        let snapshot = ApiSnapshot::from_resources(vec![
            Resource::from(Upstream::discovered("b", "u", "svc:80")),
            Resource::from(Gateway::new("z", "gw", 80)),
            Resource::from(VirtualService::new("a", "vs")),
        ]);

        let kinds: Vec<ResourceKind> = snapshot.all_refs().into_iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![ResourceKind::Gateway, ResourceKind::VirtualService, ResourceKind::Upstream]
        );
    }
}
