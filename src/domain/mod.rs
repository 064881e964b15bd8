//! # Domain Model
//!
//! User-authored configuration objects, the point-in-time snapshot the
//! synchronizer translates, and the per-resource findings that flow back into
//! status.

pub mod diagnostics;
pub mod resources;
pub mod snapshot;
pub mod status;

pub use diagnostics::{Diagnostic, DiagnosticReport, ResourceReport, Severity};
pub use resources::{
    Gateway, Host, Matcher, Resource, Route, RouteAction, RouteTable, Secret, Upstream,
    UpstreamSpec, VirtualService, WeightedDestination,
};
pub use snapshot::ApiSnapshot;
pub use status::{ResourceStatus, StatusState};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The configuration kinds the engine watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Gateway,
    VirtualService,
    RouteTable,
    Upstream,
    Secret,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Gateway,
        ResourceKind::VirtualService,
        ResourceKind::RouteTable,
        ResourceKind::Upstream,
        ResourceKind::Secret,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Gateway => "Gateway",
            ResourceKind::VirtualService => "VirtualService",
            ResourceKind::RouteTable => "RouteTable",
            ResourceKind::Upstream => "Upstream",
            ResourceKind::Secret => "Secret",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::Error::validation(format!("Unknown resource kind '{}'", s)))
    }
}

/// Identity of one configuration object. Ordering is (kind, namespace, name).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { kind, namespace: namespace.into(), name: name.into() }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}", self.kind, self.namespace, self.name)
    }
}

/// Reference from one object to another; the namespace defaults to the referrer's
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { namespace: None, name: name.into() }
    }

    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: Some(namespace.into()), name: name.into() }
    }

    pub fn resolve(&self, kind: ResourceKind, default_namespace: &str) -> ResourceRef {
        ResourceRef::new(
            kind,
            self.namespace.as_deref().unwrap_or(default_namespace),
            self.name.clone(),
        )
    }
}

/// Object metadata shared by every kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub namespace: String,
    pub name: String,
    /// Bumped by the store on every write
    #[serde(default)]
    pub resource_version: u64,
    /// One status per reporter owner
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub statuses: BTreeMap<String, ResourceStatus>,
}

impl Metadata {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            resource_version: 0,
            statuses: BTreeMap::new(),
        }
    }
}

/// Name used for generated fragments of a namespaced object
pub fn qualified_name(namespace: &str, name: &str) -> String {
    format!("{}_{}", namespace, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_ref_ordering_is_kind_namespace_name() {
        let mut refs = vec![
            ResourceRef::new(ResourceKind::Upstream, "a", "z"),
            ResourceRef::new(ResourceKind::Gateway, "b", "a"),
            ResourceRef::new(ResourceKind::Gateway, "a", "b"),
            ResourceRef::new(ResourceKind::Gateway, "a", "a"),
        ];
        refs.sort();

        let rendered: Vec<String> = refs.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec!["Gateway a.a", "Gateway a.b", "Gateway b.a", "Upstream a.z"]
        );
    }

    #[test]
    fn test_object_ref_defaults_to_referrer_namespace() {
        let local = ObjectRef::new("echo");
        let remote = ObjectRef::namespaced("shared", "echo");

        assert_eq!(local.resolve(ResourceKind::Upstream, "team").namespace, "team");
        assert_eq!(remote.resolve(ResourceKind::Upstream, "team").namespace, "shared");
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("routetable".parse::<ResourceKind>().unwrap(), ResourceKind::RouteTable);
        assert!("Listener".parse::<ResourceKind>().is_err());
    }
}
