//! # Proxy Configuration Graph
//!
//! Translated configuration, one name-keyed table per fragment kind.
//! Fragments refer to each other by name only; [`ProxyGraph::dangling_references`]
//! reports every name that does not resolve.

use crate::domain::{Matcher, ResourceRef};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// PEM material carried through to Envoy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TlsMaterial {
    pub cert_chain: String,
    pub private_key: String,
    pub root_ca: Option<String>,
}

/// Certificate served for a set of SNI names
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SniCertificate {
    pub server_names: Vec<String>,
    pub material: TlsMaterial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenerFragment {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub proxy_names: Vec<String>,
    pub route_table: String,
    /// Empty for plaintext listeners
    pub tls: Vec<SniCertificate>,
    pub origin: Option<ResourceRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteTableFragment {
    pub name: String,
    pub virtual_hosts: Vec<VirtualHostFragment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualHostFragment {
    pub name: String,
    pub domains: Vec<String>,
    pub routes: Vec<RouteFragment>,
    pub origin: Option<ResourceRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteFragment {
    pub name: String,
    pub matcher: Matcher,
    pub action: RouteFragmentAction,
    /// Resource that declared the route
    pub origin: Option<ResourceRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterWeight {
    pub cluster: String,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RouteFragmentAction {
    Cluster(String),
    WeightedClusters(Vec<ClusterWeight>),
    DirectResponse { status: u16, body: String },
    Redirect { host: Option<String>, path: Option<String>, code: u16 },
}

impl RouteFragmentAction {
    pub fn clusters(&self) -> Vec<&str> {
        match self {
            RouteFragmentAction::Cluster(name) => vec![name.as_str()],
            RouteFragmentAction::WeightedClusters(weights) => {
                weights.iter().map(|w| w.cluster.as_str()).collect()
            }
            RouteFragmentAction::DirectResponse { .. } | RouteFragmentAction::Redirect { .. } => {
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterFragment {
    pub name: String,
    pub connect_timeout_ms: u64,
    pub tls: Option<TlsMaterial>,
    /// Service name for discovered upstreams
    pub service: Option<String>,
    pub origin: Option<ResourceRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
    pub weight: u32,
}

/// Endpoints of one cluster; named after the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointSet {
    pub cluster: String,
    pub endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FragmentKind {
    Listener,
    RouteTable,
    Cluster,
    Endpoints,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FragmentRef {
    pub kind: FragmentKind,
    pub name: String,
}

impl FragmentRef {
    pub fn new(kind: FragmentKind, name: impl Into<String>) -> Self {
        Self { kind, name: name.into() }
    }
}

impl fmt::Display for FragmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.kind, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Fragment {
    Listener(ListenerFragment),
    RouteTable(RouteTableFragment),
    Cluster(ClusterFragment),
    Endpoints(EndpointSet),
}

impl Fragment {
    pub fn fragment_ref(&self) -> FragmentRef {
        match self {
            Fragment::Listener(l) => FragmentRef::new(FragmentKind::Listener, &l.name),
            Fragment::RouteTable(r) => FragmentRef::new(FragmentKind::RouteTable, &r.name),
            Fragment::Cluster(c) => FragmentRef::new(FragmentKind::Cluster, &c.name),
            Fragment::Endpoints(e) => FragmentRef::new(FragmentKind::Endpoints, &e.cluster),
        }
    }
}

/// A name that does not resolve: `from` points at `to`, which is absent
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DanglingReference {
    pub from: FragmentRef,
    pub to: FragmentRef,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProxyGraph {
    pub listeners: BTreeMap<String, ListenerFragment>,
    pub route_tables: BTreeMap<String, RouteTableFragment>,
    pub clusters: BTreeMap<String, ClusterFragment>,
    pub endpoints: BTreeMap<String, EndpointSet>,
}

impl ProxyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, fragment: Fragment) {
        match fragment {
            Fragment::Listener(l) => {
                self.listeners.insert(l.name.clone(), l);
            }
            Fragment::RouteTable(r) => {
                self.route_tables.insert(r.name.clone(), r);
            }
            Fragment::Cluster(c) => {
                self.clusters.insert(c.name.clone(), c);
            }
            Fragment::Endpoints(e) => {
                self.endpoints.insert(e.cluster.clone(), e);
            }
        }
    }

    pub fn remove(&mut self, fragment: &FragmentRef) -> Option<Fragment> {
        match fragment.kind {
            FragmentKind::Listener => self.listeners.remove(&fragment.name).map(Fragment::Listener),
            FragmentKind::RouteTable => {
                self.route_tables.remove(&fragment.name).map(Fragment::RouteTable)
            }
            FragmentKind::Cluster => self.clusters.remove(&fragment.name).map(Fragment::Cluster),
            FragmentKind::Endpoints => {
                self.endpoints.remove(&fragment.name).map(Fragment::Endpoints)
            }
        }
    }

    pub fn contains(&self, fragment: &FragmentRef) -> bool {
        match fragment.kind {
            FragmentKind::Listener => self.listeners.contains_key(&fragment.name),
            FragmentKind::RouteTable => self.route_tables.contains_key(&fragment.name),
            FragmentKind::Cluster => self.clusters.contains_key(&fragment.name),
            FragmentKind::Endpoints => self.endpoints.contains_key(&fragment.name),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
            && self.route_tables.is_empty()
            && self.clusters.is_empty()
            && self.endpoints.is_empty()
    }

    pub fn fragment_count(&self) -> usize {
        self.listeners.len() + self.route_tables.len() + self.clusters.len() + self.endpoints.len()
    }

    /// Every cluster name any route points at
    pub fn referenced_clusters(&self) -> BTreeSet<String> {
        self.route_tables
            .values()
            .flat_map(|rt| rt.virtual_hosts.iter())
            .flat_map(|vh| vh.routes.iter())
            .flat_map(|route| route.action.clusters())
            .map(str::to_string)
            .collect()
    }

    /// Names every proxy mentioned by a listener
    pub fn proxy_names(&self) -> BTreeSet<String> {
        self.listeners.values().flat_map(|l| l.proxy_names.iter().cloned()).collect()
    }

    pub fn dangling_references(&self) -> Vec<DanglingReference> {
        let mut dangling = Vec::new();

        for listener in self.listeners.values() {
            if !self.route_tables.contains_key(&listener.route_table) {
                dangling.push(DanglingReference {
                    from: FragmentRef::new(FragmentKind::Listener, &listener.name),
                    to: FragmentRef::new(FragmentKind::RouteTable, &listener.route_table),
                });
            }
        }

        for table in self.route_tables.values() {
            let from = FragmentRef::new(FragmentKind::RouteTable, &table.name);
            let missing: BTreeSet<&str> = table
                .virtual_hosts
                .iter()
                .flat_map(|vh| vh.routes.iter())
                .flat_map(|route| route.action.clusters())
                .filter(|cluster| !self.clusters.contains_key(*cluster))
                .collect();
            for cluster in missing {
                dangling.push(DanglingReference {
                    from: from.clone(),
                    to: FragmentRef::new(FragmentKind::Cluster, cluster),
                });
            }
        }

        for set in self.endpoints.values() {
            if !self.clusters.contains_key(&set.cluster) {
                dangling.push(DanglingReference {
                    from: FragmentRef::new(FragmentKind::Endpoints, &set.cluster),
                    to: FragmentRef::new(FragmentKind::Cluster, &set.cluster),
                });
            }
        }

        dangling
    }

    /// The listeners served to one proxy plus everything they reach
    pub fn subset_for(&self, proxy_name: &str) -> ProxyGraph {
        self.subset_matching(|listener| listener.proxy_names.iter().any(|p| p == proxy_name))
    }

    /// Listeners accepted by `keep`, plus everything they reach
    pub fn subset_matching(&self, keep: impl Fn(&ListenerFragment) -> bool) -> ProxyGraph {
        let mut subset = ProxyGraph::new();

        for listener in self.listeners.values() {
            if !keep(listener) {
                continue;
            }
            subset.listeners.insert(listener.name.clone(), listener.clone());
            if let Some(table) = self.route_tables.get(&listener.route_table) {
                subset.route_tables.insert(table.name.clone(), table.clone());
            }
        }

        for cluster in subset.referenced_clusters() {
            if let Some(fragment) = self.clusters.get(&cluster) {
                subset.clusters.insert(cluster.clone(), fragment.clone());
            }
            if let Some(set) = self.endpoints.get(&cluster) {
                subset.endpoints.insert(cluster.clone(), set.clone());
            }
        }

        subset
    }
}
