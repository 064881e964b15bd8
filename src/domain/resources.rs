//! # Configuration Objects
//!
//! The five user-authored kinds. Every kind carries [`Metadata`]; the
//! [`Resource`] sum type is the unit the store hands out and the validator
//! overlays. On the wire a resource is tagged by `kind`:
//!
//! ```yaml
//! - kind: Upstream
//!   metadata: { namespace: default, name: echo }
//!   spec:
//!     static:
//!       hosts: [{ address: 10.0.0.7, port: 8080 }]
//! ```

use super::{Metadata, ObjectRef, ResourceKind, ResourceRef};
use serde::{Deserialize, Serialize};

fn default_bind_address() -> String {
    "::".to_string()
}

fn default_proxy_names() -> Vec<String> {
    vec!["gateway-proxy".to_string()]
}

fn default_domains() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_weight() -> u32 {
    1
}

fn default_redirect_code() -> u16 {
    301
}

/// A listener served by one or more proxies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gateway {
    pub metadata: Metadata,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    pub bind_port: u16,
    #[serde(default = "default_proxy_names")]
    pub proxy_names: Vec<String>,
    #[serde(default)]
    pub ssl: bool,
    /// Empty selects every virtual service in the gateway's namespace
    #[serde(default)]
    pub virtual_services: Vec<ObjectRef>,
}

impl Gateway {
    pub fn new(namespace: &str, name: &str, bind_port: u16) -> Self {
        Self {
            metadata: Metadata::new(namespace, name),
            bind_address: default_bind_address(),
            bind_port,
            proxy_names: default_proxy_names(),
            ssl: false,
            virtual_services: Vec::new(),
        }
    }
}

/// Root of a routing table: domains plus ordered routes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualService {
    pub metadata: Metadata,
    #[serde(default = "default_domains")]
    pub domains: Vec<String>,
    #[serde(default)]
    pub routes: Vec<Route>,
    /// TLS material used when served by an ssl gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_secret: Option<ObjectRef>,
}

impl VirtualService {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            metadata: Metadata::new(namespace, name),
            domains: default_domains(),
            routes: Vec::new(),
            ssl_secret: None,
        }
    }
}

/// Routes delegated to from a virtual service or another route table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTable {
    pub metadata: Metadata,
    #[serde(default)]
    pub routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self { metadata: Metadata::new(namespace, name), routes: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub matcher: Matcher,
    pub action: RouteAction,
}

impl Route {
    pub fn new(matcher: Matcher, action: RouteAction) -> Self {
        Self { name: None, matcher, action }
    }

    pub fn named(name: &str, matcher: Matcher, action: RouteAction) -> Self {
        Self { name: Some(name.to_string()), matcher, action }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Matcher {
    Prefix(String),
    Exact(String),
    Regex(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RouteAction {
    Forward {
        upstream: ObjectRef,
    },
    WeightedForward {
        destinations: Vec<WeightedDestination>,
    },
    Delegate {
        route_table: ObjectRef,
    },
    DirectResponse {
        status: u16,
        #[serde(default)]
        body: String,
    },
    Redirect {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(default = "default_redirect_code")]
        code: u16,
    },
}

impl RouteAction {
    pub fn forward(upstream: &str) -> Self {
        RouteAction::Forward { upstream: ObjectRef::new(upstream) }
    }

    pub fn delegate(route_table: &str) -> Self {
        RouteAction::Delegate { route_table: ObjectRef::new(route_table) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedDestination {
    pub upstream: ObjectRef,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

/// Backend target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Upstream {
    pub metadata: Metadata,
    pub spec: UpstreamSpec,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_secret: Option<ObjectRef>,
}

impl Upstream {
    pub fn with_hosts(namespace: &str, name: &str, hosts: Vec<Host>) -> Self {
        Self {
            metadata: Metadata::new(namespace, name),
            spec: UpstreamSpec::Static { hosts },
            connect_timeout_ms: default_connect_timeout_ms(),
            tls_secret: None,
        }
    }

    pub fn discovered(namespace: &str, name: &str, service: &str) -> Self {
        Self {
            metadata: Metadata::new(namespace, name),
            spec: UpstreamSpec::Discovered { service: service.to_string() },
            connect_timeout_ms: default_connect_timeout_ms(),
            tls_secret: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpstreamSpec {
    /// Fixed host list, translated straight into an endpoint set
    Static { hosts: Vec<Host> },
    /// Membership resolved by the discovery subsystem
    Discovered { service: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub address: String,
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl Host {
    pub fn new(address: &str, port: u16) -> Self {
        Self { address: address.to_string(), port, weight: default_weight() }
    }
}

/// Inline PEM material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    pub metadata: Metadata,
    pub cert_chain: String,
    pub private_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_ca: Option<String>,
}

/// Any configuration object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Resource {
    Gateway(Gateway),
    VirtualService(VirtualService),
    RouteTable(RouteTable),
    Upstream(Upstream),
    Secret(Secret),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Gateway(_) => ResourceKind::Gateway,
            Resource::VirtualService(_) => ResourceKind::VirtualService,
            Resource::RouteTable(_) => ResourceKind::RouteTable,
            Resource::Upstream(_) => ResourceKind::Upstream,
            Resource::Secret(_) => ResourceKind::Secret,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            Resource::Gateway(r) => &r.metadata,
            Resource::VirtualService(r) => &r.metadata,
            Resource::RouteTable(r) => &r.metadata,
            Resource::Upstream(r) => &r.metadata,
            Resource::Secret(r) => &r.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        match self {
            Resource::Gateway(r) => &mut r.metadata,
            Resource::VirtualService(r) => &mut r.metadata,
            Resource::RouteTable(r) => &mut r.metadata,
            Resource::Upstream(r) => &mut r.metadata,
            Resource::Secret(r) => &mut r.metadata,
        }
    }

    pub fn resource_ref(&self) -> ResourceRef {
        let metadata = self.metadata();
        ResourceRef::new(self.kind(), metadata.namespace.clone(), metadata.name.clone())
    }
}

impl From<Gateway> for Resource {
    fn from(value: Gateway) -> Self {
        Resource::Gateway(value)
    }
}

impl From<VirtualService> for Resource {
    fn from(value: VirtualService) -> Self {
        Resource::VirtualService(value)
    }
}

impl From<RouteTable> for Resource {
    fn from(value: RouteTable) -> Self {
        Resource::RouteTable(value)
    }
}

impl From<Upstream> for Resource {
    fn from(value: Upstream) -> Self {
        Resource::Upstream(value)
    }
}

impl From<Secret> for Resource {
    fn from(value: Secret) -> Self {
        Resource::Secret(value)
    }
}
