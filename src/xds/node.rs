//! Consumer identity derived from the Envoy node that opened a stream.

use envoy_types::pb::envoy::config::core::v3::Node;
use envoy_types::pb::google::protobuf::value::Kind;
use serde::Serialize;
use std::fmt;

/// Node metadata field carrying `namespace~proxy`
pub const ROLE_METADATA_KEY: &str = "role";
/// Key served to nodes whose role is missing or malformed
pub const FALLBACK_KEY: &str = "misconfigured-node";
/// Key the discovery subsystem publishes endpoint sets under
pub const DISCOVERY_KEY: &str = "discovery~endpoints";

const SEPARATOR: char = '~';

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ConsumerKey(String);

impl ConsumerKey {
    pub fn new(namespace: &str, proxy: &str) -> Self {
        Self(format!("{}{}{}", namespace, SEPARATOR, proxy))
    }

    pub fn fallback() -> Self {
        Self(FALLBACK_KEY.to_string())
    }

    pub fn discovery() -> Self {
        Self(DISCOVERY_KEY.to_string())
    }

    /// Accepts exactly `namespace~proxy` with both halves non-empty
    pub fn parse(role: &str) -> Option<Self> {
        let (namespace, proxy) = role.split_once(SEPARATOR)?;
        if namespace.is_empty() || proxy.is_empty() || proxy.contains(SEPARATOR) {
            return None;
        }
        Some(Self::new(namespace, proxy))
    }

    /// Key for a connecting node, falling back when the role is unusable
    pub fn from_node(node: Option<&Node>) -> Self {
        node.and_then(role_of).and_then(|role| Self::parse(&role)).unwrap_or_else(Self::fallback)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_fallback(&self) -> bool {
        self.0 == FALLBACK_KEY
    }

    pub fn namespace(&self) -> Option<&str> {
        self.0.split_once(SEPARATOR).map(|(ns, _)| ns)
    }

    pub fn proxy(&self) -> Option<&str> {
        self.0.split_once(SEPARATOR).map(|(_, proxy)| proxy)
    }
}

impl fmt::Display for ConsumerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn role_of(node: &Node) -> Option<String> {
    let value = node.metadata.as_ref()?.fields.get(ROLE_METADATA_KEY)?;
    match value.kind.as_ref() {
        Some(Kind::StringValue(role)) if !role.is_empty() => Some(role.clone()),
        _ => None,
    }
}
