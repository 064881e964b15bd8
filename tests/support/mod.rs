//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use flowsync::domain::{
    Gateway, Host, Matcher, Resource, Route, RouteAction, Upstream, VirtualService,
};
use flowsync::sanitize::InvalidConfigPolicy;
use flowsync::store::InMemoryResourceStore;
use flowsync::syncer::{ConfigPipeline, ExtensionSet};
use flowsync::translation::{DefaultTranslator, ProxyGraph, Translator};
use flowsync::xds::ConsumerKey;
use std::sync::Arc;
use std::time::Duration;

pub const PROXY: &str = "gateway-proxy";

pub fn pipeline() -> ConfigPipeline {
    pipeline_with(Arc::new(DefaultTranslator::new()))
}

pub fn pipeline_with(translator: Arc<dyn Translator>) -> ConfigPipeline {
    ConfigPipeline::new(translator, &InvalidConfigPolicy::default(), ExtensionSet::empty())
}

pub fn key(namespace: &str) -> ConsumerKey {
    ConsumerKey::new(namespace, PROXY)
}

pub fn upstream(namespace: &str, name: &str, address: &str) -> Resource {
    Upstream::with_hosts(namespace, name, vec![Host::new(address, 8080)]).into()
}

pub fn virtual_service(namespace: &str, name: &str, domain: &str, routes: Vec<Route>) -> Resource {
    let mut vs = VirtualService::new(namespace, name);
    vs.domains = vec![domain.to_string()];
    vs.routes = routes;
    vs.into()
}

pub fn forward(name: &str, prefix: &str, upstream: &str) -> Route {
    Route::named(name, Matcher::Prefix(prefix.to_string()), RouteAction::forward(upstream))
}

/// Gateway, one virtual service routing `/` to `echo`, and the `echo` upstream
pub fn tenant(namespace: &str, port: u16) -> Vec<Resource> {
    vec![
        Gateway::new(namespace, "gw", port).into(),
        virtual_service(
            namespace,
            "vs",
            &format!("{}.example.com", namespace),
            vec![forward("root", "/", "echo")],
        ),
        upstream(namespace, "echo", "10.0.0.1"),
    ]
}

pub fn store_with(resources: Vec<Resource>) -> InMemoryResourceStore {
    InMemoryResourceStore::from_resources(resources).expect("seed store")
}

/// Route names published in `graph`, sorted
pub fn route_names(graph: &ProxyGraph) -> Vec<String> {
    let mut names: Vec<String> = graph
        .route_tables
        .values()
        .flat_map(|table| table.virtual_hosts.iter())
        .flat_map(|host| host.routes.iter().map(|route| route.name.clone()))
        .collect();
    names.sort();
    names
}

/// Poll `check` until it holds or `limit` elapses
pub async fn eventually<F>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
