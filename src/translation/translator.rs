use super::graph::{
    ClusterFragment, ClusterWeight, Endpoint, EndpointSet, Fragment, ListenerFragment, ProxyGraph,
    RouteFragment, RouteFragmentAction, RouteTableFragment, SniCertificate, TlsMaterial,
    VirtualHostFragment,
};
use super::{Translation, Translator};
use crate::domain::{
    qualified_name, ApiSnapshot, DiagnosticReport, Matcher, ResourceKind, ResourceRef, Route,
    RouteAction, Secret, UpstreamSpec,
};
use crate::errors::Result;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::debug;

const REDIRECT_CODES: [u16; 5] = [301, 302, 303, 307, 308];

pub fn cluster_name(upstream: &ResourceRef) -> String {
    qualified_name(&upstream.namespace, &upstream.name)
}

pub fn listener_name(gateway: &ResourceRef) -> String {
    qualified_name(&gateway.namespace, &gateway.name)
}

pub fn route_table_name(listener: &str) -> String {
    format!("listener-{}-routes", listener)
}

fn tls_material(secret: &Secret) -> TlsMaterial {
    TlsMaterial {
        cert_chain: secret.cert_chain.clone(),
        private_key: secret.private_key.clone(),
        root_ca: secret.root_ca.clone(),
    }
}

fn join_path(prefix: &str, path: &str) -> String {
    if path.is_empty() || path == "/" {
        return prefix.to_string();
    }
    match (prefix.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", prefix, &path[1..]),
        (false, false) => format!("{}/{}", prefix, path),
        _ => format!("{}{}", prefix, path),
    }
}

/// Matcher of a delegated route, rebased under the delegating prefix
fn nest_matcher(parent_prefix: Option<&str>, matcher: &Matcher) -> Matcher {
    let Some(prefix) = parent_prefix else {
        return matcher.clone();
    };
    match matcher {
        Matcher::Prefix(path) => Matcher::Prefix(join_path(prefix, path)),
        Matcher::Exact(path) => Matcher::Exact(join_path(prefix, path)),
        Matcher::Regex(pattern) => {
            Matcher::Regex(format!("{}{}", regex::escape(prefix), pattern.trim_start_matches('^')))
        }
    }
}

/// Stock translator: pure, and deterministic because every traversal walks
/// `BTreeMap`s in canonical order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTranslator;

impl DefaultTranslator {
    pub fn new() -> Self {
        Self
    }
}

impl Translator for DefaultTranslator {
    fn translate(&self, snapshot: &ApiSnapshot) -> Result<Translation> {
        let mut cycle = TranslationCycle::new(snapshot);
        cycle.upstreams();
        cycle.secrets();
        let routes = cycle.virtual_services();
        cycle.gateways(&routes);

        debug!(
            fragments = cycle.graph.fragment_count(),
            resources = cycle.report.len(),
            has_errors = cycle.report.has_errors(),
            "translated snapshot"
        );
        Ok(Translation { graph: cycle.graph, report: cycle.report })
    }
}

struct TranslationCycle<'a> {
    snapshot: &'a ApiSnapshot,
    graph: ProxyGraph,
    report: DiagnosticReport,
}

impl<'a> TranslationCycle<'a> {
    fn new(snapshot: &'a ApiSnapshot) -> Self {
        let mut report = DiagnosticReport::new();
        for key in snapshot.all_refs() {
            report.accept(&key);
        }
        Self { snapshot, graph: ProxyGraph::new(), report }
    }

    fn upstreams(&mut self) {
        let snapshot = self.snapshot;
        for (key, upstream) in &snapshot.upstreams {
            let name = cluster_name(key);

            let tls = match &upstream.tls_secret {
                Some(secret_ref) => {
                    let secret_key = secret_ref.resolve(ResourceKind::Secret, &key.namespace);
                    match snapshot.secrets.get(&secret_key) {
                        Some(secret) => Some(tls_material(secret)),
                        None => {
                            self.report
                                .add_error(key, format!("tls secret {} not found", secret_key));
                            None
                        }
                    }
                }
                None => None,
            };

            let service = match &upstream.spec {
                UpstreamSpec::Static { hosts } => {
                    if hosts.is_empty() {
                        self.report.add_error(key, "static upstream has no hosts");
                    }
                    let mut endpoints = Vec::new();
                    for host in hosts {
                        if host.port == 0 {
                            self.report.add_error(
                                key,
                                format!("host {} has invalid port 0", host.address),
                            );
                            continue;
                        }
                        endpoints.push(Endpoint {
                            address: host.address.clone(),
                            port: host.port,
                            weight: host.weight,
                        });
                    }
                    self.graph.insert(Fragment::Endpoints(EndpointSet {
                        cluster: name.clone(),
                        endpoints,
                    }));
                    None
                }
                UpstreamSpec::Discovered { service } => {
                    if service.trim().is_empty() {
                        self.report.add_error(key, "discovered upstream must name a service");
                    }
                    Some(service.clone())
                }
            };

            if upstream.connect_timeout_ms == 0 {
                self.report.add_error(key, "connect timeout must be greater than 0ms");
            }

            self.graph.insert(Fragment::Cluster(ClusterFragment {
                name,
                connect_timeout_ms: upstream.connect_timeout_ms,
                tls,
                service,
                origin: Some(key.clone()),
            }));
        }
    }

    fn secrets(&mut self) {
        let snapshot = self.snapshot;
        for (key, secret) in &snapshot.secrets {
            if secret.cert_chain.trim().is_empty() {
                self.report.add_error(key, "secret has an empty certificate chain");
            }
            if secret.private_key.trim().is_empty() {
                self.report.add_error(key, "secret has an empty private key");
            }
        }
    }

    /// Flattened routes per virtual service. Services that cannot be served at
    /// all are left out of the map.
    fn virtual_services(&mut self) -> BTreeMap<ResourceRef, Vec<RouteFragment>> {
        let snapshot = self.snapshot;
        let mut flattened = BTreeMap::new();

        for (key, vs) in &snapshot.virtual_services {
            if vs.domains.is_empty() {
                self.report.add_error(key, "virtual service declares no domains");
                continue;
            }
            if vs.routes.is_empty() {
                self.report.add_warning(key, "virtual service has no routes");
            }

            let mut routes = Vec::new();
            let mut chain = vec![key.clone()];
            self.flatten_routes(key, &vs.routes, None, &mut chain, &mut routes);
            flattened.insert(key.clone(), routes);
        }

        flattened
    }

    fn flatten_routes(
        &mut self,
        owner: &ResourceRef,
        routes: &[Route],
        parent_prefix: Option<&str>,
        chain: &mut Vec<ResourceRef>,
        out: &mut Vec<RouteFragment>,
    ) {
        let snapshot = self.snapshot;

        for (index, route) in routes.iter().enumerate() {
            let name = route.name.clone().unwrap_or_else(|| {
                format!("{}-route-{}", qualified_name(&owner.namespace, &owner.name), index)
            });

            let matcher = nest_matcher(parent_prefix, &route.matcher);
            if let Matcher::Regex(pattern) = &matcher {
                if let Err(e) = Regex::new(pattern) {
                    self.report.add_error(
                        owner,
                        format!("route {} has invalid regex {}: {}", name, pattern, e),
                    );
                    continue;
                }
            }

            let action = match &route.action {
                RouteAction::Forward { upstream } => {
                    let target = upstream.resolve(ResourceKind::Upstream, &owner.namespace);
                    if !snapshot.upstreams.contains_key(&target) {
                        self.report.add_error(
                            owner,
                            format!("route {} references missing upstream {}", name, target),
                        );
                    }
                    RouteFragmentAction::Cluster(cluster_name(&target))
                }
                RouteAction::WeightedForward { destinations } => {
                    let total: u64 = destinations.iter().map(|d| u64::from(d.weight)).sum();
                    if total == 0 {
                        self.report.add_error(
                            owner,
                            format!("route {} has weighted destinations with zero total weight", name),
                        );
                        continue;
                    }
                    let mut weights = Vec::new();
                    for destination in destinations.iter().filter(|d| d.weight > 0) {
                        let target =
                            destination.upstream.resolve(ResourceKind::Upstream, &owner.namespace);
                        if !snapshot.upstreams.contains_key(&target) {
                            self.report.add_error(
                                owner,
                                format!("route {} references missing upstream {}", name, target),
                            );
                        }
                        weights.push(ClusterWeight {
                            cluster: cluster_name(&target),
                            weight: destination.weight,
                        });
                    }
                    RouteFragmentAction::WeightedClusters(weights)
                }
                RouteAction::Delegate { route_table } => {
                    let target = route_table.resolve(ResourceKind::RouteTable, &owner.namespace);
                    let Matcher::Prefix(prefix) = &matcher else {
                        self.report.add_error(
                            owner,
                            format!(
                                "route {} delegates to {} but only prefix matchers can delegate",
                                name, target
                            ),
                        );
                        continue;
                    };
                    if chain.contains(&target) {
                        let cycle: Vec<String> = chain
                            .iter()
                            .chain(std::iter::once(&target))
                            .map(ToString::to_string)
                            .collect();
                        self.report.add_error(
                            owner,
                            format!("route {} forms a delegation cycle: {}", name, cycle.join(" -> ")),
                        );
                        continue;
                    }
                    let Some(table) = snapshot.route_tables.get(&target) else {
                        self.report.add_error(
                            owner,
                            format!("route {} delegates to missing route table {}", name, target),
                        );
                        continue;
                    };
                    if table.routes.is_empty() {
                        self.report.add_warning(&target, "route table has no routes");
                    }

                    let prefix = prefix.clone();
                    chain.push(target.clone());
                    self.flatten_routes(&target, &table.routes, Some(&prefix), chain, out);
                    chain.pop();
                    continue;
                }
                RouteAction::DirectResponse { status, body } => {
                    if !(100..=599).contains(status) {
                        self.report.add_error(
                            owner,
                            format!("route {} has invalid direct response status {}", name, status),
                        );
                        continue;
                    }
                    RouteFragmentAction::DirectResponse { status: *status, body: body.clone() }
                }
                RouteAction::Redirect { host, path, code } => {
                    if !REDIRECT_CODES.contains(code) {
                        self.report.add_error(
                            owner,
                            format!("route {} has unsupported redirect code {}", name, code),
                        );
                        continue;
                    }
                    RouteFragmentAction::Redirect {
                        host: host.clone(),
                        path: path.clone(),
                        code: *code,
                    }
                }
            };

            out.push(RouteFragment { name, matcher, action, origin: Some(owner.clone()) });
        }
    }

    fn gateways(&mut self, routes: &BTreeMap<ResourceRef, Vec<RouteFragment>>) {
        let snapshot = self.snapshot;
        // Proxies are deployed per namespace, so a binding is scoped by it
        let mut bindings: BTreeMap<(String, String, String, u16), ResourceRef> = BTreeMap::new();

        for (key, gateway) in &snapshot.gateways {
            if gateway.proxy_names.is_empty() {
                self.report.add_error(key, "gateway must name at least one proxy");
                continue;
            }
            if gateway.bind_port == 0 {
                self.report.add_error(key, "gateway bind port must not be 0");
                continue;
            }

            let conflict = gateway.proxy_names.iter().find_map(|proxy| {
                bindings
                    .get(&(
                        key.namespace.clone(),
                        proxy.clone(),
                        gateway.bind_address.clone(),
                        gateway.bind_port,
                    ))
                    .map(|other| (proxy.clone(), other.clone()))
            });
            if let Some((proxy, other)) = conflict {
                self.report.add_error(
                    key,
                    format!(
                        "bind address {}:{} for proxy {} is already used by {}",
                        gateway.bind_address, gateway.bind_port, proxy, other
                    ),
                );
                continue;
            }
            for proxy in &gateway.proxy_names {
                bindings.insert(
                    (
                        key.namespace.clone(),
                        proxy.clone(),
                        gateway.bind_address.clone(),
                        gateway.bind_port,
                    ),
                    key.clone(),
                );
            }

            let selected: Vec<ResourceRef> = if gateway.virtual_services.is_empty() {
                snapshot
                    .virtual_services
                    .keys()
                    .filter(|vs| vs.namespace == key.namespace)
                    .cloned()
                    .collect()
            } else {
                let mut refs = Vec::new();
                for vs_ref in &gateway.virtual_services {
                    let target = vs_ref.resolve(ResourceKind::VirtualService, &key.namespace);
                    if snapshot.virtual_services.contains_key(&target) {
                        refs.push(target);
                    } else {
                        self.report
                            .add_error(key, format!("virtual service {} not found", target));
                    }
                }
                refs.sort();
                refs.dedup();
                refs
            };

            let listener = listener_name(key);
            let mut claimed_domains: BTreeMap<&str, ResourceRef> = BTreeMap::new();
            let mut virtual_hosts = Vec::new();
            let mut tls = Vec::new();

            for vs_key in selected {
                let (Some(vs), Some(vs_routes)) =
                    (snapshot.virtual_services.get(&vs_key), routes.get(&vs_key))
                else {
                    continue;
                };

                let conflicts: Vec<(&str, ResourceRef)> = vs
                    .domains
                    .iter()
                    .filter_map(|d| claimed_domains.get(d.as_str()).map(|o| (d.as_str(), o.clone())))
                    .collect();
                if !conflicts.is_empty() {
                    for (domain, other) in conflicts {
                        let message = format!(
                            "domain {} is claimed by both {} and {} on gateway {}",
                            domain, other, vs_key, key
                        );
                        self.report.add_error(&other, message.clone());
                        self.report.add_error(&vs_key, message);
                    }
                    continue;
                }

                if gateway.ssl {
                    let Some(secret_ref) = &vs.ssl_secret else {
                        self.report.add_error(
                            &vs_key,
                            format!("virtual service has no sslSecret but is served by ssl gateway {}", key),
                        );
                        continue;
                    };
                    let secret_key = secret_ref.resolve(ResourceKind::Secret, &vs_key.namespace);
                    let Some(secret) = snapshot.secrets.get(&secret_key) else {
                        self.report
                            .add_error(&vs_key, format!("ssl secret {} not found", secret_key));
                        continue;
                    };
                    tls.push(SniCertificate {
                        server_names: vs.domains.iter().filter(|d| *d != "*").cloned().collect(),
                        material: tls_material(secret),
                    });
                }

                for domain in &vs.domains {
                    claimed_domains.insert(domain.as_str(), vs_key.clone());
                }
                virtual_hosts.push(VirtualHostFragment {
                    name: qualified_name(&vs_key.namespace, &vs_key.name),
                    domains: vs.domains.clone(),
                    routes: vs_routes.clone(),
                    origin: Some(vs_key.clone()),
                });
            }

            if gateway.ssl && tls.is_empty() {
                self.report.add_warning(key, "ssl gateway has no virtual services with tls material");
                continue;
            }

            let route_table = route_table_name(&listener);
            self.graph.insert(Fragment::RouteTable(RouteTableFragment {
                name: route_table.clone(),
                virtual_hosts,
            }));
            self.graph.insert(Fragment::Listener(ListenerFragment {
                name: listener,
                address: gateway.bind_address.clone(),
                port: gateway.bind_port,
                proxy_names: gateway.proxy_names.clone(),
                route_table,
                tls,
                origin: Some(key.clone()),
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Gateway, Host, ObjectRef, Resource, RouteTable, StatusState, Upstream, VirtualService,
        WeightedDestination,
    };

    fn upstream(name: &str) -> Resource {
        Upstream::with_hosts("default", name, vec![Host::new("10.0.0.1", 8080)]).into()
    }

    fn vs(name: &str, domains: &[&str], routes: Vec<Route>) -> Resource {
        let mut vs = VirtualService::new("default", name);
        vs.domains = domains.iter().map(|d| d.to_string()).collect();
        vs.routes = routes;
        vs.into()
    }

    fn key(kind: ResourceKind, name: &str) -> ResourceRef {
        ResourceRef::new(kind, "default", name)
    }

    fn translate(resources: Vec<Resource>) -> Translation {
        DefaultTranslator::new()
            .translate(&ApiSnapshot::from_resources(resources))
            .expect("translation succeeds")
    }

    #[test]
    fn test_basic_gateway_translation() {
        let translation = translate(vec![
            Gateway::new("default", "gw", 8080).into(),
            vs("vs", &["*"], vec![Route::new(Matcher::Prefix("/".into()), RouteAction::forward("echo"))]),
            upstream("echo"),
        ]);

        assert!(!translation.report.has_errors());
        let graph = &translation.graph;
        let listener = graph.listeners.get("default_gw").expect("listener");
        assert_eq!(listener.route_table, "listener-default_gw-routes");
        assert_eq!(listener.proxy_names, vec!["gateway-proxy"]);
        assert!(graph.clusters.contains_key("default_echo"));
        assert_eq!(graph.endpoints["default_echo"].endpoints.len(), 1);

        let table = &graph.route_tables["listener-default_gw-routes"];
        assert_eq!(table.virtual_hosts.len(), 1);
        assert_eq!(table.virtual_hosts[0].routes[0].name, "default_vs-route-0");
        assert!(graph.dangling_references().is_empty());
    }

    #[test]
    fn test_missing_upstream_is_error_on_owner_route_kept() {
        let translation = translate(vec![
            Gateway::new("default", "gw", 8080).into(),
            vs(
                "vs",
                &["*"],
                vec![
                    Route::new(Matcher::Prefix("/a".into()), RouteAction::forward("echo")),
                    Route::new(Matcher::Prefix("/b".into()), RouteAction::forward("ghost")),
                ],
            ),
            upstream("echo"),
        ]);

        let errors = translation.report.errors_for(&key(ResourceKind::VirtualService, "vs"));
        assert_eq!(errors, &["route default_vs-route-1 references missing upstream Upstream default.ghost".to_string()]);
        let routes = &translation.graph.route_tables["listener-default_gw-routes"].virtual_hosts[0].routes;
        assert_eq!(routes.len(), 2);
        assert_eq!(
            translation.report.status_for(&key(ResourceKind::Upstream, "echo"), "o", 1).state,
            StatusState::Accepted
        );
    }

    #[test]
    fn test_delegation_concatenates_prefixes() {
        let mut table = RouteTable::new("default", "api");
        table.routes = vec![
            Route::new(Matcher::Prefix("/users".into()), RouteAction::forward("echo")),
            Route::new(Matcher::Exact("/".into()), RouteAction::forward("echo")),
        ];
        let translation = translate(vec![
            Gateway::new("default", "gw", 8080).into(),
            vs("vs", &["*"], vec![Route::new(Matcher::Prefix("/api".into()), RouteAction::delegate("api"))]),
            table.into(),
            upstream("echo"),
        ]);

        assert!(!translation.report.has_errors());
        let routes = &translation.graph.route_tables["listener-default_gw-routes"].virtual_hosts[0].routes;
        assert_eq!(routes[0].matcher, Matcher::Prefix("/api/users".into()));
        assert_eq!(routes[1].matcher, Matcher::Exact("/api".into()));
        assert_eq!(routes[0].origin, Some(key(ResourceKind::RouteTable, "api")));
    }

    #[test]
    fn test_delegation_cycle_reported_and_dropped() {
        let mut a = RouteTable::new("default", "a");
        a.routes = vec![Route::new(Matcher::Prefix("/b".into()), RouteAction::delegate("b"))];
        let mut b = RouteTable::new("default", "b");
        b.routes = vec![
            Route::new(Matcher::Prefix("/a".into()), RouteAction::delegate("a")),
            Route::new(Matcher::Prefix("/ok".into()), RouteAction::forward("echo")),
        ];
        let translation = translate(vec![
            vs("vs", &["*"], vec![Route::new(Matcher::Prefix("/".into()), RouteAction::delegate("a"))]),
            a.into(),
            b.into(),
            upstream("echo"),
        ]);

        let errors = translation.report.errors_for(&key(ResourceKind::RouteTable, "b"));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("delegation cycle"));
        assert!(!translation.report.has_errors_for(&key(ResourceKind::VirtualService, "vs")));
    }

    #[test]
    fn test_missing_route_table_and_bad_regex() {
        let translation = translate(vec![vs(
            "vs",
            &["*"],
            vec![
                Route::new(Matcher::Prefix("/x".into()), RouteAction::delegate("nope")),
                Route::new(Matcher::Regex("([".into()), RouteAction::forward("echo")),
                Route::new(Matcher::Prefix("/".into()), RouteAction::forward("echo")),
            ],
        ), upstream("echo")]);

        let errors = translation.report.errors_for(&key(ResourceKind::VirtualService, "vs"));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_zero_weight_destinations_rejected() {
        let action = RouteAction::WeightedForward {
            destinations: vec![WeightedDestination { upstream: ObjectRef::new("echo"), weight: 0 }],
        };
        let translation = translate(vec![
            Gateway::new("default", "gw", 8080).into(),
            vs("vs", &["*"], vec![Route::new(Matcher::Prefix("/".into()), action)]),
            upstream("echo"),
        ]);

        assert!(translation.report.has_errors_for(&key(ResourceKind::VirtualService, "vs")));
        let routes = &translation.graph.route_tables["listener-default_gw-routes"].virtual_hosts[0].routes;
        assert!(routes.is_empty());
    }

    #[test]
    fn test_duplicate_bind_address_drops_later_gateway() {
        let translation = translate(vec![
            Gateway::new("default", "a", 8080).into(),
            Gateway::new("default", "b", 8080).into(),
        ]);

        assert!(!translation.report.has_errors_for(&key(ResourceKind::Gateway, "a")));
        assert!(translation.report.has_errors_for(&key(ResourceKind::Gateway, "b")));
        assert!(translation.graph.listeners.contains_key("default_a"));
        assert!(!translation.graph.listeners.contains_key("default_b"));
    }

    #[test]
    fn test_same_port_in_different_namespaces_is_not_a_conflict() {
        let translation = translate(vec![
            Gateway::new("team-a", "gw", 8080).into(),
            Gateway::new("team-b", "gw", 8080).into(),
        ]);

        let team_b = ResourceRef::new(ResourceKind::Gateway, "team-b", "gw");
        assert!(!translation.report.has_errors_for(&team_b));
        let listeners: Vec<&str> = translation.graph.listeners.keys().map(String::as_str).collect();
        assert_eq!(listeners, vec!["team-a_gw", "team-b_gw"]);
    }

    #[test]
    fn test_domain_conflict_errors_both_and_drops_later() {
        let translation = translate(vec![
            Gateway::new("default", "gw", 8080).into(),
            vs("one", &["example.com"], vec![Route::new(Matcher::Prefix("/".into()), RouteAction::forward("echo"))]),
            vs("two", &["example.com"], vec![Route::new(Matcher::Prefix("/".into()), RouteAction::forward("echo"))]),
            upstream("echo"),
        ]);

        assert!(translation.report.has_errors_for(&key(ResourceKind::VirtualService, "one")));
        assert!(translation.report.has_errors_for(&key(ResourceKind::VirtualService, "two")));
        let hosts = &translation.graph.route_tables["listener-default_gw-routes"].virtual_hosts;
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].name, "default_one");
    }

    #[test]
    fn test_ssl_gateway_requires_secret() {
        let mut gateway = Gateway::new("default", "gw", 8443);
        gateway.ssl = true;
        let translation = translate(vec![
            gateway.into(),
            vs("vs", &["example.com"], vec![Route::new(Matcher::Prefix("/".into()), RouteAction::forward("echo"))]),
            upstream("echo"),
        ]);

        assert!(translation.report.has_errors_for(&key(ResourceKind::VirtualService, "vs")));
        assert!(translation.graph.listeners.is_empty());
    }

    #[test]
    fn test_static_upstream_structural_errors() {
        let translation = translate(vec![
            Upstream::with_hosts("default", "empty", vec![]).into(),
            Upstream::with_hosts("default", "zero", vec![Host::new("10.0.0.1", 0)]).into(),
        ]);

        assert!(translation.report.has_errors_for(&key(ResourceKind::Upstream, "empty")));
        assert!(translation.report.has_errors_for(&key(ResourceKind::Upstream, "zero")));
        // Clusters stay so the upstream-removing pass can account for them
        assert_eq!(translation.graph.clusters.len(), 2);
    }

    #[test]
    fn test_translation_is_deterministic() {
        let resources = vec![
            Gateway::new("default", "gw", 8080).into(),
            vs("b", &["b.example.com"], vec![Route::new(Matcher::Prefix("/".into()), RouteAction::forward("echo"))]),
            vs("a", &["a.example.com"], vec![Route::new(Matcher::Prefix("/".into()), RouteAction::forward("ghost"))]),
            upstream("echo"),
        ];
        let mut reversed = resources.clone();
        reversed.reverse();

        assert_eq!(translate(resources), translate(reversed));
    }
}
