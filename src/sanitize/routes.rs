use super::{InvalidConfigPolicy, Sanitizer};
use crate::domain::DiagnosticReport;
use crate::translation::{ProxyGraph, RouteFragment, RouteFragmentAction};
use std::collections::BTreeMap;
use tracing::debug;

/// Handles routes whose destination cluster is absent from the graph: they are
/// replaced by the policy's direct response, or dropped.
#[derive(Debug, Clone)]
pub struct RouteReplacingSanitizer {
    policy: InvalidConfigPolicy,
}

impl RouteReplacingSanitizer {
    pub fn new(policy: InvalidConfigPolicy) -> Self {
        Self { policy }
    }

    fn fallback(&self) -> RouteFragmentAction {
        RouteFragmentAction::DirectResponse {
            status: self.policy.invalid_route_response_code,
            body: self.policy.invalid_route_response_body.clone(),
        }
    }

    /// `None` drops the route
    fn repair(
        &self,
        mut route: RouteFragment,
        clusters: &BTreeMap<String, crate::translation::ClusterFragment>,
        report: &mut DiagnosticReport,
    ) -> Option<RouteFragment> {
        let missing: Vec<String> = route
            .action
            .clusters()
            .into_iter()
            .filter(|c| !clusters.contains_key(*c))
            .map(str::to_string)
            .collect();
        if missing.is_empty() {
            return Some(route);
        }

        if let RouteFragmentAction::WeightedClusters(weights) = &mut route.action {
            weights.retain(|w| clusters.contains_key(&w.cluster));
            if !weights.is_empty() {
                if let Some(origin) = &route.origin {
                    report.add_warning(
                        origin,
                        format!(
                            "route {} lost unavailable destinations: {}",
                            route.name,
                            missing.join(", ")
                        ),
                    );
                }
                return Some(route);
            }
        }

        let replace = self.policy.replace_invalid_routes;
        if let Some(origin) = &route.origin {
            let outcome = if replace { "replaced with a direct response" } else { "dropped" };
            report.add_warning(
                origin,
                format!(
                    "route {} was {}: destination {} is unavailable",
                    route.name,
                    outcome,
                    missing.join(", ")
                ),
            );
        }
        debug!(route = %route.name, replace, "repairing route with unavailable destination");

        if replace {
            route.action = self.fallback();
            Some(route)
        } else {
            None
        }
    }
}

impl Sanitizer for RouteReplacingSanitizer {
    fn name(&self) -> &'static str {
        "route_replacing"
    }

    fn sanitize(
        &self,
        mut graph: ProxyGraph,
        mut report: DiagnosticReport,
    ) -> (ProxyGraph, DiagnosticReport) {
        let clusters = std::mem::take(&mut graph.clusters);

        for table in graph.route_tables.values_mut() {
            for host in table.virtual_hosts.iter_mut() {
                let routes = std::mem::take(&mut host.routes);
                host.routes = routes
                    .into_iter()
                    .filter_map(|route| self.repair(route, &clusters, &mut report))
                    .collect();
            }
        }

        graph.clusters = clusters;
        (graph, report)
    }
}
