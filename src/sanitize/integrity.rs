use super::Sanitizer;
use crate::domain::DiagnosticReport;
use crate::translation::ProxyGraph;
use tracing::{debug, warn};

/// Last line of defence: removes every fragment that still points at
/// something absent, then virtual hosts left without routes. Optionally drops
/// clusters nothing routes to.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceIntegritySanitizer {
    remove_orphaned_clusters: bool,
}

impl ReferenceIntegritySanitizer {
    pub fn new(remove_orphaned_clusters: bool) -> Self {
        Self { remove_orphaned_clusters }
    }
}

impl Sanitizer for ReferenceIntegritySanitizer {
    fn name(&self) -> &'static str {
        "reference_integrity"
    }

    fn sanitize(
        &self,
        mut graph: ProxyGraph,
        mut report: DiagnosticReport,
    ) -> (ProxyGraph, DiagnosticReport) {
        let clusters = std::mem::take(&mut graph.clusters);

        for table in graph.route_tables.values_mut() {
            for host in table.virtual_hosts.iter_mut() {
                host.routes.retain(|route| {
                    let intact = route.action.clusters().iter().all(|c| clusters.contains_key(*c));
                    if !intact {
                        match &route.origin {
                            Some(origin) => report.add_error(
                                origin,
                                format!("route {} was removed: it references an absent cluster", route.name),
                            ),
                            None => warn!(route = %route.name, "removed route referencing absent cluster"),
                        }
                    }
                    intact
                });
            }

            table.virtual_hosts.retain(|host| {
                if host.routes.is_empty() {
                    if let Some(origin) = &host.origin {
                        report.add_warning(
                            origin,
                            format!("virtual host {} has no routes and was not published", host.name),
                        );
                    }
                    debug!(virtual_host = %host.name, "removed empty virtual host");
                }
                !host.routes.is_empty()
            });
        }
        graph.clusters = clusters;

        let route_tables = &graph.route_tables;
        graph.listeners.retain(|name, listener| {
            let intact = route_tables.contains_key(&listener.route_table);
            if !intact {
                match &listener.origin {
                    Some(origin) => report.add_error(
                        origin,
                        format!("listener {} was removed: route table {} is absent", name, listener.route_table),
                    ),
                    None => warn!(listener = %name, "removed listener referencing absent route table"),
                }
            }
            intact
        });

        let clusters = &graph.clusters;
        graph.endpoints.retain(|name, _| {
            let intact = clusters.contains_key(name);
            if !intact {
                debug!(cluster = %name, "removed endpoint set without cluster");
            }
            intact
        });

        if self.remove_orphaned_clusters {
            let referenced = graph.referenced_clusters();
            let orphans: Vec<String> =
                graph.clusters.keys().filter(|c| !referenced.contains(*c)).cloned().collect();
            for cluster in orphans {
                graph.clusters.remove(&cluster);
                graph.endpoints.remove(&cluster);
                debug!(cluster = %cluster, "removed orphaned cluster");
            }
        }

        (graph, report)
    }
}
