use super::Sanitizer;
use crate::domain::DiagnosticReport;
use crate::translation::ProxyGraph;
use tracing::debug;

/// Removes clusters (and their endpoint sets) whose source upstream reported errors
#[derive(Debug, Clone, Copy, Default)]
pub struct UpstreamRemovingSanitizer;

impl Sanitizer for UpstreamRemovingSanitizer {
    fn name(&self) -> &'static str {
        "upstream_removing"
    }

    fn sanitize(
        &self,
        mut graph: ProxyGraph,
        mut report: DiagnosticReport,
    ) -> (ProxyGraph, DiagnosticReport) {
        let doomed: Vec<(String, crate::domain::ResourceRef)> = graph
            .clusters
            .values()
            .filter_map(|cluster| {
                let origin = cluster.origin.as_ref()?;
                report.has_errors_for(origin).then(|| (cluster.name.clone(), origin.clone()))
            })
            .collect();

        for (cluster, origin) in doomed {
            graph.clusters.remove(&cluster);
            graph.endpoints.remove(&cluster);
            report.add_warning(
                &origin,
                format!("cluster {} was removed from published configuration", cluster),
            );
            debug!(cluster = %cluster, upstream = %origin, "removed cluster of invalid upstream");
        }

        (graph, report)
    }
}
