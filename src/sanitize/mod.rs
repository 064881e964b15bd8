//! # Sanitization Pipeline
//!
//! Ordered passes that repair or drop whatever translation could not make
//! consistent. Every pass is total: it returns a usable graph for any input.
//!
//! [`SanitizerPipeline::standard`] runs, in this order:
//!
//! 1. [`UpstreamRemovingSanitizer`] drops clusters whose upstream has errors.
//! 2. [`RouteReplacingSanitizer`] replaces or drops routes whose destination is gone.
//! 3. [`ReferenceIntegritySanitizer`] removes anything still dangling.
//!
//! The route pass must see the clusters removed by the first pass, and the
//! integrity pass must run last. After the pipeline,
//! [`ProxyGraph::dangling_references`](crate::translation::ProxyGraph::dangling_references)
//! is empty.

mod integrity;
mod routes;
mod upstreams;

pub use integrity::ReferenceIntegritySanitizer;
pub use routes::RouteReplacingSanitizer;
pub use upstreams::UpstreamRemovingSanitizer;

use crate::domain::DiagnosticReport;
use crate::translation::ProxyGraph;
use serde::{Deserialize, Serialize};

/// Direct response served in place of routes whose destination is gone
pub const DEFAULT_INVALID_ROUTE_BODY: &str =
    "invalid route configuration detected and replaced with a direct response";

/// How the sanitizers treat configuration they cannot publish as written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidConfigPolicy {
    /// Replace broken routes with a direct response instead of dropping them
    pub replace_invalid_routes: bool,
    pub invalid_route_response_code: u16,
    pub invalid_route_response_body: String,
    /// Drop clusters that no route references
    pub remove_orphaned_clusters: bool,
}

impl Default for InvalidConfigPolicy {
    fn default() -> Self {
        Self {
            replace_invalid_routes: false,
            invalid_route_response_code: 500,
            invalid_route_response_body: DEFAULT_INVALID_ROUTE_BODY.to_string(),
            remove_orphaned_clusters: false,
        }
    }
}

pub trait Sanitizer: Send + Sync {
    fn name(&self) -> &'static str;

    fn sanitize(&self, graph: ProxyGraph, report: DiagnosticReport)
        -> (ProxyGraph, DiagnosticReport);
}

/// Fixed-order list of passes
pub struct SanitizerPipeline {
    passes: Vec<Box<dyn Sanitizer>>,
}

impl std::fmt::Debug for SanitizerPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.passes.iter().map(|p| p.name())).finish()
    }
}

impl SanitizerPipeline {
    pub fn standard(policy: &InvalidConfigPolicy) -> Self {
        Self {
            passes: vec![
                Box::new(UpstreamRemovingSanitizer),
                Box::new(RouteReplacingSanitizer::new(policy.clone())),
                Box::new(ReferenceIntegritySanitizer::new(policy.remove_orphaned_clusters)),
            ],
        }
    }

    pub fn with_passes(passes: Vec<Box<dyn Sanitizer>>) -> Self {
        Self { passes }
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn run(&self, graph: ProxyGraph, report: DiagnosticReport) -> (ProxyGraph, DiagnosticReport) {
        self.passes.iter().fold((graph, report), |(graph, report), pass| {
            let span = tracing::debug_span!("sanitize", pass = pass.name());
            let _guard = span.enter();
            pass.sanitize(graph, report)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ApiSnapshot, Gateway, Host, Matcher, Resource, ResourceKind, ResourceRef, Route,
        RouteAction, StatusState, Upstream, VirtualService,
    };
    use crate::translation::{DefaultTranslator, RouteFragmentAction, Translator};

    fn snapshot() -> ApiSnapshot {
        let mut vs = VirtualService::new("default", "vs");
        vs.routes = vec![
            Route::new(Matcher::Prefix("/good".into()), RouteAction::forward("echo")),
            Route::new(Matcher::Prefix("/missing".into()), RouteAction::forward("ghost")),
            Route::new(Matcher::Prefix("/broken".into()), RouteAction::forward("broken")),
        ];
        ApiSnapshot::from_resources(vec![
            Resource::from(Gateway::new("default", "gw", 8080)),
            vs.into(),
            Upstream::with_hosts("default", "echo", vec![Host::new("10.0.0.1", 80)]).into(),
            Upstream::with_hosts("default", "broken", vec![]).into(),
        ])
    }

    fn run(policy: &InvalidConfigPolicy) -> (ProxyGraph, DiagnosticReport) {
        let translation = DefaultTranslator::new().translate(&snapshot()).expect("translate");
        SanitizerPipeline::standard(policy).run(translation.graph, translation.report)
    }

    #[test]
    fn test_standard_order() {
        let pipeline = SanitizerPipeline::standard(&InvalidConfigPolicy::default());
        assert_eq!(
            pipeline.pass_names(),
            vec!["upstream_removing", "route_replacing", "reference_integrity"]
        );
    }

    #[test]
    fn test_pipeline_drops_bad_routes_by_default() {
        let (graph, report) = run(&InvalidConfigPolicy::default());

        assert!(graph.dangling_references().is_empty());
        assert!(!graph.clusters.contains_key("default_broken"));
        let routes = &graph.route_tables["listener-default_gw-routes"].virtual_hosts[0].routes;
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].action, RouteFragmentAction::Cluster("default_echo".into()));

        let vs = ResourceRef::new(ResourceKind::VirtualService, "default", "vs");
        assert_eq!(report.status_for(&vs, "o", 1).state, StatusState::Rejected);
    }

    #[test]
    fn test_pipeline_replaces_bad_routes_when_enabled() {
        let policy = InvalidConfigPolicy { replace_invalid_routes: true, ..Default::default() };
        let (graph, _) = run(&policy);

        assert!(graph.dangling_references().is_empty());
        let routes = &graph.route_tables["listener-default_gw-routes"].virtual_hosts[0].routes;
        assert_eq!(routes.len(), 3);
        assert_eq!(
            routes[1].action,
            RouteFragmentAction::DirectResponse {
                status: 500,
                body: DEFAULT_INVALID_ROUTE_BODY.to_string()
            }
        );
    }
}
