use super::extension::ExtensionSet;
use crate::domain::ApiSnapshot;
use crate::errors::Result;
use crate::sanitize::{InvalidConfigPolicy, ReferenceIntegritySanitizer, Sanitizer, SanitizerPipeline};
use crate::translation::{Translation, Translator};
use std::sync::Arc;

/// Translate, sanitize, extend, re-check. Shared by the synchronizer and the
/// validator so a dry run sees exactly what a live cycle would publish.
#[derive(Clone)]
pub struct ConfigPipeline {
    translator: Arc<dyn Translator>,
    sanitizers: Arc<SanitizerPipeline>,
    integrity: ReferenceIntegritySanitizer,
    extensions: ExtensionSet,
}

impl std::fmt::Debug for ConfigPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigPipeline")
            .field("sanitizers", &self.sanitizers)
            .field("extensions", &self.extensions)
            .finish()
    }
}

impl ConfigPipeline {
    pub fn new(
        translator: Arc<dyn Translator>,
        policy: &InvalidConfigPolicy,
        extensions: ExtensionSet,
    ) -> Self {
        Self {
            translator,
            sanitizers: Arc::new(SanitizerPipeline::standard(policy)),
            integrity: ReferenceIntegritySanitizer::new(policy.remove_orphaned_clusters),
            extensions,
        }
    }

    pub fn extensions(&self) -> &ExtensionSet {
        &self.extensions
    }

    /// Translate and sanitize, without extensions
    pub fn translate(&self, snapshot: &ApiSnapshot) -> Result<Translation> {
        let Translation { graph, report } = self.translator.translate(snapshot)?;
        let (graph, report) = self.sanitizers.run(graph, report);
        Ok(Translation { graph, report })
    }

    /// Run the extension set over a sanitized translation, then re-check integrity
    pub fn extend(&self, snapshot: &ApiSnapshot, translation: Translation) -> Result<Translation> {
        if self.extensions.is_empty() {
            return Ok(translation);
        }
        let Translation { mut graph, mut report } = translation;
        self.extensions.apply(snapshot, &mut graph, &mut report)?;
        let (graph, report) = self.integrity.sanitize(graph, report);
        Ok(Translation { graph, report })
    }

    pub fn process(&self, snapshot: &ApiSnapshot) -> Result<Translation> {
        let translation = self.translate(snapshot)?;
        self.extend(snapshot, translation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DiagnosticReport, Gateway, Host, Matcher, Route, RouteAction, Upstream, VirtualService};
    use crate::syncer::extension::SyncerExtension;
    use crate::translation::{DefaultTranslator, Fragment, ListenerFragment, ProxyGraph};

    /// Adds a listener pointing at a route table that does not exist
    struct DanglingListener;

    impl SyncerExtension for DanglingListener {
        fn name(&self) -> &str {
            "dangling-listener"
        }

        fn extend(
            &self,
            _snapshot: &ApiSnapshot,
            graph: &mut ProxyGraph,
            _report: &mut DiagnosticReport,
        ) -> Result<()> {
            graph.insert(Fragment::Listener(ListenerFragment {
                name: "extra".into(),
                address: "::".into(),
                port: 9000,
                proxy_names: vec!["gateway-proxy".into()],
                route_table: "nowhere".into(),
                tls: vec![],
                origin: None,
            }));
            Ok(())
        }
    }

    fn snapshot() -> ApiSnapshot {
        let mut vs = VirtualService::new("default", "vs");
        vs.routes = vec![Route::new(Matcher::Prefix("/".into()), RouteAction::forward("echo"))];
        ApiSnapshot::from_resources(vec![
            Gateway::new("default", "gw", 8080).into(),
            vs.into(),
            Upstream::with_hosts("default", "echo", vec![Host::new("10.0.0.1", 80)]).into(),
        ])
    }

    #[test]
    fn test_extension_output_is_checked_for_integrity() {
        let extension: Arc<dyn SyncerExtension> = Arc::new(DanglingListener);
        let pipeline = ConfigPipeline::new(
            Arc::new(DefaultTranslator::new()),
            &InvalidConfigPolicy::default(),
            ExtensionSet::assemble(vec![extension]),
        );

        let translation = pipeline.process(&snapshot()).expect("process");
        assert!(!translation.graph.listeners.contains_key("extra"));
        assert!(translation.graph.dangling_references().is_empty());
        assert_eq!(translation.graph.listeners.len(), 1);
    }

    #[test]
    fn test_without_extensions_process_equals_translate() {
        let pipeline = ConfigPipeline::new(
            Arc::new(DefaultTranslator::new()),
            &InvalidConfigPolicy::default(),
            ExtensionSet::empty(),
        );
        let snapshot = snapshot();
        assert_eq!(pipeline.process(&snapshot).expect("process"), pipeline.translate(&snapshot).expect("translate"));
    }
}
