//! # Syncer Extensions
//!
//! Optional contributors that run after sanitization in every cycle. The set is
//! assembled once at startup and never changes afterwards.

use crate::domain::{ApiSnapshot, DiagnosticReport};
use crate::errors::Result;
use crate::translation::ProxyGraph;
use std::sync::Arc;
use tracing::info;

pub trait SyncerExtension: Send + Sync {
    fn name(&self) -> &str;

    /// An upgrade replaces any non-upgrade extension with the same name
    fn is_upgrade(&self) -> bool {
        false
    }

    /// Add fragments and diagnostics. `Err` fails the whole cycle.
    fn extend(
        &self,
        snapshot: &ApiSnapshot,
        graph: &mut ProxyGraph,
        report: &mut DiagnosticReport,
    ) -> Result<()>;
}

/// Immutable, ordered extension list
#[derive(Clone, Default)]
pub struct ExtensionSet {
    extensions: Arc<Vec<Arc<dyn SyncerExtension>>>,
}

impl std::fmt::Debug for ExtensionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl ExtensionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Keep registration order, dropping legacy extensions that have an upgrade
    pub fn assemble(extensions: Vec<Arc<dyn SyncerExtension>>) -> Self {
        let upgraded: Vec<String> = extensions
            .iter()
            .filter(|e| e.is_upgrade())
            .map(|e| e.name().to_string())
            .collect();

        let kept: Vec<Arc<dyn SyncerExtension>> = extensions
            .into_iter()
            .filter(|e| {
                let superseded = !e.is_upgrade() && upgraded.iter().any(|u| u == e.name());
                if superseded {
                    info!(extension = e.name(), "dropping extension replaced by its upgrade");
                }
                !superseded
            })
            .collect();

        Self { extensions: Arc::new(kept) }
    }

    pub fn names(&self) -> Vec<&str> {
        self.extensions.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn apply(
        &self,
        snapshot: &ApiSnapshot,
        graph: &mut ProxyGraph,
        report: &mut DiagnosticReport,
    ) -> Result<()> {
        for extension in self.extensions.iter() {
            extension.extend(snapshot, graph, report)?;
        }
        Ok(())
    }
}
