//! # Resource Store
//!
//! Boundary to wherever configuration objects live. The engine reads full
//! collections, watches for change batches and writes status back; it never
//! writes specs. [`InMemoryResourceStore`] is the in-process implementation
//! used by the binary and the tests.

pub mod memory;

pub use memory::InMemoryResourceStore;

use crate::domain::{ApiSnapshot, Resource, ResourceKind, ResourceRef, ResourceStatus};
use crate::errors::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Upserted,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceChange {
    pub resource: ResourceRef,
    pub change: ChangeType,
}

/// Changes committed together by the store
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeBatch {
    /// Store revision after the batch
    pub revision: u64,
    pub changes: Vec<ResourceChange>,
}

impl ChangeBatch {
    /// Marker batch asking consumers to re-read everything
    pub fn resync(revision: u64) -> Self {
        Self { revision, changes: Vec::new() }
    }

    pub fn is_resync(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn touches(&self, kind: ResourceKind) -> bool {
        self.is_resync() || self.changes.iter().any(|c| c.resource.kind == kind)
    }
}

/// `namespaces` empty means every namespace
pub fn namespace_selected(namespaces: &[String], namespace: &str) -> bool {
    namespaces.is_empty() || namespaces.iter().any(|n| n == namespace)
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Stream of change batches for the given kinds and namespaces
    async fn watch(
        &self,
        kinds: &[ResourceKind],
        namespaces: &[String],
    ) -> Result<BoxStream<'static, ChangeBatch>>;

    /// Current collection of one kind, in canonical order
    async fn list(&self, kind: ResourceKind, namespaces: &[String]) -> Result<Vec<Resource>>;

    /// Every watched collection. The default lists kind by kind; stores that
    /// can read all collections under one consistent view should override it.
    async fn snapshot(&self, namespaces: &[String]) -> Result<ApiSnapshot> {
        let mut resources = Vec::new();
        for kind in ResourceKind::ALL {
            resources.extend(self.list(kind, namespaces).await?);
        }
        Ok(ApiSnapshot::from_resources(resources))
    }

    /// Write one owner's status onto a resource
    async fn write_status(
        &self,
        resource: &ResourceRef,
        owner: &str,
        status: ResourceStatus,
    ) -> Result<()>;
}
