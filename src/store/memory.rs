use super::{namespace_selected, ChangeBatch, ChangeType, ResourceChange, ResourceStore};
use crate::domain::{ApiSnapshot, Resource, ResourceKind, ResourceRef, ResourceStatus};
use crate::errors::{FlowsyncError, Result};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, warn};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
struct StoreState {
    revision: u64,
    resources: BTreeMap<ResourceRef, Resource>,
}

/// Process-local store. Spec writes bump the store revision and notify
/// watchers; status writes do neither.
#[derive(Clone)]
pub struct InMemoryResourceStore {
    state: Arc<RwLock<StoreState>>,
    changes: broadcast::Sender<ChangeBatch>,
}

impl Default for InMemoryResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryResourceStore").field("revision", &self.revision()).finish()
    }
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { state: Arc::new(RwLock::new(StoreState::default())), changes }
    }

    pub fn from_resources<I>(resources: I) -> Result<Self>
    where
        I: IntoIterator<Item = Resource>,
    {
        let store = Self::new();
        store.apply(resources.into_iter().collect(), Vec::new())?;
        Ok(store)
    }

    /// Seed from a YAML list of resources
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let resources: Vec<Resource> = serde_yaml::from_str(yaml)?;
        Self::from_resources(resources)
    }

    pub async fn from_yaml_file(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| FlowsyncError::Io {
            source: e,
            context: format!("Failed to read resources from {}", path.display()),
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Insert or replace one resource, returning its new resource version
    pub fn upsert(&self, resource: Resource) -> Result<u64> {
        let key = resource.resource_ref();
        self.apply(vec![resource], Vec::new())?;
        self.get(&key)
            .map(|r| r.metadata().resource_version)
            .ok_or_else(|| FlowsyncError::internal(format!("{} vanished after write", key)))
    }

    /// Write several resources as one change batch
    pub fn upsert_all(&self, resources: Vec<Resource>) -> Result<u64> {
        self.apply(resources, Vec::new())
    }

    /// Remove one resource; returns whether it existed
    pub fn delete(&self, key: &ResourceRef) -> Result<bool> {
        let existed = self.get(key).is_some();
        if existed {
            self.apply(Vec::new(), vec![key.clone()])?;
        }
        Ok(existed)
    }

    pub fn get(&self, key: &ResourceRef) -> Option<Resource> {
        self.read_state().ok().and_then(|state| state.resources.get(key).cloned())
    }

    pub fn status(&self, key: &ResourceRef, owner: &str) -> Option<ResourceStatus> {
        self.get(key).and_then(|r| r.metadata().statuses.get(owner).cloned())
    }

    pub fn revision(&self) -> u64 {
        self.read_state().map(|state| state.revision).unwrap_or_default()
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, StoreState>> {
        self.state.read().map_err(|_| FlowsyncError::store("resource store lock poisoned"))
    }

    fn apply(&self, upserts: Vec<Resource>, deletes: Vec<ResourceRef>) -> Result<u64> {
        let batch = {
            let mut state =
                self.state.write().map_err(|_| FlowsyncError::store("resource store lock poisoned"))?;
            state.revision += 1;
            let revision = state.revision;
            let mut changes = Vec::new();

            for mut resource in upserts {
                let key = resource.resource_ref();
                let metadata = resource.metadata_mut();
                metadata.resource_version = revision;
                if let Some(existing) = state.resources.get(&key) {
                    if metadata.statuses.is_empty() {
                        metadata.statuses = existing.metadata().statuses.clone();
                    }
                }
                state.resources.insert(key.clone(), resource);
                changes.push(ResourceChange { resource: key, change: ChangeType::Upserted });
            }

            for key in deletes {
                if state.resources.remove(&key).is_some() {
                    changes.push(ResourceChange { resource: key, change: ChangeType::Deleted });
                }
            }

            ChangeBatch { revision, changes }
        };

        let revision = batch.revision;
        if !batch.changes.is_empty() {
            debug!(revision, changes = batch.changes.len(), "resource store committed batch");
            // No receivers is fine: nobody is watching yet
            let _ = self.changes.send(batch);
        }
        Ok(revision)
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn watch(
        &self,
        kinds: &[ResourceKind],
        namespaces: &[String],
    ) -> Result<BoxStream<'static, ChangeBatch>> {
        let kinds = kinds.to_vec();
        let namespaces = namespaces.to_vec();
        let state = Arc::clone(&self.state);

        let stream = BroadcastStream::new(self.changes.subscribe()).filter_map(move |item| {
            let batch = match item {
                Ok(batch) => {
                    let changes: Vec<ResourceChange> = batch
                        .changes
                        .into_iter()
                        .filter(|c| {
                            kinds.contains(&c.resource.kind)
                                && namespace_selected(&namespaces, &c.resource.namespace)
                        })
                        .collect();
                    if changes.is_empty() {
                        None
                    } else {
                        Some(ChangeBatch { revision: batch.revision, changes })
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "resource watcher lagged; requesting full resync");
                    let revision = state.read().map(|s| s.revision).unwrap_or_default();
                    Some(ChangeBatch::resync(revision))
                }
            };
            futures::future::ready(batch)
        });

        Ok(stream.boxed())
    }

    async fn list(&self, kind: ResourceKind, namespaces: &[String]) -> Result<Vec<Resource>> {
        let state = self.read_state()?;
        Ok(state
            .resources
            .iter()
            .filter(|(key, _)| key.kind == kind && namespace_selected(namespaces, &key.namespace))
            .map(|(_, resource)| resource.clone())
            .collect())
    }

    /// All collections under one read guard, so the snapshot reflects a single revision
    async fn snapshot(&self, namespaces: &[String]) -> Result<ApiSnapshot> {
        let state = self.read_state()?;
        Ok(ApiSnapshot::from_resources(
            state
                .resources
                .iter()
                .filter(|(key, _)| namespace_selected(namespaces, &key.namespace))
                .map(|(_, resource)| resource.clone()),
        ))
    }

    async fn write_status(
        &self,
        resource: &ResourceRef,
        owner: &str,
        status: ResourceStatus,
    ) -> Result<()> {
        let mut state =
            self.state.write().map_err(|_| FlowsyncError::store("resource store lock poisoned"))?;
        let stored = state
            .resources
            .get_mut(resource)
            .ok_or_else(|| FlowsyncError::not_found(resource.to_string()))?;
        stored.metadata_mut().statuses.insert(owner.to_string(), status);
        Ok(())
    }
}
