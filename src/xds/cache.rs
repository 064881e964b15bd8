//! # Snapshot Cache
//!
//! Versioned proxy configuration per consumer key. Every key has its own
//! monotonic version counter and a watch channel carrying the latest version,
//! so each xDS stream wakes only for its own key. Publishing a graph
//! deep-equal to the current one is a no-op.

use super::node::ConsumerKey;
use crate::observability::MetricsRecorder;
use crate::translation::ProxyGraph;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info};

/// Immutable configuration published for one consumer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub key: ConsumerKey,
    pub version: u64,
    pub graph: Arc<ProxyGraph>,
}

struct Entry {
    snapshot: Option<Snapshot>,
    notify: watch::Sender<u64>,
}

impl Entry {
    fn empty() -> Self {
        let (notify, _) = watch::channel(0);
        Self { snapshot: None, notify }
    }

    fn version(&self) -> u64 {
        self.snapshot.as_ref().map(|s| s.version).unwrap_or(0)
    }
}

pub struct SnapshotCache {
    entries: Mutex<HashMap<ConsumerKey, Entry>>,
    metrics: MetricsRecorder,
}

impl std::fmt::Debug for SnapshotCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCache").field("keys", &self.keys()).finish()
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()), metrics: MetricsRecorder::new() }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConsumerKey, Entry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Publish `graph` for `key`. Returns the new version, or `None` when the
    /// graph equals what is already published.
    pub fn set_snapshot(&self, key: &ConsumerKey, graph: ProxyGraph) -> Option<u64> {
        let graph = Arc::new(graph);
        loop {
            // Compare outside the lock, then swap only if nothing moved meanwhile
            let (observed_version, current) = {
                let entries = self.lock();
                match entries.get(key) {
                    Some(entry) => (entry.version(), entry.snapshot.as_ref().map(|s| s.graph.clone())),
                    None => (0, None),
                }
            };

            if current.as_deref() == Some(graph.as_ref()) {
                debug!(key = %key, version = observed_version, "snapshot unchanged, skipping publish");
                self.metrics.record_snapshot_noop();
                return None;
            }

            let mut entries = self.lock();
            let entry = entries.entry(key.clone()).or_insert_with(Entry::empty);
            if entry.version() != observed_version {
                continue;
            }

            let version = observed_version + 1;
            entry.snapshot = Some(Snapshot { key: key.clone(), version, graph: graph.clone() });
            entry.notify.send_replace(version);
            drop(entries);

            info!(key = %key, version, fragments = graph.fragment_count(), "published snapshot");
            self.metrics.record_snapshot_published(key.as_str());
            return Some(version);
        }
    }

    pub fn get_snapshot(&self, key: &ConsumerKey) -> Option<Snapshot> {
        self.lock().get(key).and_then(|entry| entry.snapshot.clone())
    }

    /// Version notifications for `key`; usable before anything is published
    pub fn subscribe(&self, key: &ConsumerKey) -> watch::Receiver<u64> {
        self.lock().entry(key.clone()).or_insert_with(Entry::empty).notify.subscribe()
    }

    pub fn version(&self, key: &ConsumerKey) -> u64 {
        self.lock().get(key).map(Entry::version).unwrap_or(0)
    }

    /// Keys that have a published snapshot, sorted
    pub fn keys(&self) -> Vec<ConsumerKey> {
        let mut keys: Vec<ConsumerKey> = self
            .lock()
            .iter()
            .filter(|(_, entry)| entry.snapshot.is_some())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn snapshots(&self) -> Vec<Snapshot> {
        let mut snapshots: Vec<Snapshot> =
            self.lock().values().filter_map(|entry| entry.snapshot.clone()).collect();
        snapshots.sort_by(|a, b| a.key.cmp(&b.key));
        snapshots
    }

    pub fn fallback_key(&self) -> ConsumerKey {
        ConsumerKey::fallback()
    }
}
