//! # Synchronizer
//!
//! The event loop that turns declarative resources into published proxy
//! configuration. A cycle reads the full resource snapshot, runs it through
//! the [`ConfigPipeline`], publishes one graph per consumer key and writes
//! status back to the store. Change notifications arriving within the
//! coalescing window are folded into a single cycle.
//!
//! A failed translation never publishes: whatever was last published stays
//! in the cache until a later cycle succeeds.

pub mod extension;
pub mod pipeline;
pub mod reporter;

pub use extension::{ExtensionSet, SyncerExtension};
pub use pipeline::ConfigPipeline;
pub use reporter::{ReportSummary, StatusReporter};

use crate::config::SyncConfig;
use crate::domain::{ApiSnapshot, Matcher, ResourceKind};
use crate::errors::Result;
use crate::observability::MetricsRecorder;
use crate::store::{ChangeBatch, ResourceStore};
use crate::sync_span;
use crate::translation::{
    Fragment, ListenerFragment, ProxyGraph, RouteFragment, RouteFragmentAction,
    RouteTableFragment, Translation, VirtualHostFragment,
};
use crate::validation::Validator;
use crate::xds::{ConsumerKey, SnapshotCache};
use futures::stream::BoxStream;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

pub const FALLBACK_LISTENER_NAME: &str = "fallback-listener";
pub const FALLBACK_ROUTE_TABLE_NAME: &str = "fallback-routes";
pub const FALLBACK_LISTENER_PORT: u16 = 8080;
pub const FALLBACK_RESPONSE_BODY: &str = "proxy node has an unknown role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncState {
    Idle,
    Translating,
    Publishing,
    Reporting,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How a single cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Graphs were written; `changed` counts keys whose version moved
    Published { changed: usize },
    TranslationFailed,
    ExtensionFailed,
    /// Store read failed with an error retrying cannot fix
    Aborted,
}

impl CycleOutcome {
    fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Published { .. } => "published",
            CycleOutcome::TranslationFailed => "translation_failed",
            CycleOutcome::ExtensionFailed => "extension_failed",
            CycleOutcome::Aborted => "aborted",
        }
    }
}

pub struct Synchronizer {
    store: Arc<dyn ResourceStore>,
    cache: Arc<SnapshotCache>,
    pipeline: ConfigPipeline,
    reporter: StatusReporter,
    validator: Option<Arc<Validator>>,
    config: SyncConfig,
    namespaces: Vec<String>,
    state: watch::Sender<SyncState>,
    ready: watch::Sender<bool>,
    published_keys: BTreeSet<ConsumerKey>,
    metrics: MetricsRecorder,
}

impl fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronizer")
            .field("namespaces", &self.namespaces)
            .field("state", &*self.state.borrow())
            .field("published_keys", &self.published_keys)
            .finish()
    }
}

impl Synchronizer {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        cache: Arc<SnapshotCache>,
        pipeline: ConfigPipeline,
        config: &SyncConfig,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        let (ready, _) = watch::channel(false);
        Self {
            reporter: StatusReporter::new(store.clone(), config.status_owner.clone()),
            store,
            cache,
            pipeline,
            validator: None,
            namespaces: config.namespaces(),
            config: config.clone(),
            state,
            ready,
            published_keys: BTreeSet::new(),
            metrics: MetricsRecorder::new(),
        }
    }

    /// Hand every processed snapshot to `validator`
    pub fn with_validator(mut self, validator: Arc<Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Flips to `true` after the first successful publish
    pub fn readiness(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    fn set_state(&self, state: SyncState) {
        self.state.send_replace(state);
    }

    /// Run cycles until `cancel` fires. The first cycle starts immediately.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!(namespaces = ?self.namespaces, "synchronizer starting");
        let Some(mut changes) = self.watch_with_retry(&cancel).await else {
            return Ok(());
        };

        if self.sync_with_retry(&cancel).await.is_none() {
            return Ok(());
        }

        loop {
            let batch = tokio::select! {
                _ = cancel.cancelled() => break,
                batch = changes.next() => batch,
            };

            match batch {
                Some(batch) => {
                    debug!(revision = batch.revision, changes = batch.changes.len(), "change notification");
                    if !self.coalesce(&mut changes, &cancel).await {
                        break;
                    }
                }
                None => {
                    warn!("store watch closed, re-establishing");
                    match self.watch_with_retry(&cancel).await {
                        Some(watch) => changes = watch,
                        None => break,
                    }
                }
            }

            if self.sync_with_retry(&cancel).await.is_none() {
                break;
            }
        }

        self.set_state(SyncState::Idle);
        info!("synchronizer stopped");
        Ok(())
    }

    /// Absorb notifications for one window; `false` when cancelled
    async fn coalesce(
        &self,
        changes: &mut BoxStream<'static, ChangeBatch>,
        cancel: &CancellationToken,
    ) -> bool {
        let window = tokio::time::sleep(self.config.coalesce_window());
        tokio::pin!(window);
        let mut merged = 0usize;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = &mut window => break,
                batch = changes.next() => match batch {
                    Some(_) => merged += 1,
                    None => break,
                },
            }
        }

        if merged > 0 {
            debug!(merged, "coalesced change notifications");
        }
        true
    }

    async fn watch_with_retry(
        &self,
        cancel: &CancellationToken,
    ) -> Option<BoxStream<'static, ChangeBatch>> {
        let mut delay = self.config.retry_initial();
        loop {
            match self.store.watch(&ResourceKind::ALL, &self.namespaces).await {
                Ok(stream) => return Some(stream),
                Err(e) => {
                    warn!(error = %e, retry_in_ms = delay.as_millis() as u64, "failed to watch store");
                    if !self.backoff(&mut delay, cancel).await {
                        return None;
                    }
                }
            }
        }
    }

    /// `None` when cancelled while backing off
    async fn sync_with_retry(&mut self, cancel: &CancellationToken) -> Option<CycleOutcome> {
        let mut delay = self.config.retry_initial();
        loop {
            match self.sync_once().await {
                Ok(outcome) => return Some(outcome),
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, retry_in_ms = delay.as_millis() as u64, "store read failed, retrying");
                    if !self.backoff(&mut delay, cancel).await {
                        return None;
                    }
                }
                Err(e) => {
                    error!(error = %e, "sync cycle aborted");
                    return Some(CycleOutcome::Aborted);
                }
            }
        }
    }

    async fn backoff(&self, delay: &mut Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(*delay) => {}
        }
        *delay = (*delay * 2).min(self.config.retry_max());
        true
    }

    /// One full cycle. `Err` only for store reads; everything after that is
    /// reported through the outcome.
    pub async fn sync_once(&mut self) -> Result<CycleOutcome> {
        let span = sync_span!("cycle");
        self.cycle().instrument(span).await
    }

    async fn cycle(&mut self) -> Result<CycleOutcome> {
        let started = Instant::now();
        self.set_state(SyncState::Translating);

        let snapshot = match self.store.snapshot(&self.namespaces).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.set_state(SyncState::Idle);
                return Err(e);
            }
        };
        debug!(resources = snapshot.len(), "read resource snapshot");

        let outcome = match self.pipeline.translate(&snapshot) {
            Err(e) => {
                error!(error = %e, "translation failed, keeping last published configuration");
                CycleOutcome::TranslationFailed
            }
            Ok(sanitized) => {
                let sanitized_report = sanitized.report.clone();
                match self.pipeline.extend(&snapshot, sanitized) {
                    Ok(translation) => {
                        self.observe(&snapshot, &translation);
                        self.set_state(SyncState::Publishing);
                        let changed = self.publish(&translation.graph);
                        self.set_state(SyncState::Reporting);
                        self.report(&translation.report, &snapshot).await;
                        self.ready.send_if_modified(|ready| !std::mem::replace(ready, true));
                        CycleOutcome::Published { changed }
                    }
                    Err(e) => {
                        error!(error = %e, "extension failed, keeping last published configuration");
                        self.observe(&snapshot, &Translation {
                            graph: ProxyGraph::new(),
                            report: sanitized_report.clone(),
                        });
                        self.set_state(SyncState::Reporting);
                        self.report(&sanitized_report, &snapshot).await;
                        CycleOutcome::ExtensionFailed
                    }
                }
            }
        };

        self.set_state(SyncState::Idle);
        self.metrics.record_sync_cycle(outcome.label(), started.elapsed().as_secs_f64());
        Ok(outcome)
    }

    fn observe(&self, snapshot: &ApiSnapshot, translation: &Translation) {
        if let Some(validator) = &self.validator {
            validator.observe(snapshot.clone(), translation.report.clone());
        }
    }

    async fn report(&self, report: &crate::domain::DiagnosticReport, snapshot: &ApiSnapshot) {
        let summary = self.reporter.report(report, snapshot).await;
        debug!(
            written = summary.written,
            unchanged = summary.unchanged,
            failed = summary.failed,
            "reported status"
        );
    }

    /// Write one graph per consumer key plus the fallback; returns how many
    /// versions moved
    fn publish(&mut self, graph: &ProxyGraph) -> usize {
        let graphs = consumer_graphs(graph, &self.config.write_namespace);
        let mut changed = 0;

        for (key, subset) in &graphs {
            if self.cache.set_snapshot(key, subset.clone()).is_some() {
                changed += 1;
            }
        }

        let current: BTreeSet<ConsumerKey> = graphs.into_keys().collect();
        for vanished in self.published_keys.difference(&current) {
            info!(key = %vanished, "consumer key no longer has configuration, publishing empty graph");
            if self.cache.set_snapshot(vanished, ProxyGraph::new()).is_some() {
                changed += 1;
            }
        }
        self.published_keys = current;

        if self.cache.set_snapshot(&self.cache.fallback_key(), fallback_graph()).is_some() {
            changed += 1;
        }

        changed
    }
}

fn listener_namespace<'a>(listener: &'a ListenerFragment, default: &'a str) -> &'a str {
    listener.origin.as_ref().map(|origin| origin.namespace.as_str()).unwrap_or(default)
}

/// Split the full graph by `namespace~proxy`
pub fn consumer_graphs(graph: &ProxyGraph, default_namespace: &str) -> BTreeMap<ConsumerKey, ProxyGraph> {
    let mut keys = BTreeSet::new();
    for listener in graph.listeners.values() {
        let namespace = listener_namespace(listener, default_namespace);
        for proxy in &listener.proxy_names {
            keys.insert(ConsumerKey::new(namespace, proxy));
        }
    }

    keys.into_iter()
        .map(|key| {
            let namespace = key.namespace().unwrap_or_default().to_string();
            let proxy = key.proxy().unwrap_or_default().to_string();
            let subset = graph.subset_matching(|listener| {
                listener_namespace(listener, default_namespace) == namespace
                    && listener.proxy_names.iter().any(|p| *p == proxy)
            });
            (key, subset)
        })
        .collect()
}

/// Served to nodes without a usable role: every request gets a 500
pub fn fallback_graph() -> ProxyGraph {
    let mut graph = ProxyGraph::new();
    graph.insert(Fragment::Listener(ListenerFragment {
        name: FALLBACK_LISTENER_NAME.to_string(),
        address: "::".to_string(),
        port: FALLBACK_LISTENER_PORT,
        proxy_names: Vec::new(),
        route_table: FALLBACK_ROUTE_TABLE_NAME.to_string(),
        tls: Vec::new(),
        origin: None,
    }));
    graph.insert(Fragment::RouteTable(RouteTableFragment {
        name: FALLBACK_ROUTE_TABLE_NAME.to_string(),
        virtual_hosts: vec![VirtualHostFragment {
            name: "fallback".to_string(),
            domains: vec!["*".to_string()],
            routes: vec![RouteFragment {
                name: "fallback".to_string(),
                matcher: Matcher::Prefix("/".to_string()),
                action: RouteFragmentAction::DirectResponse {
                    status: 500,
                    body: FALLBACK_RESPONSE_BODY.to_string(),
                },
                origin: None,
            }],
            origin: None,
        }],
    }));
    graph
}
