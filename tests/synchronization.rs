//! Synchronizer behavior against the in-memory store: isolation between
//! consumers, version monotonicity, failure handling and change coalescing.

mod support;

use flowsync::config::SyncConfig;
use flowsync::domain::{ApiSnapshot, ResourceKind, ResourceRef, StatusState};
use flowsync::errors::Result;
use flowsync::syncer::{CycleOutcome, Synchronizer};
use flowsync::translation::{DefaultTranslator, Translation, Translator};
use flowsync::xds::{ConsumerKey, SnapshotCache};
use flowsync::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use support::*;
use tokio_util::sync::CancellationToken;

fn synchronizer(
    store: &flowsync::store::InMemoryResourceStore,
    cache: Arc<SnapshotCache>,
) -> Synchronizer {
    Synchronizer::new(Arc::new(store.clone()), cache, pipeline(), &SyncConfig::default())
}

/// Translator that can be switched into failing every cycle
#[derive(Default)]
struct SwitchableTranslator {
    inner: DefaultTranslator,
    failing: AtomicBool,
}

impl Translator for SwitchableTranslator {
    fn translate(&self, snapshot: &ApiSnapshot) -> Result<Translation> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::translation("translator offline"));
        }
        self.inner.translate(snapshot)
    }
}

#[tokio::test]
async fn broken_tenant_does_not_disturb_other_consumers() {
    // both tenants bind the same port on their own proxy deployments
    let mut resources = tenant("team-a", 8080);
    resources.extend(tenant("team-b", 8080));
    let store = store_with(resources);
    let cache = Arc::new(SnapshotCache::new());
    let mut sync = synchronizer(&store, cache.clone());

    sync.sync_once().await.expect("first cycle");
    assert_eq!(cache.version(&key("team-b")), 1);
    let team_a = cache.get_snapshot(&key("team-a")).expect("team-a published");
    assert_eq!(team_a.version, 1);

    // team-b now routes to an upstream that does not exist
    store
        .upsert(virtual_service(
            "team-b",
            "vs",
            "team-b.example.com",
            vec![forward("root", "/", "ghost")],
        ))
        .expect("upsert");
    sync.sync_once().await.expect("second cycle");

    let after = cache.get_snapshot(&key("team-a")).expect("team-a still published");
    assert_eq!(after, team_a);
    assert_eq!(cache.version(&key("team-b")), 2);

    let vs_b = ResourceRef::new(ResourceKind::VirtualService, "team-b", "vs");
    let vs_a = ResourceRef::new(ResourceKind::VirtualService, "team-a", "vs");
    assert_eq!(store.status(&vs_b, "flowsync").map(|s| s.state), Some(StatusState::Rejected));
    assert_eq!(store.status(&vs_a, "flowsync").map(|s| s.state), Some(StatusState::Accepted));
}

#[tokio::test]
async fn versions_only_move_when_content_changes() {
    let store = store_with(tenant("default", 8080));
    let cache = Arc::new(SnapshotCache::new());
    let mut sync = synchronizer(&store, cache.clone());
    let mut versions = cache.subscribe(&key("default"));

    sync.sync_once().await.expect("cycle");
    assert_eq!(*versions.borrow_and_update(), 1);

    // Rewriting an object with identical content bumps its resource version only
    store.upsert(upstream("default", "echo", "10.0.0.1")).expect("upsert");
    let outcome = sync.sync_once().await.expect("cycle");
    assert_eq!(outcome, CycleOutcome::Published { changed: 0 });
    assert!(!versions.has_changed().expect("sender alive"));

    store.upsert(upstream("default", "echo", "10.0.0.2")).expect("upsert");
    sync.sync_once().await.expect("cycle");
    assert_eq!(*versions.borrow_and_update(), 2);
}

#[tokio::test]
async fn failed_translation_keeps_last_published_configuration() {
    let store = store_with(tenant("default", 8080));
    let cache = Arc::new(SnapshotCache::new());
    let translator = Arc::new(SwitchableTranslator::default());
    let mut sync = Synchronizer::new(
        Arc::new(store.clone()),
        cache.clone(),
        pipeline_with(translator.clone()),
        &SyncConfig::default(),
    );

    sync.sync_once().await.expect("cycle");
    let published = cache.get_snapshot(&key("default")).expect("published");

    translator.failing.store(true, Ordering::SeqCst);
    store.upsert(upstream("default", "echo", "10.9.9.9")).expect("upsert");
    let outcome = sync.sync_once().await.expect("cycle");

    assert_eq!(outcome, CycleOutcome::TranslationFailed);
    assert_eq!(cache.get_snapshot(&key("default")), Some(published));

    translator.failing.store(false, Ordering::SeqCst);
    sync.sync_once().await.expect("cycle");
    assert_eq!(cache.version(&key("default")), 2);
}

#[tokio::test]
async fn bad_route_is_dropped_and_reported_on_its_owner() {
    let mut resources = tenant("default", 8080);
    resources.push(virtual_service(
        "default",
        "mixed",
        "mixed.example.com",
        vec![forward("healthy", "/ok", "echo"), forward("broken", "/bad", "ghost")],
    ));
    let store = store_with(resources);
    let cache = Arc::new(SnapshotCache::new());
    let mut sync = synchronizer(&store, cache.clone());

    sync.sync_once().await.expect("cycle");

    let snapshot = cache.get_snapshot(&key("default")).expect("published");
    assert_eq!(route_names(&snapshot.graph), vec!["healthy", "root"]);
    assert!(snapshot.graph.dangling_references().is_empty());

    let status = |kind, name: &str| {
        store
            .status(&ResourceRef::new(kind, "default", name), "flowsync")
            .map(|s| s.state)
    };
    assert_eq!(status(ResourceKind::VirtualService, "mixed"), Some(StatusState::Rejected));
    assert_eq!(status(ResourceKind::VirtualService, "vs"), Some(StatusState::Accepted));
    assert_eq!(status(ResourceKind::Upstream, "echo"), Some(StatusState::Accepted));
    assert_eq!(status(ResourceKind::Gateway, "gw"), Some(StatusState::Accepted));
}

#[tokio::test]
async fn rapid_edits_are_coalesced_into_one_version() {
    let store = store_with(tenant("default", 8080));
    let cache = Arc::new(SnapshotCache::new());
    let config = SyncConfig { coalesce_window_ms: 300, ..SyncConfig::default() };
    let sync = Synchronizer::new(Arc::new(store.clone()), cache.clone(), pipeline(), &config);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(sync.run(cancel.clone()));

    let target = key("default");
    assert!(eventually(Duration::from_secs(5), || cache.version(&target) == 1).await);

    store.upsert(upstream("default", "echo", "10.0.0.2")).expect("first edit");
    store.upsert(upstream("default", "echo", "10.0.0.3")).expect("second edit");

    assert!(eventually(Duration::from_secs(5), || cache.version(&target) == 2).await);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(cache.version(&target), 2);

    let snapshot = cache.get_snapshot(&target).expect("published");
    let endpoints = &snapshot.graph.endpoints["default_echo"].endpoints;
    assert_eq!(endpoints[0].address, "10.0.0.3");

    cancel.cancel();
    handle.await.expect("join").expect("clean stop");
}

#[tokio::test]
async fn misconfigured_nodes_get_the_fallback_snapshot() {
    let store = store_with(tenant("default", 8080));
    let cache = Arc::new(SnapshotCache::new());
    synchronizer(&store, cache.clone()).sync_once().await.expect("cycle");

    let fallback = cache.get_snapshot(&ConsumerKey::from_node(None)).expect("fallback");
    assert!(fallback.key.is_fallback());
    assert_eq!(route_names(&fallback.graph), vec!["fallback"]);
}
