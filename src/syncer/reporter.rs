use crate::domain::{ApiSnapshot, DiagnosticReport, ResourceRef};
use crate::observability::MetricsRecorder;
use crate::store::ResourceStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Counts from one reporting pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub written: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Writes per-object acceptance status under one owner token
#[derive(Clone)]
pub struct StatusReporter {
    store: Arc<dyn ResourceStore>,
    owner: String,
    metrics: MetricsRecorder,
}

impl std::fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReporter").field("owner", &self.owner).finish()
    }
}

impl StatusReporter {
    pub fn new(store: Arc<dyn ResourceStore>, owner: impl Into<String>) -> Self {
        Self { store, owner: owner.into(), metrics: MetricsRecorder::new() }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// One status per object in `snapshot`. Failures are logged and skipped.
    pub async fn report(&self, report: &DiagnosticReport, snapshot: &ApiSnapshot) -> ReportSummary {
        let mut summary = ReportSummary::default();

        for resource in snapshot.all_refs() {
            let generation = snapshot.resource_version(&resource).unwrap_or(0);
            let status = report.status_for(&resource, &self.owner, generation);

            if self.current(snapshot, &resource).as_ref() == Some(&status) {
                summary.unchanged += 1;
                continue;
            }

            match self.store.write_status(&resource, &self.owner, status.clone()).await {
                Ok(()) => {
                    debug!(resource = %resource, state = %status.state, "wrote status");
                    self.metrics.record_status_write(true);
                    summary.written += 1;
                }
                Err(e) => {
                    warn!(resource = %resource, error = %e, "failed to write status");
                    self.metrics.record_status_write(false);
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    fn current(
        &self,
        snapshot: &ApiSnapshot,
        resource: &ResourceRef,
    ) -> Option<crate::domain::ResourceStatus> {
        snapshot
            .get(resource)
            .and_then(|r| r.metadata().statuses.get(&self.owner).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Host, ResourceKind, StatusState, Upstream};
    use crate::store::InMemoryResourceStore;

    fn echo() -> ResourceRef {
        ResourceRef::new(ResourceKind::Upstream, "default", "echo")
    }

    #[tokio::test]
    async fn test_writes_then_skips_identical() {
        let store = InMemoryResourceStore::new();
        store
            .upsert(Upstream::with_hosts("default", "echo", vec![Host::new("10.0.0.1", 80)]).into())
            .expect("upsert");
        let reporter = StatusReporter::new(Arc::new(store.clone()), "flowsync");

        let mut report = DiagnosticReport::new();
        report.accept(&echo());
        let snapshot = store.snapshot(&[]).await.expect("snapshot");
        let first = reporter.report(&report, &snapshot).await;
        assert_eq!(first.written, 1);

        let status = store.status(&echo(), "flowsync").expect("status");
        assert_eq!(status.state, StatusState::Accepted);
        assert_eq!(status.observed_generation, snapshot.resource_version(&echo()).unwrap_or(0));

        let snapshot = store.snapshot(&[]).await.expect("snapshot");
        let second = reporter.report(&report, &snapshot).await;
        assert_eq!(second, ReportSummary { written: 0, unchanged: 1, failed: 0 });
    }

    #[tokio::test]
    async fn test_owners_are_independent() {
        let store = InMemoryResourceStore::new();
        store.upsert(Upstream::with_hosts("default", "echo", vec![]).into()).expect("upsert");
        let mut report = DiagnosticReport::new();
        report.add_error(&echo(), "no hosts");

        let snapshot = store.snapshot(&[]).await.expect("snapshot");
        StatusReporter::new(Arc::new(store.clone()), "a").report(&report, &snapshot).await;
        StatusReporter::new(Arc::new(store.clone()), "b")
            .report(&DiagnosticReport::new(), &snapshot)
            .await;

        assert_eq!(store.status(&echo(), "a").map(|s| s.state), Some(StatusState::Rejected));
        assert_eq!(store.status(&echo(), "b").map(|s| s.state), Some(StatusState::Accepted));
    }

    #[tokio::test]
    async fn test_missing_object_is_counted_not_fatal() {
        let store = InMemoryResourceStore::new();
        let snapshot = ApiSnapshot::from_resources(vec![Upstream::with_hosts("default", "echo", vec![]).into()]);
        let reporter = StatusReporter::new(Arc::new(store), "flowsync");

        let summary = reporter.report(&DiagnosticReport::new(), &snapshot).await;
        assert_eq!(summary.failed, 1);
    }
}
