use crate::error::{Error, Result};
use crate::reconcile::{Reconciliation, reconcile};
use crate::report::Failures;
use crate::{Context, snapshot_versions};
use keeper_storage::{PackageStore, VersionId};
use tracing::instrument;

/// Outcome of reconciling every snapshot version.
#[derive(Debug, Default)]
pub struct PruneReport {
    /// Versions whose document was (or would be) rewritten.
    pub pruned: usize,
    /// Successful reconciliations, in processing order.
    pub reconciliations: Vec<(VersionId, Reconciliation)>,
    pub failed: Vec<VersionId>,
    pub cancelled: bool,
    pub error: Option<Error>,
}

/// [Reconcile](reconcile) every snapshot version, whatever its state.
///
/// A failing version does not stop the others; all failures are collected
/// into [`PruneReport::error`]. Cancellation is honoured between versions.
///
/// # Errors
///
/// Only when the versions cannot be listed.
#[instrument(skip_all, fields(store = store.name(), dry_run = ctx.dry_run))]
pub async fn prune_all(store: &dyn PackageStore, ctx: &Context) -> Result<PruneReport> {
    let versions = snapshot_versions(store).await?;
    let total = versions.len();
    let mut report = PruneReport::default();
    let mut failures = Failures::default();

    for version in &versions {
        if ctx.cancel.is_cancelled() {
            tracing::warn!(processed = report.reconciliations.len() + failures.len(), total, "Prune cancelled");
            report.cancelled = true;
            break;
        }
        match reconcile(store, ctx, &version.id).await {
            Ok(reconciliation) => {
                if reconciliation.changed {
                    report.pruned += 1;
                }
                report.reconciliations.push((version.id.clone(), reconciliation));
            },
            Err(error) => failures.record(version, error),
        }
    }

    (report.failed, report.error) = failures.finish(total);

    let pruned: Vec<_> = report
        .reconciliations
        .iter()
        .filter(|(_, r)| r.changed)
        .map(|(id, _)| format!("version {id}"))
        .collect();
    match report.pruned {
        0 => tracing::debug!(failed = report.failed.len(), "Prune complete; no metadata needed pruning"),
        n => tracing::info!(pruned = n, failed = report.failed.len(), "Pruned metadata of {}", pruned.join(", ")),
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{builds, file_name, snapshot_version, value, with_snapshot};
    use keeper_metadata::{BuildNumber, METADATA_FILE_NAME, SnapshotMetadata};
    use keeper_storage::backend::MockStore;
    use keeper_storage::{PackageType, PackageVersion};

    fn fixture() -> (MockStore, VersionId, VersionId, VersionId) {
        let (orphaned, clean, broken) = (VersionId::new("a"), VersionId::new("b"), VersionId::new("c"));
        let store = MockStore::new();
        // Builds 4 and 5 were deleted without touching the document.
        let store = with_snapshot(store, &orphaned, &builds(1..=5), |sv| sv.value < value(4));
        let store = with_snapshot(store, &clean, &builds(1..=2), |_| true);
        let store = store
            .with_version(snapshot_version(&broken))
            .with_file(&broken, METADATA_FILE_NAME, b"<metadata>".to_vec())
            .with_version(PackageVersion::new("r", PackageType::Maven, "artifact", "1.0"));
        (store, orphaned, clean, broken)
    }

    #[tokio::test]
    async fn test_prunes_orphans_and_isolates_failures() {
        let (store, orphaned, clean, broken) = fixture();
        let report = prune_all(&store, &Context::new(false)).await.unwrap();

        assert_eq!(report.pruned, 1);
        assert_eq!(report.failed, [broken]);
        assert!(matches!(&*report.error.unwrap(), ErrorKind::Incomplete { failed: 1, total: 3 }));
        assert_eq!(report.reconciliations.len(), 2);
        assert_eq!(report.reconciliations[0].0, orphaned);
        assert_eq!(report.reconciliations[1].0, clean);

        let stored = store.read_file(&orphaned, METADATA_FILE_NAME).await.unwrap();
        let document = SnapshotMetadata::from_slice(&stored).unwrap();
        assert_eq!(document.entries().len(), 6);
        assert_eq!(document.versioning.snapshot.build_number, Some(BuildNumber::new(3)));
        assert!(!store.file_names(&orphaned).await.contains(&file_name(4, None, "jar")));

        let writes = store.writes().await;
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].version_id, orphaned);
    }

    #[tokio::test]
    async fn test_dry_run_counts_without_writing() {
        let (store, ..) = fixture();
        let report = prune_all(&store, &Context::new(true)).await.unwrap();
        assert_eq!(report.pruned, 1);
        assert!(report.reconciliations.iter().all(|(_, r)| !r.written));
        assert!(store.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_second_run_prunes_nothing() {
        let (store, ..) = fixture();
        let ctx = Context::new(false);
        prune_all(&store, &ctx).await.unwrap();
        let report = prune_all(&store, &ctx).await.unwrap();
        assert_eq!(report.pruned, 0);
        assert_eq!(store.writes().await.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled() {
        let (store, ..) = fixture();
        let ctx = Context::new(false);
        ctx.cancel.cancel();
        let report = prune_all(&store, &ctx).await.unwrap();
        assert!(report.cancelled);
        assert!(report.reconciliations.is_empty());
        assert!(report.error.is_none());
    }
}
