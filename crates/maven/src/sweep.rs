use crate::error::{Error, ErrorKind, Result, storage_error};
use crate::load::load_metadata;
use crate::reconcile::{Reconciliation, reconcile};
use crate::report::Failures;
use crate::retain::RetainBuilds;
use crate::{Context, snapshot_versions};
use keeper_metadata::{BuildNumber, FileBuild, checksum_companions, is_metadata_file};
use keeper_storage::{PackageFile, PackageStore, PackageVersion, VersionId};
use std::collections::HashMap;
use std::num::NonZeroU32;
use tracing::instrument;

/// What a sweep did (or, in a dry run, would do) to one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSweep {
    pub version_id: VersionId,
    pub version: String,
    /// Builds strictly below this were selected. `None` when the version
    /// holds no more than the retained number of builds.
    pub threshold: Option<BuildNumber>,
    /// Artifact files removed, in removal order.
    pub removed: Vec<String>,
    /// Checksum side-files removed along with them.
    pub companions: Vec<String>,
    /// Files matching a listed classifier/extension whose build number could
    /// not be derived from the name. They are never removed.
    pub skipped: Vec<String>,
    /// Follow-up reconciliation after at least one removal.
    pub reconciliation: Option<Reconciliation>,
}

impl VersionSweep {
    fn new(version: &PackageVersion) -> Self {
        Self {
            version_id: version.id.clone(),
            version: version.version.clone(),
            threshold: None,
            removed: Vec::new(),
            companions: Vec::new(),
            skipped: Vec::new(),
            reconciliation: None,
        }
    }
}

/// Outcome of a retention sweep over every snapshot version.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Total artifact files removed (or that would be removed).
    pub removed: usize,
    /// One entry per version processed, in processing order.
    pub versions: Vec<VersionSweep>,
    pub failed: Vec<VersionId>,
    /// Retention is disabled; nothing was looked at.
    pub disabled: bool,
    /// Cancellation was requested before every version was processed.
    pub cancelled: bool,
    /// Every per-version failure, under an
    /// [`Incomplete`](ErrorKind::Incomplete) root.
    pub error: Option<Error>,
}

/// Delete all but the newest `retain` builds of every snapshot version.
///
/// For each version the highest build is read from its metadata document
/// (or scanned from its entries). Files whose classifier/extension pair is
/// listed in the document and whose build number is strictly below
/// `highest - retain` are deleted together with their checksum side-files.
/// A failed deletion stops the remaining deletions for that version only.
/// After any successful deletion the version is [reconciled](reconcile).
///
/// Versions are processed one at a time; cancellation is honoured between
/// versions. In a dry run the selection is computed and reported, and
/// nothing is deleted.
///
/// # Errors
///
/// Only failures that prevent the sweep from starting: listing versions.
/// Per-version failures end up in [`SweepReport::error`].
#[instrument(skip_all, fields(store = store.name(), retain = %retain, dry_run = ctx.dry_run))]
pub async fn sweep(store: &dyn PackageStore, ctx: &Context, retain: RetainBuilds) -> Result<SweepReport> {
    let RetainBuilds::Keep(retain) = retain else {
        tracing::info!("Snapshot retention is disabled; skipping sweep");
        return Ok(SweepReport {
            disabled: true,
            ..SweepReport::default()
        });
    };
    let versions = snapshot_versions(store).await?;
    let total = versions.len();
    let mut report = SweepReport::default();
    let mut failures = Failures::default();

    for version in &versions {
        if ctx.cancel.is_cancelled() {
            tracing::warn!(processed = report.versions.len(), total, "Sweep cancelled");
            report.cancelled = true;
            break;
        }
        let mut outcome = VersionSweep::new(version);
        let result = sweep_version(store, ctx, retain, &mut outcome).await;
        report.removed += outcome.removed.len();
        if let Err(error) = result {
            failures.record(version, error);
        }
        report.versions.push(outcome);
    }

    (report.failed, report.error) = failures.finish(total);
    log_summary(&report, ctx.dry_run);
    Ok(report)
}

fn log_summary(report: &SweepReport, dry_run: bool) {
    let per_version: Vec<_> = report
        .versions
        .iter()
        .filter(|v| !v.removed.is_empty())
        .map(|v| format!("{} from version {}", v.removed.len(), v.version_id))
        .collect();
    match (report.removed, dry_run) {
        (0, _) => tracing::debug!(failed = report.failed.len(), "Sweep complete; no files needed removing"),
        (removed, true) => tracing::info!(removed, failed = report.failed.len(), "Dry run: would remove {}", per_version.join(", ")),
        (removed, false) => tracing::info!(removed, failed = report.failed.len(), "Removed {}", per_version.join(", ")),
    }
}

/// Files eligible for removal, and files that had to be skipped.
fn select<'a>(
    document: &keeper_metadata::SnapshotMetadata,
    files: &'a [PackageFile],
    threshold: BuildNumber,
) -> (Vec<&'a PackageFile>, Vec<String>) {
    let endings = document.endings();
    let mut selected = Vec::new();
    let mut skipped = Vec::new();
    for file in files.iter().filter(|f| !is_metadata_file(&f.name)) {
        match document.build_of(&file.name, &endings) {
            FileBuild::Build(build) if build < threshold => selected.push(file),
            FileBuild::Build(_) | FileBuild::Unlisted => {},
            FileBuild::Unparsed => skipped.push(file.name.clone()),
        }
    }
    (selected, skipped)
}

#[instrument(skip_all, fields(version_id = %outcome.version_id, version = %outcome.version))]
async fn sweep_version(
    store: &dyn PackageStore,
    ctx: &Context,
    retain: NonZeroU32,
    outcome: &mut VersionSweep,
) -> Result<()> {
    let loaded = load_metadata(store, &outcome.version_id).await?;
    let Some(highest) = loaded.document.effective_build_number() else {
        tracing::debug!("No build numbers listed; nothing to remove");
        return Ok(());
    };
    let Some(threshold) = RetainBuilds::threshold(retain, highest) else {
        tracing::debug!(highest = %highest, "No builds below threshold");
        return Ok(());
    };
    outcome.threshold = Some(threshold);

    let files = store.list_files(&outcome.version_id).await.map_err(storage_error)?;
    let (selected, skipped) = select(&loaded.document, &files, threshold);
    outcome.skipped = skipped;

    if ctx.dry_run {
        outcome.removed = selected.iter().map(|f| f.name.clone()).collect();
        tracing::info!(
            threshold = %threshold,
            remove = ?outcome.removed,
            skipped = ?outcome.skipped,
            "Dry run: selected files below threshold"
        );
        return Ok(());
    }

    let by_name: HashMap<&str, &PackageFile> = files.iter().map(|f| (f.name.as_str(), f)).collect();
    let deletion = delete_selected(store, &selected, &by_name, threshold, outcome).await;

    // The document still lists whatever was deleted before a failure.
    let reconciliation = match outcome.removed.is_empty() {
        true => Ok(()),
        false => {
            let version_id = outcome.version_id.clone();
            reconcile(store, ctx, &version_id).await.map(|r| outcome.reconciliation = Some(r))
        },
    };

    match (deletion, reconciliation) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
        (Err(deletion), Err(reconciliation)) => Err(Error::raise_all(ErrorKind::Storage, [deletion, reconciliation])),
    }
}

async fn delete_selected(
    store: &dyn PackageStore,
    selected: &[&PackageFile],
    by_name: &HashMap<&str, &PackageFile>,
    threshold: BuildNumber,
    outcome: &mut VersionSweep,
) -> Result<()> {
    for file in selected {
        tracing::debug!(file = %file.name, threshold = %threshold, "Removing file below threshold");
        store.delete_file(file).await.map_err(storage_error)?;
        outcome.removed.push(file.name.clone());

        for companion in checksum_companions(&file.name) {
            let Some(side_file) = by_name.get(companion.as_str()) else {
                continue;
            };
            match store.delete_file(side_file).await {
                Ok(()) => outcome.companions.push(companion),
                Err(e) if e.is_not_found() => {},
                Err(e) => return Err(storage_error(e)),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{VERSION, builds, entry, file_name, metadata, snapshot_store, snapshot_version, with_snapshot};
    use keeper_metadata::{METADATA_FILE_NAME, SnapshotMetadata};
    use keeper_storage::backend::MockStore;
    use keeper_storage::{PackageType, PackageVersion};

    fn keep(n: u32) -> RetainBuilds {
        RetainBuilds::Keep(NonZeroU32::new(n).unwrap())
    }

    fn build_files(range: std::ops::RangeInclusive<u32>) -> Vec<String> {
        range.flat_map(|b| [file_name(b, None, "jar"), file_name(b, None, "pom")]).collect()
    }

    #[tokio::test]
    async fn test_retains_newest_builds() {
        let id = VersionId::new("1");
        let store = snapshot_store(&id, &builds(1..=10), |_| true);
        let report = sweep(&store, &Context::new(false), keep(3)).await.unwrap();

        assert!(report.error.is_none());
        assert_eq!(report.removed, 12);
        assert_eq!(report.versions[0].threshold, Some(BuildNumber::new(7)));
        assert_eq!(report.versions[0].removed, build_files(1..=6));

        let mut expected = build_files(7..=10);
        expected.push(METADATA_FILE_NAME.to_string());
        expected.sort();
        assert_eq!(store.file_names(&id).await, expected);

        let stored = store.read_file(&id, METADATA_FILE_NAME).await.unwrap();
        let document = SnapshotMetadata::from_slice(&stored).unwrap();
        assert_eq!(document.versioning.snapshot.build_number, Some(BuildNumber::new(10)));
        assert_eq!(document.entries().len(), 8);
        assert!(report.versions[0].reconciliation.as_ref().is_some_and(|r| r.written));
    }

    #[tokio::test]
    async fn test_nothing_below_threshold() {
        let id = VersionId::new("1");
        let store = snapshot_store(&id, &builds(1..=3), |_| true);
        let report = sweep(&store, &Context::new(false), keep(3)).await.unwrap();
        assert_eq!(report.removed, 0);
        assert_eq!(report.versions[0].threshold, None);
        assert!(store.writes().await.is_empty());
        assert_eq!(store.file_names(&id).await.len(), 7);
    }

    #[tokio::test]
    async fn test_dry_run_matches_real_run() {
        let id = VersionId::new("1");
        let dry = snapshot_store(&id, &builds(1..=10), |_| true);
        let before = dry.file_names(&id).await;
        let metadata_before = dry.read_file(&id, METADATA_FILE_NAME).await;

        let dry_report = sweep(&dry, &Context::new(true), keep(3)).await.unwrap();
        assert_eq!(dry.file_names(&id).await, before);
        assert_eq!(dry.read_file(&id, METADATA_FILE_NAME).await, metadata_before);
        assert!(dry.writes().await.is_empty());
        assert!(dry_report.versions[0].reconciliation.is_none());

        let real = snapshot_store(&id, &builds(1..=10), |_| true);
        let real_report = sweep(&real, &Context::new(false), keep(3)).await.unwrap();
        assert_eq!(dry_report.removed, real_report.removed);
        assert_eq!(dry_report.versions[0].removed, real_report.versions[0].removed);
    }

    #[tokio::test]
    async fn test_partial_failure_isolation() {
        let (missing, healthy) = (VersionId::new("a"), VersionId::new("b"));
        let store = MockStore::new()
            .with_version(snapshot_version(&missing))
            .with_file(&missing, &file_name(1, None, "jar"), b"jar".to_vec());
        let store = with_snapshot(store, &healthy, &builds(1..=5), |_| true);

        let report = sweep(&store, &Context::new(false), keep(2)).await.unwrap();
        assert_eq!(report.failed, [missing.clone()]);
        let error = report.error.unwrap();
        assert!(matches!(&*error, ErrorKind::Incomplete { failed: 1, total: 2 }));

        assert_eq!(report.removed, 4);
        assert_eq!(store.file_names(&healthy).await.len(), 7);
        assert_eq!(store.writes().await.len(), 1);
        assert_eq!(store.file_names(&missing).await.len(), 1);
    }

    #[tokio::test]
    async fn test_listing_failure_isolated() {
        let (broken, healthy) = (VersionId::new("a"), VersionId::new("b"));
        let store = snapshot_store(&broken, &builds(1..=5), |_| true).fail_listing_of(&broken);
        let store = with_snapshot(store, &healthy, &builds(1..=5), |_| true);

        let report = sweep(&store, &Context::new(false), keep(2)).await.unwrap();
        assert_eq!(report.failed, [broken.clone()]);
        let error = report.error.unwrap();
        assert!(matches!(&*error, ErrorKind::Incomplete { failed: 1, total: 2 }));
        assert!(error.is_retryable());

        // The broken version is untouched, its sibling is swept.
        assert_eq!(store.file_names(&broken).await.len(), 11);
        assert_eq!(store.file_names(&healthy).await.len(), 7);
        assert_eq!(report.removed, 4);
    }

    #[tokio::test]
    async fn test_deletion_failure_stops_version_but_reconciles() {
        let id = VersionId::new("1");
        let store = snapshot_store(&id, &builds(1..=10), |_| true).fail_delete_of(&file_name(3, None, "jar"));
        let report = sweep(&store, &Context::new(false), keep(3)).await.unwrap();

        assert_eq!(report.failed, [id.clone()]);
        assert_eq!(report.removed, 4);
        assert_eq!(report.versions[0].removed, build_files(1..=2));
        assert!(store.file_names(&id).await.contains(&file_name(4, None, "jar")));

        // Entries for the deleted builds are gone; builds 3..10 remain listed.
        let stored = store.read_file(&id, METADATA_FILE_NAME).await.unwrap();
        let document = SnapshotMetadata::from_slice(&stored).unwrap();
        assert_eq!(document.entries().len(), 16);
        assert_eq!(document.versioning.snapshot.build_number, Some(BuildNumber::new(10)));
    }

    #[tokio::test]
    async fn test_deletion_and_reconcile_failure_both_reported() {
        let id = VersionId::new("1");
        let store = snapshot_store(&id, &builds(1..=5), |_| true)
            .fail_delete_of(&file_name(2, None, "jar"))
            .fail_writes_for(&id);
        let report = sweep(&store, &Context::new(false), keep(1)).await.unwrap();
        assert_eq!(report.failed, [id]);
        assert_eq!(report.removed, 2);
        assert!(report.versions[0].reconciliation.is_none());
    }

    #[tokio::test]
    async fn test_checksums_follow_their_file() {
        let id = VersionId::new("1");
        let jar = file_name(1, None, "jar");
        let store = snapshot_store(&id, &builds(1..=4), |_| true)
            .with_file(&id, &format!("{jar}.sha1"), b"abc".to_vec())
            .with_file(&id, &format!("{jar}.md5"), b"def".to_vec())
            .with_file(&id, &format!("{}.sha1", file_name(4, None, "jar")), b"ghi".to_vec());
        let report = sweep(&store, &Context::new(false), keep(2)).await.unwrap();

        assert_eq!(report.removed, 2);
        assert_eq!(report.versions[0].companions, [format!("{jar}.md5"), format!("{jar}.sha1")]);
        let names = store.file_names(&id).await;
        assert!(!names.iter().any(|n| n.starts_with(&jar)));
        assert!(names.contains(&format!("{}.sha1", file_name(4, None, "jar"))));
    }

    #[tokio::test]
    async fn test_classifier_files_use_their_own_ending() {
        let id = VersionId::new("1");
        let mut entries = builds(1..=4);
        entries.extend((1..=4).map(|b| entry(Some("sources"), "jar", b)));
        let store = snapshot_store(&id, &entries, |_| true);
        let report = sweep(&store, &Context::new(false), keep(1)).await.unwrap();
        assert_eq!(report.removed, 6);
        assert!(report.versions[0].removed.contains(&file_name(2, Some("sources"), "jar")));
        assert!(store.file_names(&id).await.contains(&file_name(3, Some("sources"), "jar")));
    }

    #[tokio::test]
    async fn test_unlisted_and_unparsed_files_survive() {
        let id = VersionId::new("1");
        let store = snapshot_store(&id, &builds(1..=5), |_| true)
            .with_file(&id, "artifact-1.0-SNAPSHOT.jar", b"jar".to_vec())
            .with_file(&id, &file_name(1, Some("javadoc"), "jar"), b"doc".to_vec());
        let report = sweep(&store, &Context::new(true), keep(2)).await.unwrap();
        // A classifier the document does not list can't be told apart from
        // the build number, so the javadoc jar is skipped rather than removed.
        assert_eq!(
            report.versions[0].skipped,
            [file_name(1, Some("javadoc"), "jar"), "artifact-1.0-SNAPSHOT.jar".to_string()]
        );
        assert_eq!(report.removed, 4);
    }

    #[tokio::test]
    async fn test_missing_build_number_is_scanned() {
        let id = VersionId::new("1");
        let mut document = metadata(builds(1..=4));
        document.versioning.snapshot.build_number = None;
        let mut store = MockStore::new()
            .with_version(snapshot_version(&id))
            .with_file(&id, METADATA_FILE_NAME, document.to_xml().unwrap().into_bytes());
        for name in build_files(1..=4) {
            store = store.with_file(&id, &name, b"x".to_vec());
        }
        let report = sweep(&store, &Context::new(false), keep(2)).await.unwrap();
        assert_eq!(report.versions[0].threshold, Some(BuildNumber::new(2)));
        assert_eq!(report.versions[0].removed, build_files(1..=1));
    }

    #[tokio::test]
    async fn test_disabled_is_a_no_op() {
        let id = VersionId::new("1");
        let store = snapshot_store(&id, &builds(1..=10), |_| true);
        let report = sweep(&store, &Context::new(false), RetainBuilds::Disabled).await.unwrap();
        assert!(report.disabled);
        assert!(report.versions.is_empty());
        assert_eq!(store.file_names(&id).await.len(), 21);
    }

    #[tokio::test]
    async fn test_cancelled_between_versions() {
        let id = VersionId::new("1");
        let store = snapshot_store(&id, &builds(1..=10), |_| true);
        let ctx = Context::new(false);
        ctx.cancel.cancel();
        let report = sweep(&store, &ctx, keep(3)).await.unwrap();
        assert!(report.cancelled);
        assert!(report.versions.is_empty());
        assert_eq!(store.file_names(&id).await.len(), 21);
    }

    #[tokio::test]
    async fn test_only_snapshot_versions() {
        let release = VersionId::new("r");
        let store = MockStore::new()
            .with_version(PackageVersion::new(release.clone(), PackageType::Maven, "artifact", "1.0"))
            .with_version(PackageVersion::new("n", PackageType::Npm, "artifact", VERSION));
        let report = sweep(&store, &Context::new(false), keep(1)).await.unwrap();
        assert!(report.versions.is_empty());
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn test_second_sweep_is_a_no_op() {
        let id = VersionId::new("1");
        let store = snapshot_store(&id, &builds(1..=6), |_| true);
        let ctx = Context::new(false);
        sweep(&store, &ctx, keep(2)).await.unwrap();
        let writes = store.writes().await.len();
        let report = sweep(&store, &ctx, keep(2)).await.unwrap();
        assert_eq!(report.removed, 0);
        assert_eq!(store.writes().await.len(), writes);
    }
}
