use crate::Context;
use crate::error::{Result, storage_error};
use crate::load::{load_metadata, store_metadata};
use keeper_metadata::{BuildNumber, SnapshotMetadata, SnapshotVersion};
use keeper_storage::{PackageStore, VersionId};
use std::collections::HashSet;
use tracing::instrument;

/// Outcome of reconciling one version's metadata document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Entries were dropped; the document was (or in a dry run, would be)
    /// rewritten.
    pub changed: bool,
    /// Entries removed because their file no longer exists, in document
    /// order.
    pub dropped: Vec<SnapshotVersion>,
    /// Number of entries left in the document.
    pub kept: usize,
    /// Highest build number among the kept entries, `0` when there is none.
    pub build_number: BuildNumber,
    /// Values of kept entries that carry no parseable build number. They stay
    /// listed while their file exists but never count as the highest build.
    pub unparsed: Vec<String>,
    /// The rewritten document was stored.
    pub written: bool,
}

/// New document contents derived from a document and the stored files.
pub(crate) struct Plan {
    pub document: SnapshotMetadata,
    pub dropped: Vec<SnapshotVersion>,
    pub unparsed: Vec<String>,
    pub build_number: BuildNumber,
}

impl Plan {
    pub(crate) fn changed(&self) -> bool {
        !self.dropped.is_empty()
    }
}

/// Keep every entry whose expected file exists, in the original order, and
/// recompute the build number from what is kept.
///
/// The input is left untouched; the planned document is built fresh. When the
/// highest build moves, the snapshot timestamp follows the newest kept entry,
/// and is cleared when no entry is left.
pub(crate) fn plan(document: &SnapshotMetadata, existing: &HashSet<&str>) -> Plan {
    let (kept, dropped): (Vec<_>, Vec<_>) = document
        .entries()
        .iter()
        .cloned()
        .partition(|sv| existing.contains(sv.file_name(&document.artifact_id).as_str()));

    let mut unparsed = Vec::new();
    let mut build_number = BuildNumber::ZERO;
    for sv in &kept {
        match sv.build_number() {
            Ok(build) => build_number = build_number.max(build),
            Err(_) => unparsed.push(sv.value.clone()),
        }
    }

    let mut planned = document.clone();
    let snapshot = &mut planned.versioning.snapshot;
    // With nothing left to point at, the old timestamp names a removed build.
    if snapshot.build_number != Some(build_number) {
        snapshot.timestamp = document.timestamp_for(build_number).map(str::to_string);
    }
    snapshot.build_number = Some(build_number);
    planned.versioning.snapshot_versions = kept;

    Plan {
        document: planned,
        dropped,
        unparsed,
        build_number,
    }
}

/// Reconcile a version's metadata document against its stored files.
///
/// Entries whose expected file (`artifactId-value[-classifier].extension`)
/// is gone are dropped and the build number recomputed. The document is only
/// rewritten when something was dropped, so reconciling twice leaves the
/// stored bytes untouched the second time. Nothing is written in a dry run.
///
/// # Errors
///
/// [`NotFound`](crate::error::ErrorKind::NotFound) when the version or its
/// document is missing, [`Parse`](crate::error::ErrorKind::Parse) when the
/// document cannot be read, [`Storage`](crate::error::ErrorKind::Storage)
/// when listing or writing fails.
#[instrument(skip_all, fields(version_id = %version))]
pub async fn reconcile(store: &dyn PackageStore, ctx: &Context, version: &VersionId) -> Result<Reconciliation> {
    let loaded = load_metadata(store, version).await?;
    let files = store.list_files(version).await.map_err(storage_error)?;
    let existing: HashSet<&str> = files.iter().map(|f| f.name.as_str()).collect();
    let plan = plan(&loaded.document, &existing);

    let mut reconciliation = Reconciliation {
        changed: plan.changed(),
        dropped: plan.dropped.clone(),
        kept: plan.document.entries().len(),
        build_number: plan.build_number,
        unparsed: plan.unparsed.clone(),
        written: false,
    };
    if !plan.unparsed.is_empty() {
        tracing::debug!(values = ?plan.unparsed, "Keeping entries without a parseable build number");
    }
    if !reconciliation.changed {
        tracing::debug!("Metadata is consistent with stored files");
        return Ok(reconciliation);
    }
    if ctx.dry_run {
        tracing::info!(
            dropped = reconciliation.dropped.len(),
            build_number = %plan.build_number,
            "Dry run: would rewrite maven-metadata.xml"
        );
        return Ok(reconciliation);
    }

    store_metadata(store, ctx, &loaded.file, &plan.document).await?;
    reconciliation.written = true;
    tracing::info!(
        dropped = reconciliation.dropped.len(),
        build_number = %plan.build_number,
        "Rewrote maven-metadata.xml"
    );
    Ok(reconciliation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{ARTIFACT, entry, file_name, metadata, snapshot_store, snapshot_version, value};
    use keeper_metadata::METADATA_FILE_NAME;
    use keeper_storage::backend::MockStore;
    use keeper_storage::{Actor, PackageStore};

    fn names(document: &SnapshotMetadata) -> Vec<String> {
        document.entries().iter().map(|sv| sv.file_name(&document.artifact_id)).collect()
    }

    #[test]
    fn test_plan_keeps_order_and_recomputes() {
        let document = metadata([
            entry(None, "jar", 1),
            entry(None, "pom", 1),
            entry(None, "jar", 3),
            entry(Some("sources"), "jar", 5),
            entry(None, "jar", 2),
        ]);
        let all = names(&document);
        let existing: HashSet<&str> = [&all[0], &all[2], &all[4]].into_iter().map(String::as_str).collect();

        let plan = plan(&document, &existing);
        assert!(plan.changed());
        assert_eq!(plan.build_number, BuildNumber::new(3));
        assert_eq!(names(&plan.document), [all[0].clone(), all[2].clone(), all[4].clone()]);
        assert_eq!(plan.dropped.len(), 2);
        assert_eq!(plan.document.versioning.snapshot.build_number, Some(BuildNumber::new(3)));
        assert_eq!(plan.document.versioning.snapshot.timestamp.as_deref(), Some("20240101.120003"));
        // The input document is not modified.
        assert_eq!(document.entries().len(), 5);
        assert_eq!(document.versioning.snapshot.build_number, Some(BuildNumber::new(5)));
    }

    #[test]
    fn test_plan_all_present_is_unchanged() {
        let document = metadata([entry(None, "jar", 1), entry(None, "jar", 2)]);
        let all = names(&document);
        let existing: HashSet<&str> = all.iter().map(String::as_str).collect();
        let plan = plan(&document, &existing);
        assert!(!plan.changed());
        assert_eq!(plan.document, document);
    }

    #[test]
    fn test_plan_empty_result() {
        let document = metadata([entry(None, "jar", 1)]);
        let plan = plan(&document, &HashSet::new());
        assert_eq!(plan.build_number, BuildNumber::ZERO);
        assert!(plan.document.entries().is_empty());
        assert_eq!(plan.document.versioning.snapshot.build_number, Some(BuildNumber::ZERO));
        assert_eq!(plan.document.versioning.snapshot.timestamp, None);
    }

    #[test]
    fn test_plan_unparsed_kept_but_not_counted() {
        let mut odd = entry(None, "jar", 9);
        odd.value = "1.0-SNAPSHOT".to_string();
        let document = metadata([entry(None, "jar", 2), odd]);
        let all = names(&document);
        let existing: HashSet<&str> = all.iter().map(String::as_str).collect();
        let plan = plan(&document, &existing);
        assert_eq!(plan.document.entries().len(), 2);
        assert_eq!(plan.unparsed, ["1.0-SNAPSHOT"]);
        assert_eq!(plan.build_number, BuildNumber::new(2));
    }

    #[tokio::test]
    async fn test_orphan_entry_dropped() {
        // Build 5 lists a sources jar that was never stored.
        let id = VersionId::new("1");
        let mut entries: Vec<_> = (1..=5).map(|b| entry(None, "jar", b)).collect();
        entries.push(entry(Some("sources"), "jar", 5));
        let store = snapshot_store(&id, &entries, |sv| sv.classifier.is_none());
        let ctx = Context::new(false);

        let result = reconcile(&store, &ctx, &id).await.unwrap();
        assert!(result.changed);
        assert!(result.written);
        assert_eq!(result.kept, 5);
        assert_eq!(result.build_number, BuildNumber::new(5));
        assert_eq!(result.dropped[0].file_name(ARTIFACT), "artifact-1.0-20240101.120005-5-sources.jar");

        let stored = store.read_file(&id, METADATA_FILE_NAME).await.unwrap();
        let document = SnapshotMetadata::from_slice(&stored).unwrap();
        assert_eq!(document.entries().len(), 5);
        assert!(document.entries().iter().all(|sv| sv.classifier.is_none()));
    }

    #[tokio::test]
    async fn test_orphan_highest_build_recomputes() {
        let id = VersionId::new("1");
        let entries: Vec<_> = (1..=5).map(|b| entry(None, "jar", b)).collect();
        let store = snapshot_store(&id, &entries, |sv| sv.value != value(5));
        let result = reconcile(&store, &Context::new(false), &id).await.unwrap();
        assert_eq!(result.build_number, BuildNumber::new(4));

        let stored = store.read_file(&id, METADATA_FILE_NAME).await.unwrap();
        let document = SnapshotMetadata::from_slice(&stored).unwrap();
        assert_eq!(document.versioning.snapshot.build_number, Some(BuildNumber::new(4)));
        assert_eq!(document.versioning.snapshot.timestamp.as_deref(), Some("20240101.120004"));
    }

    #[tokio::test]
    async fn test_idempotent() {
        let id = VersionId::new("1");
        let entries: Vec<_> = (1..=4).map(|b| entry(None, "jar", b)).collect();
        let store = snapshot_store(&id, &entries, |sv| sv.value != value(2));
        let ctx = Context::new(false);

        assert!(reconcile(&store, &ctx, &id).await.unwrap().changed);
        let first = store.read_file(&id, METADATA_FILE_NAME).await.unwrap();
        let again = reconcile(&store, &ctx, &id).await.unwrap();
        assert!(!again.changed);
        assert!(!again.written);
        assert_eq!(store.read_file(&id, METADATA_FILE_NAME).await.unwrap(), first);
        assert_eq!(store.writes().await.len(), 1);
    }

    #[tokio::test]
    async fn test_consistent_document_is_not_written() {
        let id = VersionId::new("1");
        let entries: Vec<_> = (1..=3).map(|b| entry(None, "pom", b)).collect();
        let store = snapshot_store(&id, &entries, |_| true);
        let result = reconcile(&store, &Context::new(false), &id).await.unwrap();
        assert!(!result.changed);
        assert!(store.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_does_not_write() {
        let id = VersionId::new("1");
        let entries: Vec<_> = (1..=3).map(|b| entry(None, "jar", b)).collect();
        let store = snapshot_store(&id, &entries, |sv| sv.value != value(1));
        let before = store.read_file(&id, METADATA_FILE_NAME).await.unwrap();

        let result = reconcile(&store, &Context::new(true), &id).await.unwrap();
        assert!(result.changed);
        assert!(!result.written);
        assert_eq!(result.dropped.len(), 1);
        assert!(store.writes().await.is_empty());
        assert_eq!(store.read_file(&id, METADATA_FILE_NAME).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_write_is_system_overwrite() {
        let id = VersionId::new("1");
        let entries: Vec<_> = (1..=2).map(|b| entry(None, "jar", b)).collect();
        let store = snapshot_store(&id, &entries, |sv| sv.value != value(1));
        let before = store.get_file_by_name(&id, METADATA_FILE_NAME).await.unwrap();

        reconcile(&store, &Context::new(false), &id).await.unwrap();
        let writes = store.writes().await;
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].name, METADATA_FILE_NAME);
        assert_eq!(writes[0].actor, Actor::System);
        let after = store.get_file_by_name(&id, METADATA_FILE_NAME).await.unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(after.composite_key, before.composite_key);
        assert!(String::from_utf8(store.read_file(&id, METADATA_FILE_NAME).await.unwrap()).unwrap().starts_with(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<metadata>\n  <groupId>"
        ));
    }

    #[tokio::test]
    async fn test_missing_document_is_not_found() {
        let id = VersionId::new("1");
        let store = MockStore::new()
            .with_version(snapshot_version(&id))
            .with_file(&id, &file_name(1, None, "jar"), b"jar".to_vec());
        let err = reconcile(&store, &Context::new(false), &id).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_dangling_document_is_not_found() {
        let id = VersionId::new("1");
        let store = MockStore::new()
            .with_version(snapshot_version(&id))
            .with_dangling_file(&id, METADATA_FILE_NAME);
        let err = reconcile(&store, &Context::new(false), &id).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_malformed_document_is_parse_error() {
        let id = VersionId::new("1");
        let store = MockStore::new()
            .with_version(snapshot_version(&id))
            .with_file(&id, METADATA_FILE_NAME, b"<metadata><versioning>".to_vec());
        let err = reconcile(&store, &Context::new(false), &id).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Parse));
    }

    #[tokio::test]
    async fn test_write_failure_is_storage_error() {
        let id = VersionId::new("1");
        let entries: Vec<_> = (1..=2).map(|b| entry(None, "jar", b)).collect();
        let store = snapshot_store(&id, &entries, |sv| sv.value != value(1)).fail_writes_for(&id);
        let err = reconcile(&store, &Context::new(false), &id).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Storage));
        assert!(err.is_retryable());
    }
}
