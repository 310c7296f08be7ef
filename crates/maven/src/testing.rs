//! Fixtures shared by the job tests.

use keeper_metadata::{BuildNumber, METADATA_FILE_NAME, Snapshot, SnapshotMetadata, SnapshotVersion, Versioning};
use keeper_storage::backend::MockStore;
use keeper_storage::{PackageType, PackageVersion, VersionId};
use std::ops::RangeInclusive;

pub(crate) const ARTIFACT: &str = "artifact";
pub(crate) const VERSION: &str = "1.0-SNAPSHOT";

/// Snapshot value of a build; every build gets its own timestamp.
pub(crate) fn value(build: u32) -> String {
    format!("1.0-20240101.{}-{build}", 120_000 + build)
}

pub(crate) fn entry(classifier: Option<&str>, extension: &str, build: u32) -> SnapshotVersion {
    SnapshotVersion {
        classifier: classifier.map(str::to_string),
        extension: extension.to_string(),
        value: value(build),
        updated: Some("20240101120000".to_string()),
    }
}

pub(crate) fn file_name(build: u32, classifier: Option<&str>, extension: &str) -> String {
    entry(classifier, extension, build).file_name(ARTIFACT)
}

/// A jar and a pom entry for every build.
pub(crate) fn builds(range: RangeInclusive<u32>) -> Vec<SnapshotVersion> {
    range.flat_map(|b| [entry(None, "jar", b), entry(None, "pom", b)]).collect()
}

/// Consistent document: build number and timestamp match the newest entry.
pub(crate) fn metadata(entries: impl IntoIterator<Item = SnapshotVersion>) -> SnapshotMetadata {
    let mut document = SnapshotMetadata {
        model_version: None,
        group_id: "com.example".to_string(),
        artifact_id: ARTIFACT.to_string(),
        version: VERSION.to_string(),
        versioning: Versioning {
            snapshot: Snapshot::default(),
            last_updated: Some("20240101120000".to_string()),
            snapshot_versions: entries.into_iter().collect(),
        },
    };
    let max = document.max_build_number();
    let timestamp = max.and_then(|b| document.timestamp_for(b)).map(str::to_string);
    document.versioning.snapshot.build_number = Some(max.unwrap_or(BuildNumber::ZERO));
    document.versioning.snapshot.timestamp = timestamp;
    document
}

pub(crate) fn snapshot_version(id: &VersionId) -> PackageVersion {
    PackageVersion::new(id.clone(), PackageType::Maven, ARTIFACT, VERSION)
}

/// Add a snapshot version whose document lists `entries`; only the entries
/// accepted by `stored` get a file.
pub(crate) fn with_snapshot(
    store: MockStore,
    id: &VersionId,
    entries: &[SnapshotVersion],
    stored: impl Fn(&SnapshotVersion) -> bool,
) -> MockStore {
    let xml = metadata(entries.iter().cloned()).to_xml().unwrap();
    let mut store = store.with_version(snapshot_version(id)).with_file(id, METADATA_FILE_NAME, xml.into_bytes());
    for sv in entries.iter().filter(|sv| stored(sv)) {
        store = store.with_file(id, &sv.file_name(ARTIFACT), sv.value.clone().into_bytes());
    }
    store
}

pub(crate) fn snapshot_store(
    id: &VersionId,
    entries: &[SnapshotVersion],
    stored: impl Fn(&SnapshotVersion) -> bool,
) -> MockStore {
    with_snapshot(MockStore::new(), id, entries, stored)
}
