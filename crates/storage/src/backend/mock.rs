//! In-memory package store for testing.

use super::{BoxSyncRead, VersionStream};
use crate::error::{ErrorKind, Result};
use crate::models::{Actor, BlobRef, CompositeKey, FileId, NewFile, PackageFile, PackageType, PackageVersion, VersionId};
use crate::path::validate_file_name;
use crate::PackageStore;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// A write the store accepted, kept for later inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub version_id: VersionId,
    pub name: String,
    pub actor: Actor,
}

#[derive(Default)]
struct State {
    versions: Vec<PackageVersion>,
    files: Vec<PackageFile>,
    blobs: HashMap<BlobRef, Vec<u8>>,
    next_id: u64,
    writes: Vec<WriteRecord>,
    fail_delete: HashSet<String>,
    fail_writes: HashSet<VersionId>,
    fail_listing: HashSet<VersionId>,
}
impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn has_version(&self, id: &VersionId) -> bool {
        self.versions.iter().any(|v| &v.id == id)
    }

    fn insert(&mut self, version_id: &VersionId, name: &str, composite_key: CompositeKey, content: Vec<u8>) -> PackageFile {
        let n = self.next_id();
        let blob = BlobRef::new(format!("blob-{n}"));
        let size = content.len() as u64;
        self.blobs.insert(blob.clone(), content);
        let file = PackageFile {
            id: FileId::new(format!("file-{n}")),
            version_id: version_id.clone(),
            name: name.to_string(),
            blob,
            composite_key,
            size,
            created: OffsetDateTime::now_utc(),
        };
        self.files.push(file.clone());
        file
    }
}

/// In-memory package store for testing.
///
/// Versions, file records and blobs live in memory behind a [`RwLock`], so
/// every trait method works on `&self`. Failures can be injected per file
/// name or per version, and every accepted write is recorded together with
/// the actor it was made on behalf of.
///
/// File ids look like `file-N` and blob references like `blob-N`. Replacing a
/// file keeps its id but stores the content under a fresh blob.
///
/// # Examples
///
/// ```
/// use keeper_storage::backend::MockStore;
/// use keeper_storage::{PackageStore, PackageType, PackageVersion, VersionId};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let id = VersionId::new("1");
/// let store = MockStore::new()
///     .with_version(PackageVersion::new(id.clone(), PackageType::Maven, "app", "1.0-SNAPSHOT"))
///     .with_file(&id, "app-1.0-20240101.120000-1.jar", b"jar");
/// assert_eq!(store.list_files(&id).await?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct MockStore {
    state: RwLock<State>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a version to the catalog.
    pub fn with_version(mut self, version: PackageVersion) -> Self {
        self.state.get_mut().versions.push(version);
        self
    }

    /// Add a file to an existing version.
    ///
    /// Panics if the version was not added first or the name is not a bare
    /// file name; broken test setup should not produce a passing test.
    pub fn with_file(mut self, version: &VersionId, name: &str, content: impl Into<Vec<u8>>) -> Self {
        let state = self.state.get_mut();
        if !state.has_version(version) || validate_file_name(name).is_err() {
            panic!("MockStore::with_file: cannot add {name} to version {version}");
        }
        state.insert(version, name, CompositeKey::default(), content.into());
        self
    }

    /// Add a file record whose blob is missing from storage.
    pub fn with_dangling_file(mut self, version: &VersionId, name: &str) -> Self {
        let state = self.state.get_mut();
        let file = state.insert(version, name, CompositeKey::default(), Vec::new());
        state.blobs.remove(&file.blob);
        self
    }

    /// Every attempt to delete a file with this name fails.
    pub fn fail_delete_of(mut self, name: &str) -> Self {
        self.state.get_mut().fail_delete.insert(name.to_string());
        self
    }

    /// Every write into this version fails.
    pub fn fail_writes_for(mut self, version: &VersionId) -> Self {
        self.state.get_mut().fail_writes.insert(version.clone());
        self
    }

    /// Listing the files of this version fails.
    pub fn fail_listing_of(mut self, version: &VersionId) -> Self {
        self.state.get_mut().fail_listing.insert(version.clone());
        self
    }

    /// Writes accepted so far, in order.
    pub async fn writes(&self) -> Vec<WriteRecord> {
        self.state.read().await.writes.clone()
    }

    /// Names of the files currently in a version, sorted.
    pub async fn file_names(&self, version: &VersionId) -> Vec<String> {
        let state = self.state.read().await;
        let mut names: Vec<_> = state
            .files
            .iter()
            .filter(|f| &f.version_id == version)
            .map(|f| f.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Current content of a file, if both the record and its blob exist.
    pub async fn read_file(&self, version: &VersionId, name: &str) -> Option<Vec<u8>> {
        let state = self.state.read().await;
        let file = state.files.iter().find(|f| &f.version_id == version && f.name == name)?;
        state.blobs.get(&file.blob).cloned()
    }
}

#[async_trait]
impl PackageStore for MockStore {
    fn name(&self) -> &str {
        "mock"
    }

    fn versions_stream<'a>(&'a self, package_type: PackageType) -> VersionStream<'a> {
        Box::pin(stream! {
            let versions: Vec<_> = self
                .state
                .read()
                .await
                .versions
                .iter()
                .filter(|v| v.package_type == package_type)
                .cloned()
                .collect();
            for version in versions {
                yield Ok(version);
            }
        })
    }

    async fn get_version(&self, id: &VersionId) -> Result<PackageVersion> {
        let state = self.state.read().await;
        match state.versions.iter().find(|v| &v.id == id) {
            Some(version) => Ok(version.clone()),
            None => exn::bail!(ErrorKind::NotFound(format!("version {id}"))),
        }
    }

    async fn list_files(&self, version: &VersionId) -> Result<Vec<PackageFile>> {
        let state = self.state.read().await;
        if state.fail_listing.contains(version) {
            exn::bail!(ErrorKind::BackendError(format!("listing files of version {version} failed")));
        }
        if !state.has_version(version) {
            exn::bail!(ErrorKind::NotFound(format!("version {version}")));
        }
        let mut files: Vec<_> = state.files.iter().filter(|f| &f.version_id == version).cloned().collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn get_file_by_name(&self, version: &VersionId, name: &str) -> Result<PackageFile> {
        let state = self.state.read().await;
        match state.files.iter().find(|f| &f.version_id == version && f.name == name) {
            Some(file) => Ok(file.clone()),
            None => exn::bail!(ErrorKind::NotFound(format!("file {name} in version {version}"))),
        }
    }

    async fn open_blob(&self, blob: &BlobRef) -> Result<BoxSyncRead> {
        let state = self.state.read().await;
        match state.blobs.get(blob) {
            Some(content) => Ok(Box::new(Cursor::new(content.clone()))),
            None => exn::bail!(ErrorKind::NotFound(format!("blob {blob}"))),
        }
    }

    async fn delete_file(&self, file: &PackageFile) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_delete.contains(&file.name) {
            exn::bail!(ErrorKind::BackendError(format!("deleting {} failed", file.name)));
        }
        let Some(index) = state.files.iter().position(|f| f.id == file.id) else {
            exn::bail!(ErrorKind::NotFound(format!("file {}", file.id)));
        };
        let removed = state.files.remove(index);
        state.blobs.remove(&removed.blob);
        Ok(())
    }

    async fn write_file(&self, file: NewFile) -> Result<PackageFile> {
        validate_file_name(&file.name)?;
        let mut state = self.state.write().await;
        if state.fail_writes.contains(&file.version_id) {
            exn::bail!(ErrorKind::BackendError(format!("writing {} failed", file.name)));
        }
        if !state.has_version(&file.version_id) {
            exn::bail!(ErrorKind::NotFound(format!("version {}", file.version_id)));
        }
        let existing = state
            .files
            .iter()
            .position(|f| f.version_id == file.version_id && f.name == file.name);
        let record = match existing {
            Some(_) if !file.overwrite => {
                exn::bail!(ErrorKind::AlreadyExists(format!("file {} in version {}", file.name, file.version_id)))
            },
            Some(index) => {
                let blob = BlobRef::new(format!("blob-{}", state.next_id()));
                let old = std::mem::replace(&mut state.files[index].blob, blob.clone());
                state.blobs.remove(&old);
                let entry = &mut state.files[index];
                entry.size = file.content.len() as u64;
                entry.composite_key = file.composite_key.clone();
                let record = entry.clone();
                state.blobs.insert(blob, file.content);
                record
            },
            None => state.insert(&file.version_id, &file.name, file.composite_key.clone(), file.content),
        };
        state.writes.push(WriteRecord {
            version_id: file.version_id,
            name: file.name,
            actor: file.actor,
        });
        Ok(record)
    }
}
