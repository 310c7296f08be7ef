//! Local filesystem package store.
//!
//! Serves a Maven repository laid out on disk the way Maven itself lays it
//! out: `group/path/artifactId/version/artifactId-version[-classifier].ext`.
//! Every identifier handed out by this store is a path relative to the
//! repository root; version ids are version directories, file ids and blob
//! references are file paths.

use crate::backend::{BoxSyncRead, VersionStream};
use crate::error::{ErrorKind, Result};
use crate::models::{Actor, BlobRef, CompositeKey, FileId, NewFile, PackageFile, PackageType, PackageVersion, VersionId};
use crate::path::{validate as validate_path, validate_file_name};
use crate::PackageStore;
use async_stream::stream;
use async_trait::async_trait;
use keeper_metadata::checksum_companions;
use exn::{OptionExt, ResultExt};
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs;

enum DirScan {
    /// Leaf directory holding files: a version.
    Version(PackageVersion),
    /// Directory with subdirectories to descend into.
    Descend(Vec<PathBuf>),
    Skip,
}

/// Local filesystem package store.
///
/// A version is any leaf directory (no subdirectories) that holds at least
/// one file and sits at least two levels below the root (`artifactId/version`).
/// Hidden files are ignored; they are used for in-flight writes.
///
/// # Examples
///
/// ```no_run
/// use keeper_storage::backend::LocalStore;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = LocalStore::new("releases", "/srv/maven/releases")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalStore {
    name: String,
    /// Root directory of the Maven repository
    root: PathBuf,
}
impl LocalStore {
    /// Create a new local filesystem store.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or exists but is not a
    /// directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Use non-async here; it'll only happen once on startup and it's
            // not worth the hassle of making the constructor async.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root.display().to_string()))?;
        }
        Ok(Self { name: name.into(), root })
    }

    /// Get the absolute path for a repository-relative path.
    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    /// Convert an absolute path back to a repository-relative identifier.
    fn relative_id(&self, absolute: &Path) -> Result<String> {
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{}` is not within root `{}`", absolute.display(), self.root.display()))
        })?;
        let relative = validate_path(relative)?;
        let id = relative
            .to_str()
            .ok_or_raise(|| ErrorKind::BackendError(format!("non UTF-8 path `{}`", relative.display())))?;
        // Identifiers always use forward slashes, whatever the platform.
        Ok(id.replace(std::path::MAIN_SEPARATOR, "/"))
    }

    fn map_io_error(e: std::io::Error, what: &str) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(what.to_string()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(PathBuf::from(what)),
            _ => ErrorKind::Io(e),
        }
    }

    fn is_hidden(name: &str) -> bool {
        name.starts_with('.')
    }

    /// Build a version record from its directory.
    fn version_at(&self, dir: &Path) -> Result<PackageVersion> {
        let id = self.relative_id(dir)?;
        let mut segments = id.rsplit('/');
        let (Some(version), Some(artifact)) = (segments.next(), segments.next()) else {
            // A directory directly below the root can't be a version: there
            // is no artifact directory above it.
            exn::bail!(ErrorKind::NotFound(format!("version {id}")));
        };
        Ok(PackageVersion::new(id.as_str(), PackageType::Maven, artifact, version))
    }

    fn file_record(&self, version: &VersionId, path: &Path, metadata: &Metadata) -> Result<PackageFile> {
        let id = self.relative_id(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_raise(|| ErrorKind::BackendError(format!("unnamed file `{}`", path.display())))?
            .to_string();
        let created = metadata
            .modified()
            .map(OffsetDateTime::from)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        Ok(PackageFile {
            id: FileId::new(id.as_str()),
            version_id: version.clone(),
            name,
            blob: BlobRef::new(id),
            composite_key: CompositeKey::default(),
            size: metadata.len(),
            created,
        })
    }

    /// Reads one directory and decides whether it is a version, something to
    /// descend into, or neither. Extracted from the stream so that `?` works.
    async fn scan_dir(&self, dir: &Path) -> Result<DirScan> {
        let mut entries = fs::read_dir(dir).await.map_err(|e| Self::map_io_error(e, &dir.display().to_string()))?;
        let mut subdirs = Vec::new();
        let mut has_files = false;
        while let Some(entry) = entries.next_entry().await.map_err(ErrorKind::Io)? {
            let name = entry.file_name();
            if name.to_str().is_none_or(Self::is_hidden) {
                continue;
            }
            let file_type = entry.file_type().await.map_err(ErrorKind::Io)?;
            if file_type.is_dir() {
                subdirs.push(entry.path());
            } else if file_type.is_file() {
                has_files = true;
            }
        }
        if !subdirs.is_empty() {
            return Ok(DirScan::Descend(subdirs));
        }
        let depth = dir.strip_prefix(&self.root).map(|p| p.components().count()).unwrap_or(0);
        match has_files && depth >= 2 {
            true => Ok(DirScan::Version(self.version_at(dir)?)),
            false => Ok(DirScan::Skip),
        }
    }

    async fn version_dir(&self, id: &VersionId) -> Result<PathBuf> {
        let dir = self.absolute_path(id.as_str())?;
        let metadata = fs::metadata(&dir).await.map_err(|e| Self::map_io_error(e, &format!("version {id}")))?;
        if !metadata.is_dir() {
            exn::bail!(ErrorKind::NotFound(format!("version {id}")));
        }
        Ok(dir)
    }

    /// Remove checksum side-files of `target`; they no longer describe it.
    async fn remove_stale_checksums(&self, target: &Path) -> Result<()> {
        let Some(name) = target.file_name().and_then(|n| n.to_str()) else {
            return Ok(());
        };
        for companion in checksum_companions(name) {
            let side_file = target.with_file_name(companion);
            match fs::remove_file(&side_file).await {
                Ok(()) => tracing::debug!(path = %side_file.display(), "Removed stale checksum"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                Err(e) => exn::bail!(ErrorKind::Io(e)),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PackageStore for LocalStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn versions_stream<'a>(&'a self, package_type: PackageType) -> VersionStream<'a> {
        // A directory tree on disk only ever holds a Maven repository.
        if package_type != PackageType::Maven {
            return Box::pin(futures::stream::empty());
        }
        let mut stack = vec![self.root.clone()];
        Box::pin(stream! {
            while let Some(current) = stack.pop() {
                match self.scan_dir(&current).await {
                    Ok(DirScan::Version(version)) => yield Ok(version),
                    Ok(DirScan::Descend(mut dirs)) => {
                        // Reverse so that popping walks siblings in name order.
                        dirs.sort();
                        dirs.reverse();
                        stack.extend(dirs);
                    },
                    Ok(DirScan::Skip) => {},
                    // Directories can vanish between listing and reading.
                    Err(e) if e.is_not_found() => {},
                    Err(e) => yield Err(e),
                }
            }
        })
    }

    async fn get_version(&self, id: &VersionId) -> Result<PackageVersion> {
        let dir = self.version_dir(id).await?;
        self.version_at(&dir)
    }

    async fn list_files(&self, version: &VersionId) -> Result<Vec<PackageFile>> {
        let dir = self.version_dir(version).await?;
        let mut entries = fs::read_dir(&dir).await.map_err(|e| Self::map_io_error(e, &format!("version {version}")))?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(ErrorKind::Io)? {
            if entry.file_name().to_str().is_none_or(Self::is_hidden) {
                continue;
            }
            let metadata = entry.metadata().await.map_err(ErrorKind::Io)?;
            if metadata.is_file() {
                files.push(self.file_record(version, &entry.path(), &metadata)?);
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn get_file_by_name(&self, version: &VersionId, name: &str) -> Result<PackageFile> {
        let name = validate_file_name(name)?;
        let path = self.version_dir(version).await?.join(name);
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| Self::map_io_error(e, &format!("file {name} in version {version}")))?;
        if !metadata.is_file() {
            exn::bail!(ErrorKind::NotFound(format!("file {name} in version {version}")));
        }
        self.file_record(version, &path, &metadata)
    }

    async fn open_blob(&self, blob: &BlobRef) -> Result<BoxSyncRead> {
        let path = self.absolute_path(blob.as_str())?;
        let file = fs::File::open(&path).await.map_err(|e| Self::map_io_error(e, &format!("blob {blob}")))?;
        Ok(Box::new(file.into_std().await))
    }

    async fn delete_file(&self, file: &PackageFile) -> Result<()> {
        let path = self.absolute_path(file.blob.as_str())?;
        Ok(fs::remove_file(&path).await.map_err(|e| Self::map_io_error(e, &format!("file {}", file.id)))?)
    }

    async fn write_file(&self, file: NewFile) -> Result<PackageFile> {
        let name = validate_file_name(&file.name)?;
        let dir = self.version_dir(&file.version_id).await?;
        let target = dir.join(name);
        if !file.overwrite && fs::try_exists(&target).await.map_err(ErrorKind::Io)? {
            exn::bail!(ErrorKind::AlreadyExists(format!("file {name} in version {}", file.version_id)));
        }
        // Write next to the target and rename over it, so readers never see a
        // half-written file. The dotfile is invisible to listings.
        let staging = dir.join(format!(".{name}.keeper-tmp"));
        fs::write(&staging, &file.content).await.map_err(ErrorKind::Io)?;
        if let Err(e) = fs::rename(&staging, &target).await {
            _ = fs::remove_file(&staging).await;
            exn::bail!(ErrorKind::Io(e));
        }
        self.remove_stale_checksums(&target).await?;
        if let Actor::User(user) = &file.actor {
            tracing::debug!(store = %self.name, %user, file = name, "File written on behalf of user");
        }
        let metadata = fs::metadata(&target).await.map_err(ErrorKind::Io)?;
        self.file_record(&file.version_id, &target, &metadata)
    }
}
