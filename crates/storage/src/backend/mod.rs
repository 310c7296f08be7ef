//! Package store trait and implementations.
//!
//! This module defines the [`PackageStore`] trait: the catalog of package
//! versions and files plus the blob storage behind them, as seen by the
//! maintenance jobs. The catalog and the blobs are deliberately one
//! interface; callers never need to know which part of a backend answers.

mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use self::local::LocalStore;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::{MockStore, WriteRecord};
use crate::error::Result;
use crate::models::{BlobRef, NewFile, PackageFile, PackageType, PackageVersion, VersionId};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::io::Read;
use std::pin::Pin;

pub(crate) type VersionStream<'a> = Pin<Box<dyn Stream<Item = Result<PackageVersion>> + Send + 'a>>;
pub(crate) type BoxSyncRead = Box<dyn Read + Send + 'static>;

/// Unified interface for package stores.
///
/// All operations are asynchronous; a store may sit on a database and an
/// object store, or on a plain directory tree. None of the operations are
/// retried internally and none of them are atomic with each other: deleting a
/// file and rewriting the metadata that lists it are two separate calls.
///
/// # Examples
///
/// ```
/// use keeper_storage::{PackageStore, PackageType, error::Result};
///
/// async fn count_snapshots(store: &dyn PackageStore) -> Result<usize> {
///     let versions = store.list_versions(PackageType::Maven).await?;
///     Ok(versions.iter().filter(|v| v.version.ends_with("-SNAPSHOT")).count())
/// }
/// ```
#[async_trait]
pub trait PackageStore: Send + Sync {
    /// Name of the configured store (used for logging only).
    fn name(&self) -> &str;

    /// Stream every version of the given package type.
    ///
    /// Versions are yielded as they are discovered. Listing errors for one
    /// part of the catalog are yielded as `Err` items without ending the
    /// stream.
    fn versions_stream<'a>(&'a self, package_type: PackageType) -> VersionStream<'a>;

    /// List every version of the given package type.
    ///
    /// Default implementation of this method is to collect all the results
    /// from [`versions_stream()`](Self::versions_stream) into a [`Vec`],
    /// failing on the first error.
    async fn list_versions(&self, package_type: PackageType) -> Result<Vec<PackageVersion>> {
        self.versions_stream(package_type).try_collect().await
    }

    /// Look up a single version.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the version
    /// does not exist.
    async fn get_version(&self, id: &VersionId) -> Result<PackageVersion>;

    /// List the files of a version, ordered by name.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the version
    /// does not exist.
    async fn list_files(&self, version: &VersionId) -> Result<Vec<PackageFile>>;

    /// Look up a file of a version by its exact name.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if either the
    /// version or the file does not exist.
    async fn get_file_by_name(&self, version: &VersionId, name: &str) -> Result<PackageFile>;

    /// Open a blob for streaming reads.
    ///
    /// Returns a `'static` boxed [`Read`] suitable for use inside
    /// [`spawn_blocking`](tokio::task::spawn_blocking). The async setup
    /// happens before returning. Returns
    /// [`NotFound`](crate::error::ErrorKind::NotFound) if the blob is gone.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::io::Read;
    /// # use keeper_storage::{PackageStore, PackageFile, error::Result};
    /// # async fn example(store: &dyn PackageStore, file: &PackageFile) -> Result<()> {
    /// let mut reader = store.open_blob(&file.blob).await?;
    /// let contents = tokio::task::spawn_blocking(move || {
    ///     let mut buf = Vec::new();
    ///     reader.read_to_end(&mut buf).map(|_| buf)
    /// }).await.unwrap().unwrap();
    /// # Ok(())
    /// # }
    /// ```
    async fn open_blob(&self, blob: &BlobRef) -> Result<BoxSyncRead>;

    /// Delete a file record and its content.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist (anymore).
    async fn delete_file(&self, file: &PackageFile) -> Result<()>;

    /// Store a file in a version, returning the resulting record.
    ///
    /// Returns [`AlreadyExists`](crate::error::ErrorKind::AlreadyExists) when
    /// a file with the same name exists and [`NewFile::overwrite`] is not
    /// set. The write is recorded against [`NewFile::actor`].
    async fn write_file(&self, file: NewFile) -> Result<PackageFile>;
}
