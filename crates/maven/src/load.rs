//! Reading and writing the metadata document through storage.

use crate::Context;
use crate::error::{ErrorKind, Result, storage_error};
use exn::ResultExt;
use keeper_metadata::{METADATA_FILE_NAME, SnapshotMetadata};
use keeper_storage::{NewFile, PackageFile, PackageStore, VersionId};
use std::io::BufReader;

/// A parsed metadata document and the file it was read from.
pub(crate) struct Loaded {
    pub file: PackageFile,
    pub document: SnapshotMetadata,
}

pub(crate) async fn load_metadata(store: &dyn PackageStore, version: &VersionId) -> Result<Loaded> {
    let file = store.get_file_by_name(version, METADATA_FILE_NAME).await.map_err(storage_error)?;
    let reader = store.open_blob(&file.blob).await.map_err(storage_error)?;
    let document = tokio::task::spawn_blocking(move || SnapshotMetadata::from_reader(BufReader::new(reader)))
        .await
        .or_raise(|| ErrorKind::Blocking)?
        .or_raise(|| ErrorKind::Parse)?;
    Ok(Loaded { file, document })
}

/// Replace the stored document, keeping the file's name and composite key.
pub(crate) async fn store_metadata(
    store: &dyn PackageStore,
    ctx: &Context,
    file: &PackageFile,
    document: &SnapshotMetadata,
) -> Result<PackageFile> {
    let xml = document.to_xml().or_raise(|| ErrorKind::Parse)?;
    let new = NewFile::replacing(file, xml.into_bytes(), ctx.actor.clone());
    store.write_file(new).await.map_err(storage_error)
}
