//! Package file catalog and blob storage.
//!
//! This crate is the storage collaborator used by the maintenance jobs: it
//! lists package versions and their files, opens blobs, deletes files and
//! (over)writes them on behalf of an explicit [`Actor`].

pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::PackageStore;
pub use crate::models::{
    Actor, BlobRef, CompositeKey, FileId, NewFile, PackageFile, PackageType, PackageVersion, VersionId,
};
pub use crate::path::validate as validate_path;
