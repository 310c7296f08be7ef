//! Maven snapshot metadata.
//!
//! The `maven-metadata.xml` stored in every snapshot version lists each
//! deployed file of each build and the highest build number. This crate
//! parses and writes that document and knows how its entries map onto stored
//! file names. It does no I/O of its own.

mod build;
mod document;
pub mod error;
mod names;

pub use crate::build::{BuildNumber, base_version, timestamp_of};
pub use crate::document::{FileBuild, Snapshot, SnapshotMetadata, SnapshotVersion, Versioning, XML_DECLARATION};
pub use crate::names::{
    CHECKSUM_EXTENSIONS, METADATA_FILE_NAME, SNAPSHOT_SUFFIX, checksum_companions, is_artifact_payload,
    is_checksum_file, is_metadata_file, is_snapshot_version,
};
