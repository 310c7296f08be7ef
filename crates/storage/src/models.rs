//! Catalog models.
//!
//! These types describe what the catalog knows about package versions and
//! their files. Identifiers are opaque to callers; each backend decides what
//! they look like.

use derive_more::Display;
use time::OffsetDateTime;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
        pub struct $name(String);
        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// Identifies a package version in the catalog.
    VersionId
);
string_id!(
    /// Identifies a single file record in the catalog.
    FileId
);
string_id!(
    /// Reference to the stored content behind a file record.
    BlobRef
);
string_id!(
    /// Secondary key a file is stored under; empty for most files.
    CompositeKey
);

/// Package ecosystems known to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum PackageType {
    #[display("maven")]
    Maven,
    #[display("npm")]
    Npm,
    #[display("generic")]
    Generic,
}

/// A published version of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageVersion {
    pub id: VersionId,
    pub package_type: PackageType,
    /// Package name (for Maven, the artifact id)
    pub name: String,
    /// Version string exactly as published
    pub version: String,
}
impl PackageVersion {
    pub fn new(
        id: impl Into<VersionId>,
        package_type: PackageType,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            package_type,
            name: name.into(),
            version: version.into(),
        }
    }

    /// Snapshot versions are re-published under incrementing build numbers.
    pub fn is_snapshot(&self) -> bool {
        keeper_metadata::is_snapshot_version(&self.version)
    }
}

/// A file belonging to a package version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile {
    pub id: FileId,
    pub version_id: VersionId,
    pub name: String,
    pub blob: BlobRef,
    pub composite_key: CompositeKey,
    /// Size of the blob in bytes
    pub size: u64,
    pub created: OffsetDateTime,
}

/// Who a write is recorded against.
///
/// Maintenance jobs rewrite files on nobody's behalf; they must say so
/// explicitly with [`Actor::System`] rather than relying on a default.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
pub enum Actor {
    #[display("system")]
    System,
    #[display("{_0}")]
    User(String),
}

/// Everything needed to store a file in a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub version_id: VersionId,
    pub name: String,
    pub composite_key: CompositeKey,
    pub content: Vec<u8>,
    /// Replace an existing file with the same name instead of failing
    pub overwrite: bool,
    pub actor: Actor,
}
impl NewFile {
    /// Replacement content for an existing file, keeping its name and
    /// composite key.
    pub fn replacing(file: &PackageFile, content: impl Into<Vec<u8>>, actor: Actor) -> Self {
        Self {
            version_id: file.version_id.clone(),
            name: file.name.clone(),
            composite_key: file.composite_key.clone(),
            content: content.into(),
            overwrite: true,
            actor,
        }
    }
}
