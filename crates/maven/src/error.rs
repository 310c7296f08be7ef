//! Maintenance Job Error Types
//!
//! Per-version failures are raised into [`ErrorKind::Version`] so the tree
//! names the version that failed; batch jobs collect those under a single
//! [`ErrorKind::Incomplete`] root.

use derive_more::{Display, Error};
use keeper_storage::VersionId;

/// A maintenance job error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for maintenance jobs.
pub type Result<T> = std::result::Result<T, Error>;

/// ### Per-version Errors
/// - [`ErrorKind::NotFound`]
/// - [`ErrorKind::Parse`]
/// - [`ErrorKind::Storage`]
/// - [`ErrorKind::Blocking`]
///
/// ### Run Errors
/// - [`ErrorKind::Configuration`] - the run did no work at all.
/// - [`ErrorKind::Incomplete`] - the run finished, some versions failed.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The metadata document, the version or one of its files is missing.
    #[display("not found")]
    NotFound,
    /// The metadata document could not be read or written as XML.
    #[display("invalid maven-metadata.xml")]
    Parse,
    /// Any other storage operation failed.
    #[display("storage operation failed")]
    Storage,
    #[display("invalid configuration: {_0}")]
    Configuration(#[error(not(source))] String),
    /// Context naming the version a failure belongs to.
    #[display("version {version} ({id})")]
    Version { id: VersionId, version: String },
    #[display("{failed} of {total} versions failed")]
    Incomplete { failed: usize, total: usize },
    /// A blocking parse task panicked or was cancelled.
    #[display("blocking task failed")]
    Blocking,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Blocking | Self::Incomplete { .. })
    }
}

/// Lift a storage error, keeping "does not exist" distinguishable.
pub(crate) fn storage_error(err: keeper_storage::error::Error) -> Error {
    let kind = match err.is_not_found() {
        true => ErrorKind::NotFound,
        false => ErrorKind::Storage,
    };
    err.raise(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_storage::error::ErrorKind as StorageErrorKind;

    #[test]
    fn test_storage_error_kinds() {
        let missing = exn::Exn::from(StorageErrorKind::NotFound("maven-metadata.xml".to_string()));
        assert!(matches!(&*storage_error(missing), ErrorKind::NotFound));
        let broken = exn::Exn::from(StorageErrorKind::BackendError("timeout".to_string()));
        assert!(matches!(&*storage_error(broken), ErrorKind::Storage));
    }

    #[test]
    fn test_display() {
        let kind = ErrorKind::Version {
            id: VersionId::new("42"),
            version: "1.0-SNAPSHOT".to_string(),
        };
        assert_eq!(kind.to_string(), "version 1.0-SNAPSHOT (42)");
        assert_eq!(ErrorKind::Incomplete { failed: 1, total: 3 }.to_string(), "1 of 3 versions failed");
    }
}
