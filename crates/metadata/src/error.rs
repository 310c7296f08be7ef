//! Metadata Error Types

use derive_more::{Display, Error};

/// A metadata error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for metadata operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Document is not well-formed XML or does not have the expected shape
    #[display("malformed maven-metadata.xml")]
    MalformedXml,
    /// A field required to interpret the document is missing or empty
    #[display("missing required field: {_0}")]
    MissingField(#[error(not(source))] &'static str),
    /// Snapshot value does not end in a decimal build number
    #[display("invalid build number in `{_0}`")]
    InvalidBuildNumber(#[error(not(source))] String),
    /// Document could not be written out
    #[display("failed to serialize maven-metadata.xml")]
    Serialize,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Nothing in this crate touches I/O; the same bytes fail the same way.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
