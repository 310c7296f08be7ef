//! Path validation for filesystem-backed stores.
//!
//! Version identifiers, blob references and file names all end up joined onto
//! a repository root. Nothing a caller hands us may escape that root.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a repository-relative path and returns its normalized form.
///
/// > **Note:** This does **not** normalize backslashes, non-UTF8 bytes, or
/// >           platform-specific weirdness. Null bytes are explicitly rejected.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use keeper_storage::validate_path;
/// assert!(validate_path("com/example/app/1.0-SNAPSHOT").is_ok());
/// assert!(validate_path("com/../example").is_ok()); // (never leaves repository root)
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert_eq!(
///     validate_path("com//example/./app/").unwrap(),
///     Path::new("com/example/app")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

/// Validates a bare file name: exactly one normal path component.
pub(crate) fn validate_file_name(name: &str) -> Result<&str> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(s)), None) if !s.as_encoded_bytes().contains(&0) => Ok(name),
        _ => exn::bail!(ErrorKind::InvalidPath(PathBuf::from(name))),
    }
}
