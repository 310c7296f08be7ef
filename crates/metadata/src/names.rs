//! File naming conventions inside a Maven snapshot version.

/// Name of the per-version snapshot metadata document.
pub const METADATA_FILE_NAME: &str = "maven-metadata.xml";

/// Suffix marking a snapshot version string.
pub const SNAPSHOT_SUFFIX: &str = "-SNAPSHOT";

/// Extensions of checksum side-files stored next to every deployed file.
pub const CHECKSUM_EXTENSIONS: [&str; 4] = ["md5", "sha1", "sha256", "sha512"];

/// Whether a version string names a snapshot (`*-SNAPSHOT`, case-sensitive).
pub fn is_snapshot_version(version: &str) -> bool {
    version.ends_with(SNAPSHOT_SUFFIX)
}

pub fn is_checksum_file(name: &str) -> bool {
    extension_of(name).is_some_and(|ext| CHECKSUM_EXTENSIONS.contains(&ext))
}

/// The metadata document itself or one of its checksums.
pub fn is_metadata_file(name: &str) -> bool {
    match name.strip_prefix(METADATA_FILE_NAME) {
        Some("") => true,
        Some(rest) => rest.strip_prefix('.').is_some_and(|ext| CHECKSUM_EXTENSIONS.contains(&ext)),
        None => false,
    }
}

/// Whether removing this file can leave an orphaned metadata entry.
///
/// Everything except the metadata document, checksum side-files and
/// directory markers may be listed, whatever its extension.
///
/// ```
/// use keeper_metadata::is_artifact_payload;
///
/// assert!(is_artifact_payload("app-1.0-20240101.120000-1.jar"));
/// assert!(is_artifact_payload("app-1.0-20240101.120000-1.module"));
/// assert!(!is_artifact_payload("app-1.0-20240101.120000-1.jar.sha1"));
/// assert!(!is_artifact_payload("maven-metadata.xml"));
/// ```
pub fn is_artifact_payload(name: &str) -> bool {
    !name.is_empty() && !name.ends_with('/') && !is_metadata_file(name) && !is_checksum_file(name)
}

/// Names of the checksum side-files that may accompany `name`.
pub fn checksum_companions(name: &str) -> impl Iterator<Item = String> + '_ {
    CHECKSUM_EXTENSIONS.iter().map(move |ext| format!("{name}.{ext}"))
}

fn extension_of(name: &str) -> Option<&str> {
    name.rsplit_once('.').map(|(_, ext)| ext)
}
