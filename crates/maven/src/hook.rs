use crate::Context;
use crate::error::{Result, storage_error};
use crate::reconcile::{Reconciliation, reconcile};
use derive_more::Display;
use keeper_metadata::is_artifact_payload;
use keeper_storage::{PackageFile, PackageStore, PackageType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SkipReason {
    /// Metadata documents, checksums and directory markers are never listed
    /// as entries.
    #[display("not an artifact payload")]
    NotArtifactPayload,
    #[display("not a Maven snapshot version")]
    NotSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    Skipped(SkipReason),
    Reconciled(Reconciliation),
}

/// Reconcile a version right after one of its files was deleted.
///
/// Called by the deletion path after the file is already gone. Any file of a
/// Maven snapshot version that a document can list triggers a
/// reconciliation: everything but the document itself, checksum side-files
/// and directory markers. A failure is logged and handed back for the caller
/// to report; the deletion itself stands either way.
pub async fn on_file_deleted(store: &dyn PackageStore, ctx: &Context, file: &PackageFile) -> Result<HookOutcome> {
    if !is_artifact_payload(&file.name) {
        return Ok(HookOutcome::Skipped(SkipReason::NotArtifactPayload));
    }
    let result: Result<HookOutcome> = async {
        let version = store.get_version(&file.version_id).await.map_err(storage_error)?;
        if version.package_type != PackageType::Maven || !version.is_snapshot() {
            return Ok(HookOutcome::Skipped(SkipReason::NotSnapshot));
        }
        reconcile(store, ctx, &version.id).await.map(HookOutcome::Reconciled)
    }
    .await;
    if let Err(error) = &result {
        tracing::warn!(
            version_id = %file.version_id,
            file = %file.name,
            error = ?error,
            "Failed to reconcile metadata after file deletion"
        );
    }
    result
}
