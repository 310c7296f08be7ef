//! Maven snapshot housekeeping.
//!
//! A snapshot version is re-published under incrementing build numbers and
//! its `maven-metadata.xml` lists every build clients may resolve. The jobs in
//! this crate keep that document in step with the files actually stored:
//!
//! - [`reconcile`] repairs one version's document.
//! - [`sweep`] deletes old builds beyond a retain count, then reconciles.
//! - [`prune_all`] reconciles every snapshot version.
//! - [`on_file_deleted`] reconciles right after a file is removed elsewhere.
//!
//! Batch jobs never stop at the first failing version. Failures are collected
//! into one error tree returned alongside everything that did succeed.

pub mod error;
mod hook;
mod load;
mod prune;
mod reconcile;
mod report;
mod retain;
mod sweep;
#[cfg(test)]
mod testing;

pub use crate::hook::{HookOutcome, SkipReason, on_file_deleted};
pub use crate::prune::{PruneReport, prune_all};
pub use crate::reconcile::{Reconciliation, reconcile};
pub use crate::retain::RetainBuilds;
pub use crate::sweep::{SweepReport, VersionSweep, sweep};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use keeper_storage::{Actor, PackageStore, PackageType, PackageVersion};
use tokio_util::sync::CancellationToken;

/// Per-run settings shared by every job.
#[derive(Debug, Clone)]
pub struct Context {
    /// Compute and report, but neither delete nor write anything.
    pub dry_run: bool,
    /// Identity rewrites of the metadata document are recorded against.
    pub actor: Actor,
    /// Checked between versions; a version in progress always completes.
    pub cancel: CancellationToken,
}

impl Context {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            actor: Actor::System,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Every Maven snapshot version known to the store.
async fn snapshot_versions(store: &dyn PackageStore) -> Result<Vec<PackageVersion>> {
    let versions = store.list_versions(PackageType::Maven).await.or_raise(|| ErrorKind::Storage)?;
    Ok(versions.into_iter().filter(|v| v.is_snapshot()).collect())
}
