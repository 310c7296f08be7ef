use crate::cli::{Args, Command};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use keeper_config::Config;
use keeper_maven::{Context, HookOutcome, RetainBuilds, on_file_deleted, prune_all, reconcile, sweep};
use keeper_storage::backend::LocalStore;
use keeper_storage::{PackageStore, VersionId};
use std::path::Path;
use tokio_util::sync::CancellationToken;

const STORE_NAME: &str = "maven";

/// How a command that ran to completion went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    /// At least one version failed; the others were processed.
    Incomplete,
    /// Stopped early on request.
    Cancelled,
}

impl Outcome {
    fn of(error: Option<&keeper_maven::error::Error>, cancelled: bool) -> Self {
        match (error, cancelled) {
            (Some(error), _) => {
                tracing::error!(error = ?error, "Finished with failures");
                Self::Incomplete
            },
            (None, true) => Self::Cancelled,
            (None, false) => Self::Complete,
        }
    }
}

fn open_store(root: Option<&Path>, config: &Config) -> Result<LocalStore> {
    let Some(root) = root.or(config.storage.root.as_deref()) else {
        exn::bail!(ErrorKind::NoRoot);
    };
    let root = std::path::absolute(root).or_raise(|| ErrorKind::Storage)?;
    LocalStore::new(STORE_NAME, &root).or_raise(|| ErrorKind::Storage)
}

fn verb(dry_run: bool) -> &'static str {
    match dry_run {
        true => "would remove",
        false => "removed",
    }
}

pub async fn run(args: Args, config: &Config, cancel: CancellationToken) -> Result<Outcome> {
    let store = open_store(args.root.as_deref(), config)?;
    match args.command {
        Command::Sweep { retain, dry_run } => {
            let retain = retain.unwrap_or(config.maven.retain_snapshot_builds);
            let retain = RetainBuilds::try_from(retain).or_raise(|| ErrorKind::Config)?;
            let ctx = Context::new(dry_run || config.maven.cleanup_dry_run).with_cancel(cancel);
            let report = sweep(&store, &ctx, retain).await.or_raise(|| ErrorKind::Job("sweep"))?;
            if report.disabled {
                println!("snapshot retention is disabled");
            }
            for version in &report.versions {
                for name in version.removed.iter().chain(&version.companions) {
                    println!("{} {}/{name}", verb(ctx.dry_run), version.version_id);
                }
                for name in &version.skipped {
                    println!("skipped {}/{name}: no build number", version.version_id);
                }
            }
            Ok(Outcome::of(report.error.as_ref(), report.cancelled))
        },
        Command::Prune { dry_run } => {
            let ctx = Context::new(dry_run || config.maven.prune_dry_run).with_cancel(cancel);
            let report = prune_all(&store, &ctx).await.or_raise(|| ErrorKind::Job("prune"))?;
            for (version_id, reconciliation) in report.reconciliations.iter().filter(|(_, r)| r.changed) {
                for entry in &reconciliation.dropped {
                    println!("{} {version_id}: {} {}", verb(ctx.dry_run), entry.ending(), entry.value);
                }
            }
            Ok(Outcome::of(report.error.as_ref(), report.cancelled))
        },
        Command::Reconcile { version_id, dry_run } => {
            let ctx = Context::new(dry_run || config.maven.prune_dry_run).with_cancel(cancel);
            let version_id = VersionId::new(version_id);
            let reconciliation = reconcile(&store, &ctx, &version_id).await.or_raise(|| ErrorKind::Job("reconcile"))?;
            for entry in &reconciliation.dropped {
                println!("{} {version_id}: {} {}", verb(ctx.dry_run), entry.ending(), entry.value);
            }
            println!("{version_id}: build {} with {} entries", reconciliation.build_number, reconciliation.kept);
            Ok(Outcome::Complete)
        },
        Command::Delete { version_id, file_name } => {
            let version_id = VersionId::new(version_id);
            let file = store.get_file_by_name(&version_id, &file_name).await.or_raise(|| ErrorKind::Storage)?;
            store.delete_file(&file).await.or_raise(|| ErrorKind::Storage)?;
            println!("deleted {version_id}/{file_name}");
            let ctx = Context::new(config.maven.prune_dry_run).with_cancel(cancel);
            // The file is gone either way; a failed follow-up is reported, not raised.
            match on_file_deleted(&store, &ctx, &file).await {
                Ok(HookOutcome::Reconciled(r)) if r.changed => {
                    println!("{version_id}: dropped {} metadata entries", r.dropped.len());
                    Ok(Outcome::Complete)
                },
                Ok(_) => Ok(Outcome::Complete),
                Err(_) => Ok(Outcome::Incomplete),
            }
        },
    }
}
