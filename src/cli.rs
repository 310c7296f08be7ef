use clap::{Parser, Subcommand, ValueHint};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(author, version, about, arg_required_else_help = true)]
pub struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Maven repository root; overrides `storage.root`
    #[arg(long, global = true, value_hint = ValueHint::DirPath)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Delete snapshot builds older than the newest N of every version
    Sweep {
        /// Builds to keep per version, -1 to disable; overrides
        /// `maven.retain_snapshot_builds`
        #[arg(long, allow_negative_numbers = true)]
        retain: Option<i64>,

        /// Report what would be removed without removing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Drop metadata entries whose file is gone, for every snapshot version
    Prune {
        #[arg(long)]
        dry_run: bool,
    },

    /// Repair the metadata document of one version
    Reconcile {
        version_id: String,

        #[arg(long)]
        dry_run: bool,
    },

    /// Delete one file, then bring its version's metadata up to date
    Delete { version_id: String, file_name: String },
}
