//! Layered configuration.
//!
//! Sources, later ones overriding earlier ones:
//!
//! 1. Built-in defaults.
//! 2. A configuration file: TOML, YAML or JSON by extension. Either given
//!    explicitly or `keeper.toml` in the platform config directory, if present.
//! 3. Environment variables prefixed `KEEPER_`, with `__` between sections:
//!    `KEEPER_MAVEN__RETAIN_SNAPSHOT_BUILDS=5`.
//!
//! Values are only checked for shape here. The retain count in particular is
//! interpreted by the sweep itself.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "KEEPER_";
const FILE_NAME: &str = "keeper.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub maven: MavenConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Absolute path of the Maven repository on disk.
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MavenConfig {
    /// Newest builds kept per snapshot version; `-1` disables the sweep.
    pub retain_snapshot_builds: i64,
    pub cleanup_dry_run: bool,
    pub prune_dry_run: bool,
}
impl Default for MavenConfig {
    fn default() -> Self {
        Self {
            retain_snapshot_builds: -1,
            cleanup_dry_run: false,
            prune_dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub format: LogFormat,
}
impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Config {
    /// Load configuration from every source.
    ///
    /// An explicit `path` must exist; the default location is skipped when
    /// there is no file there.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) if !path.is_file() => {
                exn::bail!(ErrorKind::Invalid(format!("config file `{}` does not exist", path.display())))
            },
            Some(path) => Some(path.to_path_buf()),
            None => default_path().filter(|p| p.is_file()),
        };
        match &file {
            Some(file) => tracing::debug!(file = %file.display(), "Loading configuration file"),
            None => tracing::debug!("No configuration file; using defaults and environment"),
        }
        Self::from_figment(Self::figment(file.as_deref()))
    }

    fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            figment = match file.extension().and_then(|e| e.to_str()) {
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(file)),
                Some("json") => figment.merge(Json::file_exact(file)),
                _ => figment.merge(Toml::file_exact(file)),
            };
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if let Some(root) = &self.storage.root
            && !root.is_absolute()
        {
            exn::bail!(ErrorKind::Invalid(format!("storage.root `{}` must be an absolute path", root.display())));
        }
        if self.log.level.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("log.level must not be empty".to_string()));
        }
        Ok(())
    }
}

/// `keeper.toml` in the platform configuration directory.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "keeper").map(|dirs| dirs.config_dir().join(FILE_NAME))
}
