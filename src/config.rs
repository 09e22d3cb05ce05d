use crate::error::{Error, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{
    fmt, fs,
    path::{Component, Path, PathBuf},
};
use thiserror::Error;

pub const CONFIG_FILE: &str = "config.json";
pub const DATA_DIR_NAME: &str = ".modweave";

/// All paths and switches for one run, passed by reference into every
/// component. Nothing in the crate reads ambient/static configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub scope_dir: PathBuf,
    pub mods_dir: PathBuf,
    pub deploy_dir: PathBuf,
    pub base_cache_dir: PathBuf,
    pub edit_cache_dir: PathBuf,
    pub logs_dir: PathBuf,
    #[serde(default = "default_edited_suffix")]
    pub edited_suffix: String,
    #[serde(default = "default_true")]
    pub echo: bool,
    #[serde(default = "default_true")]
    pub log: bool,
}

impl RunConfig {
    pub fn for_scope(scope_dir: &Path) -> Self {
        let data_dir = scope_dir.join(DATA_DIR_NAME);
        RunConfig {
            scope_dir: scope_dir.to_path_buf(),
            mods_dir: scope_dir.join("Mods"),
            deploy_dir: scope_dir.join("Deploy"),
            base_cache_dir: data_dir.join("cache").join("base"),
            edit_cache_dir: data_dir.join("cache").join("edit"),
            logs_dir: data_dir.join("logs"),
            edited_suffix: default_edited_suffix(),
            echo: true,
            log: true,
        }
    }

    pub fn load_or_create(scope_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = scope_dir.join(DATA_DIR_NAME);
        fs::create_dir_all(&data_dir).context("create data dir")?;

        let config_path = data_dir.join(CONFIG_FILE);
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path).context("read config")?;
            let mut config: RunConfig = serde_json::from_str(&raw).context("parse config")?;
            config.scope_dir = scope_dir.to_path_buf();
            return Ok(config);
        }

        let config = RunConfig::for_scope(scope_dir);
        config.save()?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = self.scope_dir.join(DATA_DIR_NAME).join(CONFIG_FILE);
        let raw = serde_json::to_string_pretty(self).context("serialize config")?;
        fs::write(config_path, raw).context("write config")?;
        Ok(())
    }

    /// Scope invariants checked before any run state is entered.
    pub fn validate(&self) -> Result<()> {
        if !self.scope_dir.is_dir() {
            return Err(Error::Scope(format!(
                "scope directory {:?} does not exist",
                self.scope_dir
            )));
        }
        if !self.deploy_dir.starts_with(&self.scope_dir) {
            return Err(Error::Scope(format!(
                "deploy directory {:?} is not inside the scope {:?}",
                self.deploy_dir, self.scope_dir
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
#[error("invalid relative path {0:?}")]
pub struct RelPathError(pub String);

/// A path validated to stay inside the directory it is resolved against:
/// purely relative, no parent components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelPath(PathBuf);

impl RelPath {
    pub fn new(raw: &str) -> std::result::Result<Self, RelPathError> {
        let path = PathBuf::from(raw);
        if raw.is_empty()
            || !path
                .components()
                .all(|component| matches!(component, Component::Normal(_)))
        {
            return Err(RelPathError(raw.to_string()));
        }
        Ok(RelPath(path))
    }

    /// For paths recovered from a cache tree this crate built itself;
    /// every entry there originated from a validated `RelPath`.
    pub(crate) fn from_trusted(path: &Path) -> Self {
        RelPath(path.to_path_buf())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn join_under(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }

    /// File name used in the edit cache: the relative path with the
    /// edited suffix appended to the final component.
    pub fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = self.0.clone().into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Forward-slash rendering, independent of the host separator.
    pub fn to_unix(&self) -> String {
        self.0
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// `prefix/self`, e.g. to place a mod-relative path under the mod's id.
    pub fn prefixed(&self, prefix: &str) -> Self {
        RelPath(PathBuf::from(prefix).join(&self.0))
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_unix())
    }
}

impl TryFrom<String> for RelPath {
    type Error = RelPathError;

    fn try_from(raw: String) -> std::result::Result<Self, RelPathError> {
        RelPath::new(&raw)
    }
}

impl From<RelPath> for String {
    fn from(path: RelPath) -> String {
        path.to_unix()
    }
}

fn default_edited_suffix() -> String {
    ".hash".to_string()
}

fn default_true() -> bool {
    true
}
