use crate::config::{RelPath, RunConfig};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("deployed source {0:?} is missing")]
    MissingSource(PathBuf),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl ApplyError {
    fn io(context: impl Into<String>) -> impl FnOnce(io::Error) -> ApplyError {
        let context = context.into();
        move |source| ApplyError::Io { context, source }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EditOp {
    /// Append each deployed source's bytes to the base file.
    Append,
    /// Replace the base file with the deployed sources, concatenated.
    Replace,
    /// Append one `Import "…"` line per source, pointing at the deployed
    /// copy relative to the scope root.
    LuaImport,
}

/// One declared edit unit. Owned by the mod that declared it; the per-base
/// ordered application lists hold clones.
#[derive(Debug, Clone)]
pub struct Payload {
    pub mod_id: String,
    pub priority: i64,
    pub op: EditOp,
    /// Deployed files feeding the edit, relative to the mods root.
    pub sources: Vec<RelPath>,
    /// Base files this payload edits, relative to the scope root.
    pub targets: Vec<RelPath>,
}

impl Payload {
    /// Human-readable source list for run reporting.
    pub fn source_descriptions(&self) -> Vec<String> {
        self.sources.iter().map(RelPath::to_unix).collect()
    }

    /// Edit the live base file in place. Sources are resolved against the
    /// deploy directory, which the run populates before any edit.
    pub fn apply(&self, live: &Path, config: &RunConfig) -> Result<(), ApplyError> {
        match self.op {
            EditOp::Append => {
                let mut file = OpenOptions::new()
                    .append(true)
                    .open(live)
                    .map_err(ApplyError::io(format!("open {live:?} for append")))?;
                for source in &self.sources {
                    let bytes = self.read_source(source, config)?;
                    file.write_all(&bytes)
                        .map_err(ApplyError::io(format!("append to {live:?}")))?;
                }
                Ok(())
            }
            EditOp::Replace => {
                let mut content = Vec::new();
                for source in &self.sources {
                    content.extend(self.read_source(source, config)?);
                }
                fs::write(live, content).map_err(ApplyError::io(format!("replace {live:?}")))
            }
            EditOp::LuaImport => {
                let mut file = OpenOptions::new()
                    .append(true)
                    .open(live)
                    .map_err(ApplyError::io(format!("open {live:?} for import lines")))?;
                for source in &self.sources {
                    let line = format!("Import \"{}\"\n", self.scope_relative(source, config));
                    file.write_all(line.as_bytes())
                        .map_err(ApplyError::io(format!("append import to {live:?}")))?;
                }
                Ok(())
            }
        }
    }

    fn read_source(&self, source: &RelPath, config: &RunConfig) -> Result<Vec<u8>, ApplyError> {
        let path = source.join_under(&config.deploy_dir);
        if !path.is_file() {
            return Err(ApplyError::MissingSource(path));
        }
        fs::read(&path).map_err(ApplyError::io(format!("read {path:?}")))
    }

    /// Path the game sees for a deployed source, relative to the scope root.
    fn scope_relative(&self, source: &RelPath, config: &RunConfig) -> String {
        let deployed = source.join_under(&config.deploy_dir);
        match deployed.strip_prefix(&config.scope_dir) {
            Ok(rel) => RelPath::from_trusted(rel).to_unix(),
            Err(_) => source.to_unix(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;

    fn fixture() -> (tempfile::TempDir, RunConfig) {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig::for_scope(dir.path());
        fs::create_dir_all(&config.deploy_dir).unwrap();
        (dir, config)
    }

    fn payload(op: EditOp, sources: &[&str], targets: &[&str]) -> Payload {
        Payload {
            mod_id: "m".to_string(),
            priority: 100,
            op,
            sources: sources.iter().map(|s| RelPath::new(s).unwrap()).collect(),
            targets: targets.iter().map(|t| RelPath::new(t).unwrap()).collect(),
        }
    }

    #[test]
    fn append_concatenates_sources_in_order() {
        let (_dir, config) = fixture();
        let live = config.scope_dir.join("a.txt");
        fs::write(&live, "X").unwrap();
        fs::create_dir_all(config.deploy_dir.join("m")).unwrap();
        fs::write(config.deploy_dir.join("m/one.txt"), "Y").unwrap();
        fs::write(config.deploy_dir.join("m/two.txt"), "Z").unwrap();

        payload(EditOp::Append, &["m/one.txt", "m/two.txt"], &["a.txt"])
            .apply(&live, &config)
            .unwrap();
        assert_eq!(fs::read_to_string(&live).unwrap(), "XYZ");
    }

    #[test]
    fn replace_overwrites_base_content() {
        let (_dir, config) = fixture();
        let live = config.scope_dir.join("a.txt");
        fs::write(&live, "original").unwrap();
        fs::create_dir_all(config.deploy_dir.join("m")).unwrap();
        fs::write(config.deploy_dir.join("m/new.txt"), "new").unwrap();

        payload(EditOp::Replace, &["m/new.txt"], &["a.txt"])
            .apply(&live, &config)
            .unwrap();
        assert_eq!(fs::read_to_string(&live).unwrap(), "new");
    }

    #[test]
    fn lua_import_appends_scope_relative_line() {
        let (_dir, config) = fixture();
        let live = config.scope_dir.join("Main.lua");
        fs::write(&live, "-- base\n").unwrap();
        fs::create_dir_all(config.deploy_dir.join("m")).unwrap();
        fs::write(config.deploy_dir.join("m/extra.lua"), "").unwrap();

        payload(EditOp::LuaImport, &["m/extra.lua"], &["Main.lua"])
            .apply(&live, &config)
            .unwrap();
        assert_eq!(
            fs::read_to_string(&live).unwrap(),
            "-- base\nImport \"Deploy/m/extra.lua\"\n"
        );
    }

    #[test]
    fn missing_source_is_reported() {
        let (_dir, config) = fixture();
        let live = config.scope_dir.join("a.txt");
        fs::write(&live, "X").unwrap();

        let err = payload(EditOp::Append, &["m/gone.txt"], &["a.txt"])
            .apply(&live, &config)
            .unwrap_err();
        assert!(matches!(err, ApplyError::MissingSource(_)));
    }
}
