use crate::{
    config::{RelPath, RelPathError},
    payload::{EditOp, Payload},
};
use serde::Deserialize;
use std::{io, path::PathBuf};
use thiserror::Error;

pub const MANIFEST_FILE: &str = "modfile.json";

const DEFAULT_PRIORITY: i64 = 100;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path:?}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: RelPathError,
    },
}

/// A mod's declared content: payloads to apply and assets to mirror into
/// the deploy directory. All paths are stored relative to the mods root
/// (`<mod-id>/<mod-relative-path>`).
#[derive(Debug, Clone)]
pub struct ModManifest {
    pub id: String,
    pub name: String,
    pub payloads: Vec<Payload>,
    pub assets: Vec<RelPath>,
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    payloads: Vec<PayloadDecl>,
    #[serde(default)]
    assets: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PayloadDecl {
    #[serde(default = "default_priority")]
    priority: i64,
    op: EditOp,
    sources: Vec<String>,
    targets: Vec<String>,
}

fn default_priority() -> i64 {
    DEFAULT_PRIORITY
}

/// Load `mods/<mod_id>/modfile.json`. Declared sources and assets are
/// mod-relative and come back prefixed with the mod id; targets are
/// scope-relative and validated as such.
pub fn load(mods_dir: &std::path::Path, mod_id: &str) -> Result<ModManifest, ManifestError> {
    let path = mods_dir.join(mod_id).join(MANIFEST_FILE);
    let raw = std::fs::read_to_string(&path).map_err(|source| ManifestError::Read {
        path: path.clone(),
        source,
    })?;
    let parsed: ManifestFile =
        serde_json::from_str(&raw).map_err(|source| ManifestError::Parse {
            path: path.clone(),
            source,
        })?;

    let rel = |raw: &str| {
        RelPath::new(raw).map_err(|source| ManifestError::Invalid {
            path: path.clone(),
            source,
        })
    };

    let mut payloads = Vec::with_capacity(parsed.payloads.len());
    for decl in &parsed.payloads {
        let sources = decl
            .sources
            .iter()
            .map(|s| Ok(rel(s)?.prefixed(mod_id)))
            .collect::<Result<Vec<_>, ManifestError>>()?;
        let targets = decl
            .targets
            .iter()
            .map(|t| rel(t))
            .collect::<Result<Vec<_>, ManifestError>>()?;
        payloads.push(Payload {
            mod_id: mod_id.to_string(),
            priority: decl.priority,
            op: decl.op,
            sources,
            targets,
        });
    }

    let assets = parsed
        .assets
        .iter()
        .map(|a| Ok(rel(a)?.prefixed(mod_id)))
        .collect::<Result<Vec<_>, ManifestError>>()?;

    Ok(ModManifest {
        id: mod_id.to_string(),
        name: parsed.name.unwrap_or_else(|| mod_id.to_string()),
        payloads,
        assets,
    })
}
