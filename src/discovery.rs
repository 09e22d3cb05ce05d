use crate::{
    config::{RelPath, RunConfig},
    error::{Error, Result},
    manifest::{self, ModManifest, MANIFEST_FILE},
    payload::Payload,
};
use std::{
    collections::{BTreeMap, HashSet},
    fs,
};
use tracing::{info, warn};

/// Outcome of the mods-directory scan. `skipped` counts entries whose
/// manifest failed to load; those mods contribute no payloads or assets.
pub struct DiscoveredMods {
    pub mods: Vec<ModManifest>,
    pub skipped: usize,
}

/// Walk the mods directory in name order so discovery order (and with it
/// the priority tie-break) is deterministic across platforms.
pub fn discover(config: &RunConfig) -> Result<DiscoveredMods> {
    let mut mod_ids = Vec::new();
    let entries = fs::read_dir(&config.mods_dir)
        .map_err(Error::io(format!("read mods dir {:?}", config.mods_dir)))?;
    for entry in entries {
        let entry = entry.map_err(Error::io(format!("read mods dir {:?}", config.mods_dir)))?;
        if !entry.path().is_dir() {
            continue;
        }
        if !entry.path().join(MANIFEST_FILE).is_file() {
            continue;
        }
        mod_ids.push(entry.file_name().to_string_lossy().to_string());
    }
    mod_ids.sort();

    let mut mods = Vec::with_capacity(mod_ids.len());
    let mut skipped = 0;
    for mod_id in &mod_ids {
        match manifest::load(&config.mods_dir, mod_id) {
            Ok(manifest) => {
                info!(mod_id = %manifest.id, payloads = manifest.payloads.len(), "loaded mod");
                mods.push(manifest);
            }
            Err(err) => {
                warn!(mod_id = %mod_id, error = %err, "skipping mod, manifest failed to load");
                skipped += 1;
            }
        }
    }
    Ok(DiscoveredMods { mods, skipped })
}

/// Group payloads by each base file they target; a multi-target payload
/// joins every group. Within a group, order is discovery order (mod scan
/// order, then declaration order inside the manifest).
pub fn group_payloads(mods: &[ModManifest]) -> BTreeMap<RelPath, Vec<Payload>> {
    let mut groups: BTreeMap<RelPath, Vec<Payload>> = BTreeMap::new();
    for manifest in mods {
        for payload in &manifest.payloads {
            for target in &payload.targets {
                groups.entry(target.clone()).or_default().push(payload.clone());
            }
        }
    }
    groups
}

/// Mirror every mod asset (declared assets plus payload sources) into the
/// deploy directory at its path relative to the mods root. Plain copy, no
/// caching semantics; each distinct file is copied once per run.
pub fn deploy_assets(config: &RunConfig, mods: &[ModManifest]) -> Result<usize> {
    let mut seen = HashSet::new();
    let mut copied = 0;
    for manifest in mods {
        let sources = manifest
            .payloads
            .iter()
            .flat_map(|payload| payload.sources.iter());
        for asset in manifest.assets.iter().chain(sources) {
            if !seen.insert(asset.clone()) {
                continue;
            }
            let source = asset.join_under(&config.mods_dir);
            let dest = asset.join_under(&config.deploy_dir);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(Error::io(format!("create {parent:?}")))?;
            }
            fs::copy(&source, &dest)
                .map_err(Error::io(format!("deploy {source:?} to {dest:?}")))?;
            copied += 1;
        }
    }
    Ok(copied)
}
