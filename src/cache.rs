use crate::{
    config::{RelPath, RunConfig},
    error::{Error, Result},
    hashing,
};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Two-tier cache over the scope's file layout: pristine pre-edit copies
/// under the base cache, content fingerprints under the edit cache. An
/// edit-cache fingerprint exists iff the matching base-cache snapshot does;
/// the apply engine never produces one without the other.
pub struct CacheStore<'a> {
    config: &'a RunConfig,
}

impl<'a> CacheStore<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        CacheStore { config }
    }

    fn live_path(&self, base: &RelPath) -> PathBuf {
        base.join_under(&self.config.scope_dir)
    }

    fn snapshot_path(&self, base: &RelPath) -> PathBuf {
        base.join_under(&self.config.base_cache_dir)
    }

    fn fingerprint_path(&self, base: &RelPath) -> PathBuf {
        self.config
            .edit_cache_dir
            .join(base.with_suffix(&self.config.edited_suffix))
    }

    /// Copy the live file into the base cache. Must run before the first
    /// edit to a base file in a run.
    pub fn snapshot(&self, base: &RelPath) -> Result<()> {
        let live = self.live_path(base);
        let snapshot = self.snapshot_path(base);
        if let Some(parent) = snapshot.parent() {
            fs::create_dir_all(parent).map_err(Error::io(format!("create {parent:?}")))?;
        }
        fs::copy(&live, &snapshot)
            .map_err(Error::io(format!("snapshot {live:?} into base cache")))?;
        Ok(())
    }

    /// Record the live file's current content hash in the edit cache.
    /// Called once editing of the base file has fully completed.
    pub fn fingerprint(&self, base: &RelPath) -> Result<()> {
        let live = self.live_path(base);
        let dest = self.fingerprint_path(base);
        hashing::write_fingerprint(&live, &dest)
            .map_err(Error::io(format!("fingerprint {live:?}")))?;
        Ok(())
    }

    /// True iff the live file still hashes to the stored fingerprint. This
    /// is the only signal that overwriting the live file with its pristine
    /// snapshot is safe.
    pub fn is_still_ours(&self, base: &RelPath) -> Result<bool> {
        let stored = self.fingerprint_path(base);
        if !stored.is_file() {
            return Ok(false);
        }
        let live = self.live_path(base);
        if !live.is_file() {
            return Ok(false);
        }
        let recorded = hashing::read_fingerprint(&stored)
            .map_err(Error::io(format!("read fingerprint {stored:?}")))?;
        let current =
            hashing::hash_file(&live).map_err(Error::io(format!("hash {live:?}")))?;
        Ok(recorded == current)
    }

    /// Put the pristine snapshot back iff the live file still looks like
    /// our output; a foreign live file is left alone. Both cache entries
    /// are removed either way.
    pub fn restore(&self, base: &RelPath) -> Result<bool> {
        let live = self.live_path(base);
        let snapshot = self.snapshot_path(base);

        let mut restored = false;
        if live.is_file() && self.is_still_ours(base)? {
            fs::copy(&snapshot, &live)
                .map_err(Error::io(format!("restore {live:?} from base cache")))?;
            restored = true;
        } else if live.is_file() {
            warn!(base = %base, "live file no longer matches our fingerprint, leaving it alone");
        } else {
            debug!(base = %base, "scope file vanished, pruning orphaned cache entry");
        }

        remove_file_if_present(&snapshot)?;
        remove_file_if_present(&self.fingerprint_path(base))?;
        Ok(restored)
    }

    /// Undo the previous run: restore every cached base file, then prune
    /// the directory skeletons both caches leave behind.
    pub fn restore_all(&self) -> Result<usize> {
        let root = self.config.base_cache_dir.clone();
        if !root.is_dir() {
            return Ok(0);
        }
        let mut restored = 0;
        self.restore_dir(&root, &mut restored)?;
        if self.config.edit_cache_dir.is_dir() {
            prune_empty_dirs(&self.config.edit_cache_dir)
                .map_err(Error::io("prune edit cache".to_string()))?;
        }
        Ok(restored)
    }

    // Post-order walk; returns whether `dir` ended up empty so the parent
    // can remove it.
    fn restore_dir(&self, dir: &Path, restored: &mut usize) -> Result<bool> {
        let mut empty = true;
        let entries = fs::read_dir(dir).map_err(Error::io(format!("read {dir:?}")))?;
        for entry in entries {
            let entry = entry.map_err(Error::io(format!("read {dir:?}")))?;
            let path = entry.path();
            if path.is_dir() {
                if self.restore_dir(&path, restored)? {
                    fs::remove_dir(&path).map_err(Error::io(format!("remove {path:?}")))?;
                } else {
                    empty = false;
                }
            } else {
                let rel = path
                    .strip_prefix(&self.config.base_cache_dir)
                    .expect("base cache walk stays under its root");
                if self.restore(&RelPath::from_trusted(rel))? {
                    *restored += 1;
                }
            }
        }
        Ok(empty)
    }

    /// Wipe both cache trees and recreate the standard skeleton. The caches
    /// are private, regenerable state; removing them is always safe here
    /// because `restore_all` already ran.
    pub fn reset(&self) -> Result<()> {
        remove_tree(&self.config.base_cache_dir)?;
        remove_tree(&self.config.edit_cache_dir)?;
        for dir in [
            &self.config.mods_dir,
            &self.config.deploy_dir,
            &self.config.base_cache_dir,
            &self.config.edit_cache_dir,
        ] {
            fs::create_dir_all(dir).map_err(Error::io(format!("create {dir:?}")))?;
        }
        Ok(())
    }
}

/// Post-order prune; returns whether `root` itself is now empty. `root` is
/// never removed, only its emptied children.
pub fn prune_empty_dirs(root: &Path) -> io::Result<bool> {
    let mut empty = true;
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() {
            if prune_empty_dirs(&path)? {
                fs::remove_dir(&path)?;
            } else {
                empty = false;
            }
        } else {
            empty = false;
        }
    }
    Ok(empty)
}

fn remove_file_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::io(format!("remove {path:?}"))(err)),
    }
}

/// Remove a directory tree. A permission-denied failure is retried exactly
/// once after clearing read-only attributes throughout the tree; a second
/// failure escalates.
fn remove_tree(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
            debug!(?path, "removal denied, clearing read-only attributes and retrying");
            clear_readonly(path).map_err(Error::io(format!("clear read-only under {path:?}")))?;
            fs::remove_dir_all(path)
                .map_err(Error::io(format!("remove {path:?} after clearing read-only")))
        }
        Err(err) => Err(Error::io(format!("remove {path:?}"))(err)),
    }
}

fn clear_readonly(root: &Path) -> io::Result<()> {
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(io::Error::other)?;
        let metadata = entry.metadata().map_err(io::Error::other)?;
        let mut permissions = metadata.permissions();
        if permissions.readonly() {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                permissions.set_mode(permissions.mode() | 0o200);
            }
            #[cfg(not(unix))]
            permissions.set_readonly(false);
            fs::set_permissions(entry.path(), permissions)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, RunConfig) {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig::for_scope(dir.path());
        fs::create_dir_all(&config.base_cache_dir).unwrap();
        fs::create_dir_all(&config.edit_cache_dir).unwrap();
        fs::create_dir_all(config.scope_dir.join("data")).unwrap();
        (dir, config)
    }

    fn base(raw: &str) -> RelPath {
        RelPath::new(raw).unwrap()
    }

    #[test]
    fn snapshot_then_restore_round_trips() {
        let (_dir, config) = fixture();
        let cache = CacheStore::new(&config);
        let rel = base("data/a.txt");
        let live = config.scope_dir.join("data/a.txt");
        fs::write(&live, "X").unwrap();

        cache.snapshot(&rel).unwrap();
        fs::write(&live, "XY").unwrap();
        cache.fingerprint(&rel).unwrap();

        assert!(cache.is_still_ours(&rel).unwrap());
        assert!(cache.restore(&rel).unwrap());
        assert_eq!(fs::read_to_string(&live).unwrap(), "X");
        assert!(!config.base_cache_dir.join("data/a.txt").exists());
        assert!(!config.edit_cache_dir.join("data/a.txt.hash").exists());
    }

    #[test]
    fn foreign_edit_is_left_alone_but_entry_is_cleared() {
        let (_dir, config) = fixture();
        let cache = CacheStore::new(&config);
        let rel = base("data/a.txt");
        let live = config.scope_dir.join("data/a.txt");
        fs::write(&live, "X").unwrap();

        cache.snapshot(&rel).unwrap();
        fs::write(&live, "XY").unwrap();
        cache.fingerprint(&rel).unwrap();

        // Somebody else touches the file after us.
        fs::write(&live, "XY-foreign").unwrap();
        assert!(!cache.is_still_ours(&rel).unwrap());
        assert!(!cache.restore(&rel).unwrap());
        assert_eq!(fs::read_to_string(&live).unwrap(), "XY-foreign");
        assert!(!config.base_cache_dir.join("data/a.txt").exists());
        assert!(!config.edit_cache_dir.join("data/a.txt.hash").exists());
    }

    #[test]
    fn restore_all_is_idempotent() {
        let (_dir, config) = fixture();
        let cache = CacheStore::new(&config);
        let rel = base("data/a.txt");
        let live = config.scope_dir.join("data/a.txt");
        fs::write(&live, "X").unwrap();

        cache.snapshot(&rel).unwrap();
        fs::write(&live, "XY").unwrap();
        cache.fingerprint(&rel).unwrap();

        assert_eq!(cache.restore_all().unwrap(), 1);
        assert_eq!(fs::read_to_string(&live).unwrap(), "X");
        // Second pass has nothing left to do.
        assert_eq!(cache.restore_all().unwrap(), 0);
    }

    #[test]
    fn orphaned_cache_entry_is_pruned_without_restore() {
        let (_dir, config) = fixture();
        let cache = CacheStore::new(&config);
        let rel = base("data/a.txt");
        let live = config.scope_dir.join("data/a.txt");
        fs::write(&live, "X").unwrap();

        cache.snapshot(&rel).unwrap();
        fs::write(&live, "XY").unwrap();
        cache.fingerprint(&rel).unwrap();
        fs::remove_file(&live).unwrap();

        assert_eq!(cache.restore_all().unwrap(), 0);
        assert!(!live.exists());
        assert!(!config.base_cache_dir.join("data").exists());
    }

    #[test]
    fn prune_removes_only_empty_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("empty/nested/deeper")).unwrap();
        fs::create_dir_all(root.join("kept")).unwrap();
        fs::write(root.join("kept/file.txt"), "x").unwrap();

        assert!(!prune_empty_dirs(root).unwrap());
        assert!(!root.join("empty").exists());
        assert!(root.join("kept/file.txt").exists());
    }

    #[test]
    fn reset_wipes_stale_entries_and_recreates_skeleton() {
        let (_dir, config) = fixture();
        let cache = CacheStore::new(&config);
        let stale = config.base_cache_dir.join("stale.txt");
        fs::write(&stale, "old").unwrap();

        cache.reset().unwrap();
        assert!(!stale.exists());
        for dir in [
            &config.mods_dir,
            &config.deploy_dir,
            &config.base_cache_dir,
            &config.edit_cache_dir,
        ] {
            assert!(dir.is_dir());
        }
    }

    // Unlink permission comes from the containing directory, so a denied
    // removal needs a read-only directory, not a read-only file.
    #[cfg(unix)]
    #[test]
    fn reset_retries_removal_of_read_only_directories() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, config) = fixture();
        let cache = CacheStore::new(&config);
        let locked = config.base_cache_dir.join("locked");
        fs::create_dir_all(&locked).unwrap();
        fs::write(locked.join("stale.txt"), "old").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

        // A privileged process ignores permission bits and never sees the
        // denial this is meant to exercise.
        if fs::write(locked.join("canary.txt"), "x").is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        cache.reset().unwrap();
        assert!(!locked.exists());
        assert!(config.base_cache_dir.is_dir());
    }
}
