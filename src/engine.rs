use crate::{
    cache::CacheStore,
    config::{RelPath, RunConfig},
    error::{Error, Result},
    payload::Payload,
};
use std::fs;
use tracing::{debug, error};

/// Applies an ordered payload list to one base file. Each call mutates
/// exactly one live scope file: either it ends fully edited with a
/// matching fingerprint, or restored to pristine with no fingerprint.
pub struct ApplyEngine<'a> {
    config: &'a RunConfig,
    cache: CacheStore<'a>,
}

impl<'a> ApplyEngine<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        ApplyEngine {
            config,
            cache: CacheStore::new(config),
        }
    }

    /// Snapshot, apply payloads in the given order, fingerprint. A failed
    /// payload rolls this base file back to its snapshot before the error
    /// propagates; base files committed earlier in the run stay committed.
    pub fn apply_all(&self, base: &RelPath, payloads: &[Payload]) -> Result<usize> {
        self.cache.snapshot(base)?;
        let live = base.join_under(&self.config.scope_dir);

        for payload in payloads {
            debug!(base = %base, mod_id = %payload.mod_id, priority = payload.priority, "applying payload");
            if let Err(source) = payload.apply(&live, self.config) {
                self.rollback(base);
                return Err(Error::Apply {
                    base: base.as_path().to_path_buf(),
                    mod_id: payload.mod_id.clone(),
                    source,
                });
            }
        }

        self.cache.fingerprint(base)?;
        Ok(payloads.len())
    }

    // Best-effort: the apply failure is the error worth surfacing, so a
    // rollback failure is only logged. Once the live file is pristine
    // again the snapshot is dropped too; leaving it behind (with no
    // fingerprint) would make the next run's restore pass treat the
    // untouched file as a foreign edit.
    fn rollback(&self, base: &RelPath) {
        let snapshot = base.join_under(&self.config.base_cache_dir);
        let live = base.join_under(&self.config.scope_dir);
        match fs::copy(&snapshot, &live) {
            Ok(_) => {
                if let Err(err) = fs::remove_file(&snapshot) {
                    error!(base = %base, %err, "failed to drop snapshot after rollback");
                }
            }
            Err(err) => error!(base = %base, %err, "rollback from base cache failed"),
        }
    }
}
