use crate::{
    cache::CacheStore,
    config::RunConfig,
    discovery,
    engine::ApplyEngine,
    error::Result,
};
use tracing::info;

/// Counts reported at the end of a successful run. Derived, never persisted.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub base_files_modified: usize,
    pub payloads_applied: usize,
    pub mods_loaded: usize,
    pub mods_skipped: usize,
    pub assets_deployed: usize,
    pub files_restored: usize,
}

/// One full run: restore the previous run's edits, wipe and recreate the
/// caches, deploy mod assets, then apply payloads per base file in
/// priority order. The first failing base file aborts the run; base files
/// already committed stay committed.
pub fn run(config: &RunConfig) -> Result<RunSummary> {
    config.validate()?;
    let cache = CacheStore::new(config);
    let mut summary = RunSummary::default();

    echo(config, "Cleaning edits from the previous run...");
    summary.files_restored = cache.restore_all()?;
    info!(restored = summary.files_restored, "previous edits restored");

    cache.reset()?;

    echo(config, "Reading mod files...");
    let discovered = discovery::discover(config)?;
    summary.mods_loaded = discovered.mods.len();
    summary.mods_skipped = discovered.skipped;

    summary.assets_deployed = discovery::deploy_assets(config, &discovered.mods)?;
    info!(deployed = summary.assets_deployed, "mod assets deployed");

    let mut groups = discovery::group_payloads(&discovered.mods);
    let engine = ApplyEngine::new(config);

    echo(config, "Modifying base files:");
    for (base, payloads) in &mut groups {
        // Stable: equal priorities keep discovery order.
        payloads.sort_by_key(|payload| payload.priority);
        summary.payloads_applied += engine.apply_all(base, payloads)?;
        summary.base_files_modified += 1;

        echo(config, &format!("  {base}"));
        if config.echo {
            let mut index = 0;
            for payload in payloads.iter() {
                for source in payload.source_descriptions() {
                    index += 1;
                    println!("    #{index} {source}");
                }
            }
        }
    }

    let files = summary.base_files_modified;
    let payloads = summary.payloads_applied;
    echo(
        config,
        &format!(
            "{files} file{} modified by a total of {payloads} payload{}.",
            plural(files),
            plural(payloads)
        ),
    );
    info!(
        base_files = summary.base_files_modified,
        payloads = summary.payloads_applied,
        "run complete"
    );
    Ok(summary)
}

fn echo(config: &RunConfig, message: &str) {
    if config.echo {
        println!("{message}");
    }
    info!("{message}");
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
