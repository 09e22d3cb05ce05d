use crate::config::RunConfig;
use anyhow::{Context, Result};
use std::{fs, io, path::PathBuf, sync::Arc};
use time::{macros::format_description, OffsetDateTime};
use tracing_subscriber::EnvFilter;

/// One log file per run, named with a timestamp, under the configured logs
/// directory. With logging disabled, events go to stderr instead.
/// Returns the log file path so fatal-error output can point at it.
pub fn init(config: &RunConfig) -> Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if !config.log {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
        return Ok(None);
    }

    fs::create_dir_all(&config.logs_dir).context("create logs dir")?;
    let stamp = OffsetDateTime::now_utc()
        .format(format_description!(
            "[year].[month].[day]-[hour].[minute].[second]"
        ))
        .context("format log timestamp")?;
    let path = config.logs_dir.join(format!("modweave-{stamp}.log"));
    let file = fs::File::create(&path).context("create log file")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .init();
    Ok(Some(path))
}
