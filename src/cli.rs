use crate::{config::RunConfig, logging, run};
use anyhow::{bail, Result};
use std::path::PathBuf;

enum CliAction {
    Run(RunOptions),
    Help,
    Version,
}

#[derive(Default)]
struct RunOptions {
    scope: Option<PathBuf>,
    mods_dir: Option<PathBuf>,
    deploy_dir: Option<PathBuf>,
    logs_dir: Option<PathBuf>,
    no_log: bool,
    quiet: bool,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match parse_args(&args)? {
        CliAction::Help => {
            print_help();
            Ok(())
        }
        CliAction::Version => {
            println!("modweave v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliAction::Run(options) => run_with(options),
    }
}

fn run_with(options: RunOptions) -> Result<()> {
    let scope = match options.scope {
        Some(scope) => scope,
        None => std::env::current_dir()?,
    };
    let mut config = RunConfig::load_or_create(&scope)?;
    if let Some(dir) = options.mods_dir {
        config.mods_dir = dir;
    }
    if let Some(dir) = options.deploy_dir {
        config.deploy_dir = dir;
    }
    if let Some(dir) = options.logs_dir {
        config.logs_dir = dir;
    }
    if options.no_log {
        config.log = false;
    }
    if options.quiet {
        config.echo = false;
    }

    let log_path = logging::init(&config)?;
    match run::run(&config) {
        Ok(summary) => {
            tracing::info!(
                base_files = summary.base_files_modified,
                payloads = summary.payloads_applied,
                mods = summary.mods_loaded,
                skipped = summary.mods_skipped,
                "done"
            );
            Ok(())
        }
        Err(err) => {
            if let Some(path) = log_path {
                eprintln!("run failed, see log at {path:?}");
            }
            Err(err.into())
        }
    }
}

fn parse_args(args: &[String]) -> Result<CliAction> {
    let mut options = RunOptions::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(CliAction::Help),
            "--version" | "-V" => return Ok(CliAction::Version),
            "--scope" | "-s" => options.scope = Some(expect_value(&mut iter, arg)?),
            "--mods-dir" => options.mods_dir = Some(expect_value(&mut iter, arg)?),
            "--deploy-dir" => options.deploy_dir = Some(expect_value(&mut iter, arg)?),
            "--logs-dir" => options.logs_dir = Some(expect_value(&mut iter, arg)?),
            "--no-log" => options.no_log = true,
            "--quiet" | "-q" => options.quiet = true,
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(CliAction::Run(options))
}

fn expect_value(iter: &mut std::slice::Iter<'_, String>, flag: &str) -> Result<PathBuf> {
    match iter.next() {
        Some(value) => Ok(PathBuf::from(value)),
        None => bail!("{flag} requires a path"),
    }
}

fn print_help() {
    println!("modweave — ordered-payload mod importer");
    println!();
    println!("Usage: modweave [options]");
    println!();
    println!("Options:");
    println!("  -s, --scope <dir>       Game data directory to modify (default: cwd)");
    println!("      --mods-dir <dir>    Override the mods directory");
    println!("      --deploy-dir <dir>  Override the deploy directory");
    println!("      --logs-dir <dir>    Override the logs directory");
    println!("      --no-log            Do not write a run log file");
    println!("  -q, --quiet             Suppress console progress output");
    println!("  -h, --help              Show this help");
    println!("  -V, --version           Show the version");
}
