//! dbproxy entry point.
//!
//! Startup sequence:
//!   1. Init logger (RUST_LOG or warn)
//!   2. Validate options, drop privileges, resolve configuration files
//!   3. Start plugins through the loader
//!   4. Apply the `[logger] level` from the loaded configuration

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use proxy_bootstrap::logger::{self, LogHandle};
use proxy_bootstrap::{App, ConfigLoader, Error, Outcome, SystemUserOperations, MAIN_LOGGER};
use tracing::info;
use tracing::level_filters::LevelFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Error> {
    let log = logger::init(LevelFilter::WARN)?;
    let origin = origin_dir();
    let ops = SystemUserOperations;
    let mut app = App::from_args(origin, env::args_os().skip(1), &ops)?;
    let mut loader = ConfigLoader::default();

    match app.run(&mut loader, &mut std::io::stdout())? {
        Outcome::PrintedInfo => {}
        Outcome::Started(files) => {
            apply_configured_level(&log, &loader)?;
            info!(
                files = files.len(),
                loggers = ?loader.registry().logger_names(),
                "dbproxy started"
            );
        }
        Outcome::Bootstrap(request) => {
            info!(server = %request.server, "bootstrap requested");
        }
    }
    Ok(())
}

fn apply_configured_level(log: &LogHandle, loader: &ConfigLoader) -> Result<(), Error> {
    match loader.registry().level(MAIN_LOGGER) {
        Some(level) => log.set_level(level),
        None => Ok(()),
    }
}

/// Directory of the running executable, falling back to the working directory.
fn origin_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}
