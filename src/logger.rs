//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup, before the bootstrap sequence runs. The
//! returned [`LogHandle`] lets the level configured in the `[logger]`
//! section take over once the configuration has been loaded.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use crate::errors::Error;

/// Changes the level of the installed subscriber
pub struct LogHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    from_env: bool,
}

/// Install a stderr subscriber.
///
/// `RUST_LOG` wins over `level` when set, and then also over any level set
/// later through the handle.
pub fn init(level: LevelFilter) -> Result<LogHandle, Error> {
    let (filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::default().add_directive(level.into()), false),
    };
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| Error::Logger(format!("failed to set subscriber: {e}")))?;
    Ok(LogHandle { handle, from_env })
}

impl LogHandle {
    pub fn set_level(&self, level: LevelFilter) -> Result<(), Error> {
        if self.from_env {
            return Ok(());
        }
        self.handle
            .reload(EnvFilter::default().add_directive(level.into()))
            .map_err(|e| Error::Logger(format!("failed to change log level: {e}")))
    }
}

/// Parse a level name as written in configuration files.
///
/// Case is ignored and `warning` is accepted for `warn`.
pub fn parse_level(level: &str) -> Result<LevelFilter, String> {
    let lower = level.trim().to_ascii_lowercase();
    let name = match lower.as_str() {
        "" => return Err("log level must not be empty".into()),
        "warning" => "warn",
        other => other,
    };
    name.parse::<LevelFilter>()
        .map_err(|_| format!("unrecognised log level: '{level}'"))
}
