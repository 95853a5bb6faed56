use std::ffi::OsString;

use clap::{ArgAction, CommandFactory, Parser};

use crate::errors::{ConfigError, Error};

pub const PROGRAM: &str = "dbproxy";

/// Command-line options that decide how the proxy starts
///
/// Help and version are handled by the bootstrap sequence rather than by
/// clap, so that asking for them is an ordinary outcome and not an exit.
#[derive(Parser, Debug, Default, Clone, PartialEq, Eq)]
#[command(
    name = PROGRAM,
    about = "Database proxy",
    disable_help_flag = true,
    disable_version_flag = true
)]
pub struct Options {
    /// Only read configuration from this file
    #[arg(short = 'c', long = "config", value_name = "path", action = ArgAction::Append)]
    pub config: Vec<String>,

    /// Read this file after other configuration files; can be repeated
    #[arg(short = 'a', long = "extra-config", value_name = "path", action = ArgAction::Append)]
    pub extra_config: Vec<String>,

    /// Run as this user (name or numeric id)
    #[arg(short = 'u', long = "user", value_name = "username")]
    pub user: Option<String>,

    /// Bootstrap and configure the proxy against this server
    #[arg(short = 'B', long = "bootstrap", value_name = "host:port")]
    pub bootstrap: Option<String>,

    /// Program that prints the master key
    #[arg(
        long = "master-key-reader",
        value_name = "path",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = ""
    )]
    pub master_key_reader: Option<String>,

    /// Program that stores the master key
    #[arg(
        long = "master-key-writer",
        value_name = "path",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = ""
    )]
    pub master_key_writer: Option<String>,

    /// Display version information and exit
    #[arg(short = 'V', long = "version", action = ArgAction::SetTrue)]
    pub version: bool,

    /// Display this help and exit
    #[arg(short = '?', long = "help", action = ArgAction::SetTrue)]
    pub help: bool,
}

impl Options {
    /// Parse arguments, not including the program name.
    pub fn parse_args<I, T>(args: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let argv = std::iter::once(OsString::from(PROGRAM)).chain(args.into_iter().map(Into::into));
        let options = Options::try_parse_from(argv)?;
        if options.config.len() > 1 {
            return Err(ConfigError::DuplicateOption("-c/--config").into());
        }
        Ok(options)
    }

    /// Whether only information was asked for
    pub fn showing_info(&self) -> bool {
        self.version || self.help
    }

    pub fn is_bootstrap(&self) -> bool {
        self.bootstrap.is_some()
    }
}

/// `<program> v<version> on <os> (<arch>, <bits>-bit)`
pub fn version_line() -> String {
    format!(
        "{} v{} on {} ({}, {}-bit)",
        PROGRAM,
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH,
        usize::BITS
    )
}

/// The usage text, starting with `Usage: dbproxy`.
pub fn help_text() -> String {
    Options::command().render_help().to_string()
}
