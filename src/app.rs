//! The startup sequence of the proxy.
//!
//! [`App::run`] walks a fixed series of stages:
//!
//! ```text
//! Constructed -> OptionsValidated -> PrintAndExit
//!                                 \-> PrivilegeApplied -> ConfigResolved -> Started
//!                                                      \-> BootstrapReady
//! ```
//!
//! Any error moves the sequence to `Failed`. The process identity is only
//! changed in the `OptionsValidated -> PrivilegeApplied` step, which runs
//! before the loader gets a chance to start plugin threads.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::Write;
use std::mem;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config_files::{default_config_files, ConfigFileSet, ResolvedConfig};
use crate::errors::{Error, PrivDropError};
use crate::loader::Loader;
use crate::options::{help_text, version_line, Options, PROGRAM};
use crate::privdrop::set_user;
use crate::sysuser::SysUserOperations;

const SUPERUSER_BOOTSTRAP: &str = "You are bootstraping as a superuser.\n\
    This will make all the result files (config etc.) privately owned by the superuser.\n\
    Please use --user=username option to specify the user that will be owning them.\n\
    If you want to run bootstrap as a superuser anyway, please use the option --user=root";

/// Where the startup sequence currently is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Constructed,
    OptionsValidated,
    PrintAndExit,
    PrivilegeApplied,
    ConfigResolved,
    Started,
    BootstrapReady,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Stage::PrintAndExit | Stage::Started | Stage::BootstrapReady | Stage::Failed
        )
    }
}

/// Programs exchanging the master key during bootstrap
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MasterKeyPrograms {
    pub reader: String,
    pub writer: String,
}

/// What bootstrap mode was asked to do, once its preconditions hold
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapRequest {
    pub server: String,
    pub user: Option<String>,
    pub master_key: Option<MasterKeyPrograms>,
}

/// How a successful run ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Version or help text was written; nothing was started
    PrintedInfo,
    /// The loader started the plugins from these files
    Started(ResolvedConfig),
    /// Bootstrap mode may proceed
    Bootstrap(BootstrapRequest),
}

enum State {
    Constructed,
    OptionsValidated,
    PrintAndExit,
    PrivilegeApplied,
    ConfigResolved(ResolvedConfig),
    Started(ResolvedConfig),
    BootstrapReady(BootstrapRequest),
    Failed,
}

impl State {
    fn stage(&self) -> Stage {
        match self {
            State::Constructed => Stage::Constructed,
            State::OptionsValidated => Stage::OptionsValidated,
            State::PrintAndExit => Stage::PrintAndExit,
            State::PrivilegeApplied => Stage::PrivilegeApplied,
            State::ConfigResolved(_) => Stage::ConfigResolved,
            State::Started(_) => Stage::Started,
            State::BootstrapReady(_) => Stage::BootstrapReady,
            State::Failed => Stage::Failed,
        }
    }
}

pub struct App<'a> {
    origin: PathBuf,
    options: Options,
    ops: &'a dyn SysUserOperations,
    default_config_files: Vec<String>,
    state: State,
}

impl<'a> App<'a> {
    /// `origin` is the directory holding the executable.
    pub fn new<P: Into<PathBuf>>(
        origin: P,
        options: Options,
        ops: &'a dyn SysUserOperations,
    ) -> Self {
        App {
            origin: origin.into(),
            options,
            ops,
            default_config_files: default_config_files(PROGRAM),
            state: State::Constructed,
        }
    }

    /// Parse command-line arguments (without the program name).
    pub fn from_args<P, I, T>(
        origin: P,
        args: I,
        ops: &'a dyn SysUserOperations,
    ) -> Result<Self, Error>
    where
        P: Into<PathBuf>,
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Ok(Self::new(origin, Options::parse_args(args)?, ops))
    }

    /// Replace the built-in configuration search templates
    pub fn with_default_config_files(mut self, templates: Vec<String>) -> Self {
        self.default_config_files = templates;
        self
    }

    pub fn stage(&self) -> Stage {
        self.state.stage()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn origin(&self) -> &Path {
        &self.origin
    }

    pub fn config_file_set(&self) -> ConfigFileSet {
        ConfigFileSet {
            default_paths: self.default_config_files.clone(),
            explicit_paths: self.options.config.clone(),
            extra_paths: self.options.extra_config.clone(),
        }
    }

    /// In-memory options every configuration file starts from
    pub fn defaults(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("program".to_string(), PROGRAM.to_string()),
            ("origin".to_string(), self.origin.to_string_lossy().into_owned()),
        ])
    }

    /// Drive the sequence to a terminal stage.
    ///
    /// Version and help text go to `out`. Calling `run` again after success
    /// returns the same outcome without repeating any step.
    pub fn run(&mut self, loader: &mut dyn Loader, out: &mut dyn Write) -> Result<Outcome, Error> {
        loop {
            let next = match mem::replace(&mut self.state, State::Failed) {
                State::Constructed => {
                    self.validate_options()?;
                    State::OptionsValidated
                }
                State::OptionsValidated if self.options.showing_info() => {
                    self.print_info(out)?;
                    State::PrintAndExit
                }
                State::OptionsValidated => {
                    self.apply_privileges()?;
                    State::PrivilegeApplied
                }
                State::PrivilegeApplied => match self.bootstrap_request() {
                    Some(request) => State::BootstrapReady(request),
                    None => State::ConfigResolved(self.config_file_set().resolve(&self.origin)?),
                },
                State::ConfigResolved(resolved) => {
                    loader.start(&resolved, &self.defaults())?;
                    State::Started(resolved)
                }
                State::PrintAndExit => {
                    self.state = State::PrintAndExit;
                    return Ok(Outcome::PrintedInfo);
                }
                State::Started(resolved) => {
                    let outcome = Outcome::Started(resolved.clone());
                    self.state = State::Started(resolved);
                    return Ok(outcome);
                }
                State::BootstrapReady(request) => {
                    let outcome = Outcome::Bootstrap(request.clone());
                    self.state = State::BootstrapReady(request);
                    return Ok(outcome);
                }
                State::Failed => return Err(Error::AlreadyFailed),
            };
            debug!(stage = ?next.stage(), "startup advanced");
            self.state = next;
        }
    }

    fn validate_options(&self) -> Result<(), Error> {
        let o = &self.options;
        let (reader, writer) = (&o.master_key_reader, &o.master_key_writer);
        let master_key = [
            ("--master-key-reader", reader, "--master-key-writer", writer),
            ("--master-key-writer", writer, "--master-key-reader", reader),
        ];
        for (flag, value, partner_flag, partner) in master_key {
            let Some(value) = value else { continue };
            if value.is_empty() {
                return Err(Error::combination(format!("option '{flag}' requires a value.")));
            }
            if !o.is_bootstrap() {
                return Err(Error::combination(format!(
                    "Option {flag} can only be used together with -B/--bootstrap."
                )));
            }
            if partner.is_none() {
                return Err(Error::combination(format!(
                    "Option {flag} can only be used together with {partner_flag}."
                )));
            }
        }

        if o.is_bootstrap() {
            let root = self.ops.geteuid().is_root();
            match o.user {
                Some(_) if !root => return Err(PrivDropError::NotRoot.into()),
                None if root => return Err(Error::combination(SUPERUSER_BOOTSTRAP)),
                _ => {}
            }
        }
        Ok(())
    }

    fn print_info(&self, out: &mut dyn Write) -> Result<(), Error> {
        writeln!(out, "{}", version_line())?;
        if self.options.help {
            writeln!(out)?;
            write!(out, "{}", help_text())?;
        }
        Ok(())
    }

    /// Bootstrap keeps the real ids so files can still be handed over later;
    /// a normal run drops root for good.
    fn apply_privileges(&self) -> Result<(), Error> {
        if let Some(user) = &self.options.user {
            set_user(user, !self.options.is_bootstrap(), self.ops)?;
        }
        Ok(())
    }

    fn bootstrap_request(&self) -> Option<BootstrapRequest> {
        let o = &self.options;
        let server = o.bootstrap.clone()?;
        let master_key = match (&o.master_key_reader, &o.master_key_writer) {
            (Some(reader), Some(writer)) => Some(MasterKeyPrograms {
                reader: reader.clone(),
                writer: writer.clone(),
            }),
            _ => None,
        };
        Some(BootstrapRequest {
            server,
            user: o.user.clone(),
            master_key,
        })
    }
}
