use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of privilege dropping failures
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A permanent switch was requested without superuser rights
    NotRoot,
    /// Neither the name nor the numeric id matched an account
    UnknownUser,
    /// System-level error when interacting with OS privileges
    SysError,
}

/// Whether an identity change touches real and effective ids or only effective ones
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum ChangeMode {
    Permanent,
    Effective,
}

/// The identity primitive that failed
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum IdCall {
    InitGroups,
    Group,
    User,
}

/// A single identity syscall; displays as the syscall's name
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct IdChange {
    pub call: IdCall,
    pub mode: ChangeMode,
}

impl fmt::Display for IdChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match (self.call, self.mode) {
            (IdCall::InitGroups, _) => "initgroups",
            (IdCall::Group, ChangeMode::Permanent) => "setgid",
            (IdCall::Group, ChangeMode::Effective) => "setegid",
            (IdCall::User, ChangeMode::Permanent) => "setuid",
            (IdCall::User, ChangeMode::Effective) => "seteuid",
        };
        f.write_str(name)
    }
}

/// Error type for privilege dropping operations
#[derive(Debug, Error)]
pub enum PrivDropError {
    #[error("One can only use the -u/--user switch if running as root")]
    NotRoot,

    #[error("Can't use user '{0}'. Please check that the user exists!")]
    UnknownUser(String),

    #[error("Error trying to set the user. {change} failed: {source}")]
    Syscall {
        change: IdChange,
        #[source]
        source: nix::Error,
    },
}

impl PrivDropError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PrivDropError::NotRoot => ErrorKind::NotRoot,
            PrivDropError::UnknownUser(_) => ErrorKind::UnknownUser,
            PrivDropError::Syscall { .. } => ErrorKind::SysError,
        }
    }

    pub(crate) fn syscall(call: IdCall, mode: ChangeMode) -> impl FnOnce(nix::Error) -> Self {
        move |source| PrivDropError::Syscall {
            change: IdChange { call, mode },
            source,
        }
    }
}

/// Errors raised while deciding which configuration files to load
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Option {0} can only be used once")]
    DuplicateOption(&'static str),

    #[error("Failed reading configuration file: {}", .0.display())]
    Unreadable(PathBuf),

    #[error("Duplicate configuration file: {}.", .0.display())]
    Duplicate(PathBuf),

    #[error("Extra configuration files only work when other configuration files are available.")]
    ExtraWithoutPrimary,

    #[error(
        "No valid configuration file available. \
         See --help for more information (looked at paths '{}')",
        .0.join(";")
    )]
    NoValidConfig(Vec<String>),

    #[error("Malformed environment variable placeholder in '{0}'")]
    MalformedSubstitution(String),
}

/// Errors reported by a [`crate::Loader`] while parsing and starting plugins
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("failed reading '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{message} in '{}' line {line}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("option '{option}' in section [{section}]: {message}")]
    Option {
        section: String,
        option: String,
        message: String,
    },

    #[error("plugin '{plugin}' failed to start: {reason}")]
    Plugin { plugin: String, reason: String },
}

/// Everything that can stop the bootstrap sequence
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Usage(#[from] clap::Error),

    #[error("{0}")]
    OptionCombination(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    PrivDrop(#[from] PrivDropError),

    #[error("Configuration error: {0}")]
    Loader(#[from] LoaderError),

    #[error("logging setup failed: {0}")]
    Logger(String),

    #[error("failed writing output: {0}")]
    Output(#[from] std::io::Error),

    #[error("startup already failed")]
    AlreadyFailed,
}

impl Error {
    pub(crate) fn combination(message: impl fmt::Display) -> Self {
        Error::OptionCombination(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::errno::Errno;

    #[test]
    fn syscall_message_names_call_and_mode() {
        let e = PrivDropError::syscall(IdCall::Group, ChangeMode::Effective)(Errno::EPERM);
        assert!(e
            .to_string()
            .starts_with("Error trying to set the user. setegid failed:"));
        assert_eq!(e.kind(), ErrorKind::SysError);

        let e = PrivDropError::syscall(IdCall::User, ChangeMode::Permanent)(Errno::EPERM);
        assert!(e
            .to_string()
            .starts_with("Error trying to set the user. setuid failed:"));
        assert!(std::error::Error::source(&e).is_some());
    }

    #[test]
    fn loader_errors_get_prefixed() {
        let e = Error::from(LoaderError::Parse {
            path: PathBuf::from("a.conf"),
            line: 3,
            message: "Malformed section header: '[oops'".into(),
        });
        assert_eq!(
            e.to_string(),
            "Configuration error: Malformed section header: '[oops' in 'a.conf' line 3"
        );
    }

    #[test]
    fn no_valid_config_lists_paths() {
        let e = ConfigError::NoValidConfig(vec!["/a.conf".into(), "/b.conf".into()]);
        assert!(e.to_string().contains("'/a.conf;/b.conf'"));
    }
}
