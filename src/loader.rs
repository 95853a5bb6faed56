//! Handing the resolved configuration over to the plugin loader.
//!
//! The bootstrap sequence only knows the [`Loader`] trait. [`ConfigLoader`]
//! is the implementation used by the binary: it reads the files in order,
//! merges same-named sections (later files win per option), and registers
//! one logger per configured plugin next to the `main` logger.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use tracing::level_filters::LevelFilter;
use tracing::{debug, info};

use crate::config_files::ResolvedConfig;
use crate::errors::LoaderError;
use crate::logger;

/// Name of the logger used by the process itself
pub const MAIN_LOGGER: &str = "main";
/// Section holding options shared by every other section
pub const DEFAULT_SECTION: &str = "DEFAULT";
/// Section configuring logging, not a plugin
pub const LOGGER_SECTION: &str = "logger";

const DEFAULT_LEVEL: LevelFilter = LevelFilter::WARN;

/// Parses, merges and starts whatever the configuration names
pub trait Loader {
    /// `defaults` are in-memory options that every file can override.
    fn start(
        &mut self,
        config: &ResolvedConfig,
        defaults: &BTreeMap<String, String>,
    ) -> Result<(), LoaderError>;
}

/// Section identity: plugin name plus optional `:key`
pub type SectionId = (String, String);

/// Merged view of all configuration files
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    defaults: BTreeMap<String, String>,
    sections: BTreeMap<SectionId, BTreeMap<String, String>>,
}

impl Config {
    pub fn with_defaults(defaults: BTreeMap<String, String>) -> Self {
        Config {
            defaults,
            sections: BTreeMap::new(),
        }
    }

    pub fn read(&mut self, path: &Path) -> Result<(), LoaderError> {
        let text = fs::read_to_string(path).map_err(|source| LoaderError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.merge_str(path, &text)
    }

    /// Merge `text`, attributing errors to `path`.
    pub fn merge_str(&mut self, path: &Path, text: &str) -> Result<(), LoaderError> {
        let parse_error = |line: usize, message: String| LoaderError::Parse {
            path: path.to_path_buf(),
            line,
            message,
        };
        let mut current: Option<SectionId> = None;
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') {
                let id = parse_header(line).ok_or_else(|| {
                    parse_error(idx + 1, format!("Malformed section header: '{line}'"))
                })?;
                if id.0 != DEFAULT_SECTION {
                    self.sections.entry(id.clone()).or_default();
                }
                current = Some(id);
                continue;
            }
            let (name, value) = line
                .split_once('=')
                .map(|(n, v)| (n.trim(), v.trim()))
                .filter(|(n, _)| !n.is_empty())
                .ok_or_else(|| parse_error(idx + 1, format!("Malformed option: '{line}'")))?;
            let options = match &current {
                None => return Err(parse_error(idx + 1, "Option outside of a section".to_string())),
                Some(id) if id.0 == DEFAULT_SECTION => &mut self.defaults,
                Some(id) => self.sections.entry(id.clone()).or_default(),
            };
            options.insert(name.to_lowercase(), value.to_owned());
        }
        Ok(())
    }

    /// Look `option` up in a section, then in the defaults.
    /// Option names are case-insensitive.
    pub fn get(&self, name: &str, key: &str, option: &str) -> Option<&str> {
        let option = option.to_lowercase();
        self.sections
            .get(&(name.to_owned(), key.to_owned()))
            .and_then(|options| options.get(&option))
            .or_else(|| self.defaults.get(&option))
            .map(String::as_str)
    }

    pub fn has_section(&self, name: &str, key: &str) -> bool {
        self.sections.contains_key(&(name.to_owned(), key.to_owned()))
    }

    pub fn sections(&self) -> impl Iterator<Item = &SectionId> {
        self.sections.keys()
    }
}

fn parse_header(line: &str) -> Option<SectionId> {
    let inner = line.strip_prefix('[')?.strip_suffix(']')?;
    let (name, key) = match inner.split_once(':') {
        Some((name, key)) => (name, key),
        None => (inner, ""),
    };
    let valid = |s: &str| s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if name.is_empty() || !valid(name) || !valid(key) || (inner.contains(':') && key.is_empty()) {
        return None;
    }
    Some((name.to_owned(), key.to_owned()))
}

/// Logger names and levels, one per plugin plus [`MAIN_LOGGER`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoggingRegistry {
    loggers: BTreeMap<String, LevelFilter>,
}

impl LoggingRegistry {
    pub fn register<T: Into<String>>(&mut self, name: T, level: LevelFilter) {
        self.loggers.insert(name.into(), level);
    }

    pub fn level(&self, name: &str) -> Option<LevelFilter> {
        self.loggers.get(name).copied()
    }

    pub fn logger_names(&self) -> Vec<&str> {
        self.loggers.keys().map(String::as_str).collect()
    }
}

/// Default [`Loader`]: INI-style files, plugins started by name
#[derive(Debug, Default)]
pub struct ConfigLoader {
    available: Option<BTreeSet<String>>,
    config: Config,
    registry: LoggingRegistry,
}

impl ConfigLoader {
    /// Refuse to start plugins outside `names`
    pub fn with_available_plugins<I, T>(names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        ConfigLoader {
            available: Some(names.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &LoggingRegistry {
        &self.registry
    }
}

impl Loader for ConfigLoader {
    fn start(
        &mut self,
        resolved: &ResolvedConfig,
        defaults: &BTreeMap<String, String>,
    ) -> Result<(), LoaderError> {
        let mut config = Config::with_defaults(defaults.clone());
        for path in resolved.paths() {
            debug!(path = %path.display(), "reading configuration");
            config.read(path)?;
        }

        let level = match config.get(LOGGER_SECTION, "", "level") {
            None => DEFAULT_LEVEL,
            Some(level) => logger::parse_level(level).map_err(|message| LoaderError::Option {
                section: LOGGER_SECTION.to_string(),
                option: "level".to_string(),
                message,
            })?,
        };

        let mut registry = LoggingRegistry::default();
        registry.register(MAIN_LOGGER, level);
        let plugins: Vec<&SectionId> = config
            .sections()
            .filter(|(name, _)| name != LOGGER_SECTION)
            .collect();
        for (name, _) in &plugins {
            if let Some(available) = &self.available {
                if !available.contains(name) {
                    return Err(LoaderError::Plugin {
                        plugin: name.clone(),
                        reason: "plugin is not available".to_string(),
                    });
                }
            }
            registry.register(name.clone(), level);
        }
        info!(logger = MAIN_LOGGER, %level, "main logger initialized");
        for (name, key) in plugins {
            info!(logger = %name, key = %key, "starting plugin");
        }

        self.config = config;
        self.registry = registry;
        Ok(())
    }
}
