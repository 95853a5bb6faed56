use std::collections::HashSet;
use std::env;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::errors::ConfigError;

/// Extension of configuration files looked up in default locations
pub const PRIMARY_EXTENSION: &str = "conf";
/// Older extension tried when a default `.conf` file is missing
pub const FALLBACK_EXTENSION: &str = "ini";
/// Placeholder replaced by the directory holding the executable
pub const ORIGIN_PLACEHOLDER: &str = "{origin}";

const ENV_OPENERS: [&str; 2] = ["ENV{", "${"];

/// Built-in places to look for `<program>.conf` when none is given.
pub fn default_config_files(program: &str) -> Vec<String> {
    vec![
        format!("{ORIGIN_PLACEHOLDER}/../etc/{program}.{PRIMARY_EXTENSION}"),
        format!("ENV{{HOME}}/.{program}.{PRIMARY_EXTENSION}"),
    ]
}

/// The final, ordered list of configuration files to hand to the loader
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedConfig {
    paths: Vec<PathBuf>,
}

impl ResolvedConfig {
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn into_paths(self) -> Vec<PathBuf> {
        self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Configuration file candidates gathered for one run
#[derive(Clone, Debug, Default)]
pub struct ConfigFileSet {
    /// Search templates, may contain `{origin}` and environment references
    pub default_paths: Vec<String>,
    /// Files given with `-c/--config`
    pub explicit_paths: Vec<String>,
    /// Files given with `-a/--extra-config`, layered on top
    pub extra_paths: Vec<String>,
}

impl ConfigFileSet {
    pub fn new(default_paths: Vec<String>) -> Self {
        ConfigFileSet {
            default_paths,
            ..Default::default()
        }
    }

    pub fn explicit<T: Into<String>>(mut self, path: T) -> Self {
        self.explicit_paths.push(path.into());
        self
    }

    pub fn extra<T: Into<String>>(mut self, path: T) -> Self {
        self.extra_paths.push(path.into());
        self
    }

    /// Decide which files will be read, without reading any of them.
    ///
    /// Explicit files replace the default search entirely. Without them, each
    /// default location contributes its `.conf` file, or the `.ini` sibling
    /// when only that exists. Extra files are appended to whichever base was
    /// found and are rejected when there is none.
    pub fn resolve(&self, origin: &Path) -> Result<ResolvedConfig, ConfigError> {
        for path in self.explicit_paths.iter().chain(&self.extra_paths) {
            if !is_readable_file(Path::new(path)) {
                return Err(ConfigError::Unreadable(PathBuf::from(path)));
            }
        }

        let mut seen = HashSet::new();
        for path in self.explicit_paths.iter().chain(&self.extra_paths) {
            check_unique(Path::new(path), &mut seen)?;
        }

        let base = if !self.explicit_paths.is_empty() {
            self.explicit_paths.iter().map(PathBuf::from).collect()
        } else {
            let (found, looked_at) = self.search_defaults(origin)?;
            if found.is_empty() {
                if !self.extra_paths.is_empty() {
                    return Err(ConfigError::ExtraWithoutPrimary);
                }
                return Err(ConfigError::NoValidConfig(looked_at));
            }
            // Defaults may repeat one another; only extras must not repeat them.
            for path in &found {
                if seen.contains(&canonical(path)) {
                    return Err(ConfigError::Duplicate(path.clone()));
                }
            }
            found
        };

        let mut paths: Vec<PathBuf> = base;
        paths.extend(self.extra_paths.iter().map(PathBuf::from));
        debug!(files = ?paths, "resolved configuration files");
        Ok(ResolvedConfig { paths })
    }

    fn search_defaults(&self, origin: &Path) -> Result<(Vec<PathBuf>, Vec<String>), ConfigError> {
        let origin = origin.to_string_lossy();
        let mut found = Vec::new();
        let mut looked_at = Vec::with_capacity(self.default_paths.len());
        for template in &self.default_paths {
            let expanded = substitute_envvar(template)?;
            let candidate = substitute_variable(&expanded, ORIGIN_PLACEHOLDER, &origin);
            let path = PathBuf::from(&candidate);
            if is_readable_file(&path) {
                debug!(path = %path.display(), "using default configuration file");
                found.push(path);
            } else if let Some(sibling) = ini_fallback(&path).filter(|p| is_readable_file(p)) {
                warn!(
                    missing = %path.display(),
                    using = %sibling.display(),
                    "falling back to .{} configuration file",
                    FALLBACK_EXTENSION
                );
                found.push(sibling);
            }
            looked_at.push(candidate);
        }
        Ok((found, looked_at))
    }
}

/// Free-function form of [`ConfigFileSet::resolve`].
pub fn resolve(
    explicit_paths: &[String],
    extra_paths: &[String],
    default_paths: &[String],
    origin: &Path,
) -> Result<ResolvedConfig, ConfigError> {
    ConfigFileSet {
        default_paths: default_paths.to_vec(),
        explicit_paths: explicit_paths.to_vec(),
        extra_paths: extra_paths.to_vec(),
    }
    .resolve(origin)
}

fn is_readable_file(path: &Path) -> bool {
    path.is_file() && File::open(path).is_ok()
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn check_unique(path: &Path, seen: &mut HashSet<PathBuf>) -> Result<(), ConfigError> {
    if !seen.insert(canonical(path)) {
        return Err(ConfigError::Duplicate(path.to_path_buf()));
    }
    Ok(())
}

fn ini_fallback(path: &Path) -> Option<PathBuf> {
    match path.extension() {
        Some(ext) if ext == PRIMARY_EXTENSION => Some(path.with_extension(FALLBACK_EXTENSION)),
        _ => None,
    }
}

/// Replace every occurrence of `name` in `template` by `value`.
pub fn substitute_variable(template: &str, name: &str, value: &str) -> String {
    template.replace(name, value)
}

/// Expand `ENV{NAME}` and `${NAME}` references from the process environment.
///
/// Unset variables expand to nothing. A reference without a closing brace or
/// with an empty or non-identifier name is rejected.
pub fn substitute_envvar(template: &str) -> Result<String, ConfigError> {
    let malformed = || ConfigError::MalformedSubstitution(template.to_owned());
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    loop {
        let next = ENV_OPENERS
            .iter()
            .filter_map(|opener| rest.find(opener).map(|at| (at, opener.len())))
            .min_by_key(|&(at, _)| at);
        let Some((at, opener_len)) = next else {
            out.push_str(rest);
            return Ok(out);
        };
        out.push_str(&rest[..at]);
        let after = &rest[at + opener_len..];
        let end = after.find('}').ok_or_else(malformed)?;
        let name = &after[..end];
        if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            return Err(malformed());
        }
        out.push_str(&env::var(name).unwrap_or_default());
        rest = &after[end + 1..];
    }
}
