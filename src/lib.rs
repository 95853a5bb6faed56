/*!
# proxy-bootstrap

Startup decisions for a database proxy, taken before any plugin runs.

## Overview

A proxy process usually starts as root, works out which configuration files
govern the run, and must give up its privileges before the first plugin
thread starts. This crate covers those steps:

- Resolving configuration files from `-c/--config`, `-a/--extra-config` and
  the built-in search locations, with eager checks for unreadable or
  duplicate files
- Switching to another user by name or numeric id, either permanently
  (real and effective ids) or for the effective ids only
- Validating option combinations for bootstrap mode and master-key programs
- Handing the resolved files to a [`Loader`] that starts the plugins

All identity syscalls go through the [`SysUserOperations`] trait, so the
privilege logic can be tested with [`testing::MockUserOperations`] instead
of a real root process.

## Resolving configuration files

```no_run
use proxy_bootstrap::ConfigFileSet;
use std::path::Path;

let resolved = ConfigFileSet::new(vec!["{origin}/../etc/dbproxy.conf".into()])
    .extra("/etc/dbproxy/extra.conf")
    .resolve(Path::new("/usr/local/bin"))
    .unwrap_or_else(|e| panic!("{}", e));
for path in resolved.paths() {
    println!("{}", path.display());
}
```

## Dropping privileges

```no_run
use proxy_bootstrap::PrivDrop;

PrivDrop::default()
    .user("dbproxy")                 // Switch to a non-root user, by name or id
    .apply()
    .unwrap_or_else(|e| panic!("Failed to drop privileges: {}", e));

// Continue running with dropped privileges...
```

## Full startup

```no_run
use proxy_bootstrap::{App, ConfigLoader, Outcome, SystemUserOperations};

let mut app = App::from_args("/usr/local/bin", ["-c", "/etc/dbproxy.conf"], &SystemUserOperations)
    .unwrap_or_else(|e| panic!("{}", e));
let mut loader = ConfigLoader::default();
match app.run(&mut loader, &mut std::io::stdout()) {
    Ok(Outcome::Started(files)) => println!("started from {} file(s)", files.len()),
    Ok(_) => {}
    Err(e) => eprintln!("Error: {}", e),
}
```

## Safety Considerations

Identity changes are executed in a specific order:

1. For a permanent switch, the effective user must already be root
2. The user is looked up by name, then by numeric id
3. Supplementary groups are initialised for the account
4. The group id is changed before the user id

[`App`] performs the switch exactly once, after option validation and before
configuration is loaded, while the process is still single-threaded.
*/

pub use self::app::*;
pub use self::config_files::*;
pub use self::errors::*;
pub use self::loader::{Config, ConfigLoader, Loader, LoggingRegistry, MAIN_LOGGER};
pub use self::options::*;
pub use self::privdrop::*;
pub use self::sysuser::*;

mod app;
mod config_files;
mod errors;
mod loader;
pub mod logger;
mod options;
mod privdrop;
mod sysuser;
pub mod testing;

/// Reexported dependencies for use in consuming crates.
///
/// This module provides access to the underlying dependencies used by this crate,
/// allowing consumers to utilize the same versions without specifying them separately.
///
/// ## Available Reexports
///
/// - `libc`: Low-level bindings to the C standard library
/// - `nix`: Rust friendly bindings to *nix APIs with user and filesystem features
pub mod reexports {
    pub use {libc, nix};
}
