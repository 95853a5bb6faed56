//! A scripted [`SysUserOperations`] double.
//!
//! [`MockUserOperations`] answers lookups from a fixed table, fails the
//! syscalls it was told to fail, and records every call in order so tests
//! can assert on the exact sequence of identity changes.
//!
//! ```
//! use proxy_bootstrap::testing::{Call, MockUserOperations};
//! use proxy_bootstrap::{set_user, UserEntry};
//!
//! let ops = MockUserOperations::root().with_user(UserEntry::new("mysqluser", 17, 12));
//! set_user("mysqluser", true, &ops).unwrap();
//! assert_eq!(
//!     ops.calls(),
//!     vec![
//!         Call::Geteuid,
//!         Call::Getpwnam("mysqluser".into()),
//!         Call::Initgroups("mysqluser".into(), 12),
//!         Call::Setgid(12),
//!         Call::Setuid(17),
//!     ]
//! );
//! ```

use std::cell::RefCell;

use nix::errno::Errno;
use nix::unistd::{Gid, Uid};

use crate::sysuser::{SysUserOperations, UserEntry};

/// One recorded call, with raw ids for easy comparison
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Geteuid,
    Getpwnam(String),
    Getpwuid(libc::uid_t),
    Initgroups(String, libc::gid_t),
    Setgid(libc::gid_t),
    Setuid(libc::uid_t),
    Setegid(libc::gid_t),
    Seteuid(libc::uid_t),
}

/// Which setter should report a failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fail {
    Initgroups,
    Setgid,
    Setuid,
    Setegid,
    Seteuid,
}

#[derive(Debug)]
pub struct MockUserOperations {
    euid: Uid,
    users: Vec<UserEntry>,
    fail: Option<Fail>,
    calls: RefCell<Vec<Call>>,
}

impl MockUserOperations {
    pub fn with_euid(euid: libc::uid_t) -> Self {
        MockUserOperations {
            euid: Uid::from_raw(euid),
            users: Vec::new(),
            fail: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn root() -> Self {
        Self::with_euid(0)
    }

    pub fn with_user(mut self, user: UserEntry) -> Self {
        self.users.push(user);
        self
    }

    pub fn failing(mut self, fail: Fail) -> Self {
        self.fail = Some(fail);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn outcome(&self, which: Fail) -> nix::Result<()> {
        if self.fail == Some(which) {
            Err(Errno::EPERM)
        } else {
            Ok(())
        }
    }
}

impl SysUserOperations for MockUserOperations {
    fn geteuid(&self) -> Uid {
        self.record(Call::Geteuid);
        self.euid
    }

    fn getpwnam(&self, name: &str) -> Option<UserEntry> {
        self.record(Call::Getpwnam(name.to_owned()));
        self.users.iter().find(|u| u.name == name).cloned()
    }

    fn getpwuid(&self, uid: Uid) -> Option<UserEntry> {
        self.record(Call::Getpwuid(uid.as_raw()));
        self.users.iter().find(|u| u.uid == uid).cloned()
    }

    fn initgroups(&self, name: &str, gid: Gid) -> nix::Result<()> {
        self.record(Call::Initgroups(name.to_owned(), gid.as_raw()));
        self.outcome(Fail::Initgroups)
    }

    fn setgid(&self, gid: Gid) -> nix::Result<()> {
        self.record(Call::Setgid(gid.as_raw()));
        self.outcome(Fail::Setgid)
    }

    fn setuid(&self, uid: Uid) -> nix::Result<()> {
        self.record(Call::Setuid(uid.as_raw()));
        self.outcome(Fail::Setuid)
    }

    fn setegid(&self, gid: Gid) -> nix::Result<()> {
        self.record(Call::Setegid(gid.as_raw()));
        self.outcome(Fail::Setegid)
    }

    fn seteuid(&self, uid: Uid) -> nix::Result<()> {
        self.record(Call::Seteuid(uid.as_raw()));
        self.outcome(Fail::Seteuid)
    }
}
