use std::ffi::CString;

use nix::errno::Errno;
use nix::unistd::{self, Gid, Uid, User};

/// The parts of a password database entry needed to switch to an account
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserEntry {
    pub name: String,
    pub uid: Uid,
    pub gid: Gid,
}

impl UserEntry {
    pub fn new<T: AsRef<str>>(name: T, uid: libc::uid_t, gid: libc::gid_t) -> Self {
        UserEntry {
            name: name.as_ref().to_owned(),
            uid: Uid::from_raw(uid),
            gid: Gid::from_raw(gid),
        }
    }
}

impl From<User> for UserEntry {
    fn from(user: User) -> Self {
        UserEntry {
            name: user.name,
            uid: user.uid,
            gid: user.gid,
        }
    }
}

/// Process identity primitives used when switching users
///
/// Everything that reads or changes the identity of the process goes through
/// this trait, so that the switching logic can be exercised without being root.
/// [`SystemUserOperations`] is the real implementation; [`crate::testing`]
/// provides a recording double.
pub trait SysUserOperations {
    fn geteuid(&self) -> Uid;
    fn getpwnam(&self, name: &str) -> Option<UserEntry>;
    fn getpwuid(&self, uid: Uid) -> Option<UserEntry>;
    fn initgroups(&self, name: &str, gid: Gid) -> nix::Result<()>;
    fn setgid(&self, gid: Gid) -> nix::Result<()>;
    fn setuid(&self, uid: Uid) -> nix::Result<()>;
    fn setegid(&self, gid: Gid) -> nix::Result<()>;
    fn seteuid(&self, uid: Uid) -> nix::Result<()>;
}

/// Identity primitives backed by the C library
#[derive(Default, Clone, Copy, Debug)]
pub struct SystemUserOperations;

impl SysUserOperations for SystemUserOperations {
    fn geteuid(&self) -> Uid {
        unistd::geteuid()
    }

    fn getpwnam(&self, name: &str) -> Option<UserEntry> {
        User::from_name(name).ok().flatten().map(UserEntry::from)
    }

    fn getpwuid(&self, uid: Uid) -> Option<UserEntry> {
        User::from_uid(uid).ok().flatten().map(UserEntry::from)
    }

    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    fn initgroups(&self, name: &str, gid: Gid) -> nix::Result<()> {
        let name = CString::new(name).map_err(|_| Errno::EINVAL)?;
        unistd::initgroups(&name, gid)
    }

    // nix does not expose initgroups on Apple targets, where the base group is an int
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    fn initgroups(&self, name: &str, gid: Gid) -> nix::Result<()> {
        let name = CString::new(name).map_err(|_| Errno::EINVAL)?;
        let res = unsafe { libc::initgroups(name.as_ptr(), gid.as_raw() as libc::c_int) };
        Errno::result(res).map(drop)
    }

    fn setgid(&self, gid: Gid) -> nix::Result<()> {
        unistd::setgid(gid)
    }

    fn setuid(&self, uid: Uid) -> nix::Result<()> {
        unistd::setuid(uid)
    }

    fn setegid(&self, gid: Gid) -> nix::Result<()> {
        unistd::setegid(gid)
    }

    fn seteuid(&self, uid: Uid) -> nix::Result<()> {
        unistd::seteuid(uid)
    }
}
