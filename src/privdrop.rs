use nix::unistd::Uid;
use tracing::{debug, info};

use crate::errors::*;
use crate::sysuser::{SysUserOperations, SystemUserOperations, UserEntry};

/// Switch the process to `user`, given as a login name or a numeric id.
///
/// With `permanent` set, real and effective ids are both changed and the
/// process must currently run as root. Otherwise only the effective ids
/// change, and the real ids stay available to switch back.
pub fn set_user(
    user: &str,
    permanent: bool,
    ops: &dyn SysUserOperations,
) -> Result<(), PrivDropError> {
    let mut privdrop = PrivDrop::default().user(user);
    if !permanent {
        privdrop = privdrop.effective_only();
    }
    privdrop.apply_with(ops)
}

/// PrivDrop structure
///
/// # Example
/// ```no_run
/// use proxy_bootstrap::PrivDrop;
///
/// PrivDrop::default().user("_dbproxy").apply().unwrap();
/// ```
#[derive(Clone, Debug)]
pub struct PrivDrop {
    user: Option<String>,
    mode: ChangeMode,
}

impl Default for PrivDrop {
    fn default() -> Self {
        PrivDrop {
            user: None,
            mode: ChangeMode::Permanent,
        }
    }
}

impl PrivDrop {
    /// Set the name or numeric id of a user to switch to
    pub fn user<T: AsRef<str>>(mut self, user: T) -> Self {
        self.user = Some(user.as_ref().to_owned());
        self
    }

    /// Only change the effective ids, keeping the real ones
    pub fn effective_only(mut self) -> Self {
        self.mode = ChangeMode::Effective;
        self
    }

    /// Apply the changes to the running process
    pub fn apply(self) -> Result<(), PrivDropError> {
        self.apply_with(&SystemUserOperations)
    }

    /// Apply the changes through the given identity primitives
    pub fn apply_with(self, ops: &dyn SysUserOperations) -> Result<(), PrivDropError> {
        let user = match self.user {
            None => return Ok(()),
            Some(ref user) => user,
        };
        self.do_rootcheck(ops)?;
        let entry = lookup_user(user, ops).ok_or_else(|| PrivDropError::UnknownUser(user.clone()))?;
        self.do_idchange(&entry, ops)
    }

    fn do_rootcheck(&self, ops: &dyn SysUserOperations) -> Result<(), PrivDropError> {
        if self.mode == ChangeMode::Permanent && !ops.geteuid().is_root() {
            return Err(PrivDropError::NotRoot);
        }
        Ok(())
    }

    fn do_idchange(
        &self,
        entry: &UserEntry,
        ops: &dyn SysUserOperations,
    ) -> Result<(), PrivDropError> {
        let mode = self.mode;
        ops.initgroups(&entry.name, entry.gid)
            .map_err(PrivDropError::syscall(IdCall::InitGroups, mode))?;
        // the group has to go first: without root we could no longer change it
        match mode {
            ChangeMode::Permanent => {
                ops.setgid(entry.gid)
                    .map_err(PrivDropError::syscall(IdCall::Group, mode))?;
                ops.setuid(entry.uid)
                    .map_err(PrivDropError::syscall(IdCall::User, mode))?;
            }
            ChangeMode::Effective => {
                ops.setegid(entry.gid)
                    .map_err(PrivDropError::syscall(IdCall::Group, mode))?;
                ops.seteuid(entry.uid)
                    .map_err(PrivDropError::syscall(IdCall::User, mode))?;
            }
        }
        info!(
            user = %entry.name,
            uid = entry.uid.as_raw(),
            gid = entry.gid.as_raw(),
            permanent = mode == ChangeMode::Permanent,
            "switched process identity"
        );
        Ok(())
    }
}

/// Look `user` up by name, then by numeric id if it is all digits.
fn lookup_user(user: &str, ops: &dyn SysUserOperations) -> Option<UserEntry> {
    if let Some(entry) = ops.getpwnam(user) {
        return Some(entry);
    }
    if user.is_empty() || !user.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let uid = user.parse::<libc::uid_t>().ok()?;
    debug!(uid, "no user named '{}', trying it as an id", user);
    ops.getpwuid(Uid::from_raw(uid))
}
