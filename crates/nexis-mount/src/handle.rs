//! Handles to mounted workspaces.
//!
//! A [`MountHandle`] is an immutable record of one mount. It points back at
//! its manager through a `Weak` reference, so holding a handle never keeps
//! the manager alive; the manager stays the sole owner of the mount
//! lifecycle and the handle only asks it to act.
//!
//! # Scoped Release
//!
//! [`MountGuard`] unmounts its handle when dropped, including while a panic
//! unwinds through the scope. Errors during that release are logged, never
//! propagated, so they cannot mask whatever ended the scope. Call
//! [`MountGuard::release`] instead to observe the unmount result.

use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Weak;

use crate::error::{Result, WorkspaceError};
use crate::manager::Registry;

/// An active workspace mount.
///
/// Created only by [`WorkspaceManager::mount`](crate::WorkspaceManager::mount).
/// Two handles are equal when they describe the same mount point of the
/// same manager with the same workspace and access mode.
#[derive(Clone)]
pub struct MountHandle {
    manager: Weak<Registry>,
    workspace: String,
    mount_point: PathBuf,
    read_only: bool,
}

impl MountHandle {
    pub(crate) fn new(
        manager: Weak<Registry>,
        workspace: impl Into<String>,
        mount_point: PathBuf,
        read_only: bool,
    ) -> Self {
        Self {
            manager,
            workspace: workspace.into(),
            mount_point,
            read_only,
        }
    }

    /// The remote workspace name.
    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    /// Same as [`workspace`](Self::workspace).
    pub fn name(&self) -> &str {
        &self.workspace
    }

    /// Where the workspace is attached locally.
    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Whether the workspace was mounted with `-o rdonly`.
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// Ask the owning manager to unmount this workspace.
    ///
    /// # Errors
    ///
    /// [`WorkspaceError::UnmanagedHandle`] if the manager is gone or no longer
    /// tracks this handle, otherwise whatever
    /// [`WorkspaceManager::unmount`](crate::WorkspaceManager::unmount) returns.
    pub fn unmount(&self) -> Result<()> {
        match self.manager.upgrade() {
            Some(registry) => registry.unmount(self),
            None => Err(WorkspaceError::UnmanagedHandle(self.mount_point.clone())),
        }
    }

    /// Wrap this handle so it is unmounted when the guard goes out of scope.
    pub fn into_guard(self) -> MountGuard {
        MountGuard {
            handle: self,
            armed: true,
        }
    }

    pub(crate) fn belongs_to(&self, manager: &Weak<Registry>) -> bool {
        self.manager.ptr_eq(manager)
    }
}

impl PartialEq for MountHandle {
    fn eq(&self, other: &Self) -> bool {
        self.manager.ptr_eq(&other.manager)
            && self.mount_point == other.mount_point
            && self.workspace == other.workspace
            && self.read_only == other.read_only
    }
}

impl Eq for MountHandle {}

impl fmt::Debug for MountHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountHandle")
            .field("workspace", &self.workspace)
            .field("mount_point", &self.mount_point)
            .field("read_only", &self.read_only)
            .field("manager_alive", &(self.manager.strong_count() > 0))
            .finish()
    }
}

impl fmt::Display for MountHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {}{}",
            self.workspace,
            self.mount_point.display(),
            if self.read_only { " (read-only)" } else { "" }
        )
    }
}

/// Unmounts its [`MountHandle`] when dropped.
#[must_use = "dropping the guard unmounts the workspace immediately"]
pub struct MountGuard {
    handle: MountHandle,
    armed: bool,
}

impl MountGuard {
    /// The guarded handle.
    pub fn handle(&self) -> &MountHandle {
        &self.handle
    }

    /// Unmount now and report the result.
    pub fn release(mut self) -> Result<()> {
        self.armed = false;
        self.handle.unmount()
    }

    /// Stop guarding and hand back the handle without unmounting.
    pub fn into_inner(mut self) -> MountHandle {
        self.armed = false;
        self.handle.clone()
    }
}

impl Deref for MountGuard {
    type Target = MountHandle;

    fn deref(&self) -> &MountHandle {
        &self.handle
    }
}

impl fmt::Debug for MountGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountGuard")
            .field("handle", &self.handle)
            .field("armed", &self.armed)
            .finish()
    }
}

impl Drop for MountGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.handle.unmount() {
            tracing::warn!("Unable to close {}: {}", self.handle, e);
        }
    }
}
