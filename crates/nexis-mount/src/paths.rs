//! Mount point allocation.
//!
//! Every workspace gets its own directory under the mount root. If
//! `root/ProjectX` is taken (mounted or not), the next candidates are
//! `root/ProjectX_1`, `root/ProjectX_2`, and so on.
//!
//! Allocation is a pure existence check. Nothing is reserved, so two
//! processes allocating the same workspace name at the same moment can pick
//! the same candidate; the loser's mount tool invocation fails.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use crate::error::{Result, WorkspaceError};

/// Default timeout for existence checks on candidate paths
pub const DEFAULT_ACCESS_TIMEOUT: Duration = Duration::from_millis(500);

/// Highest suffix tried before giving up (`root/W_999`)
pub const MAX_SUFFIX: u32 = 999;

/// Timed-out existence checks tolerated during one allocation
pub const MAX_CHECK_TIMEOUTS: u32 = 3;

/// Outcome of one bounded existence check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Presence {
    Exists,
    Missing,
    TimedOut,
}

/// Pick the first free mount point for `workspace` under `root`.
///
/// Tries `root/workspace`, then `root/workspace_1`, `root/workspace_2`, ...
/// and returns the first candidate that does not exist.
///
/// # Errors
///
/// [`WorkspaceError::NoFreeMountPoint`] when every suffix up to
/// [`MAX_SUFFIX`] is taken, or when [`MAX_CHECK_TIMEOUTS`] existence checks
/// did not answer in time.
pub fn build_workspace_path(root: &Path, workspace: &str) -> Result<PathBuf> {
    allocate(root, workspace, |candidate| {
        check_path(candidate, DEFAULT_ACCESS_TIMEOUT)
    })
}

pub(crate) fn allocate(
    root: &Path,
    workspace: &str,
    mut check: impl FnMut(&Path) -> Presence,
) -> Result<PathBuf> {
    let mut timeouts = 0;

    for idx in 0..=MAX_SUFFIX {
        let candidate = if idx == 0 {
            root.join(workspace)
        } else {
            let mut name = OsString::from(workspace);
            name.push(format!("_{idx}"));
            root.join(name)
        };

        match check(&candidate) {
            Presence::Missing => return Ok(candidate),
            Presence::Exists => {}
            Presence::TimedOut => {
                timeouts += 1;
                tracing::warn!(
                    "Existence check for {} timed out, skipping it",
                    candidate.display()
                );
                if timeouts >= MAX_CHECK_TIMEOUTS {
                    break;
                }
            }
        }
    }

    Err(WorkspaceError::NoFreeMountPoint {
        workspace: workspace.to_string(),
        root: root.to_path_buf(),
    })
}

/// Whether `workspace` can be used as a single directory name.
///
/// Rejects empty names, `.`/`..`, and anything containing a path separator,
/// since joining those onto the mount root would escape it.
pub fn is_valid_workspace_name(workspace: &str) -> bool {
    let mut components = Path::new(workspace).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(name)), None) if name == workspace
    )
}

/// Check whether a path exists, giving up after `timeout`.
///
/// A check that does not finish in time usually means a hung network mount
/// sits at `path`, so it counts as existing.
pub fn path_exists(path: &Path, timeout: Duration) -> bool {
    check_path(path, timeout) != Presence::Missing
}

pub(crate) fn check_path(path: &Path, timeout: Duration) -> Presence {
    let path_buf = path.to_path_buf();
    let (tx, rx) = mpsc::channel();

    std::thread::spawn(move || {
        // symlink_metadata so a dangling link still occupies the name
        let _ = tx.send(std::fs::symlink_metadata(&path_buf).is_ok());
    });

    match rx.recv_timeout(timeout) {
        Ok(true) => Presence::Exists,
        Ok(false) | Err(mpsc::RecvTimeoutError::Disconnected) => Presence::Missing,
        Err(mpsc::RecvTimeoutError::Timeout) => Presence::TimedOut,
    }
}
