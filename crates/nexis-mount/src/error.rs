//! Error type for workspace mount operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while mounting or unmounting NEXIS workspaces.
#[derive(Error, Debug)]
pub enum WorkspaceError {
    /// The configured mount root is missing or is not a directory.
    #[error("Mount root {} is not a valid directory", .0.display())]
    MountRootNotFound(PathBuf),

    /// The workspace name cannot be used as a directory name under the mount root.
    #[error("Invalid workspace name {0:?}")]
    InvalidWorkspaceName(String),

    /// No candidate mount point under the root could be confirmed free.
    #[error("No free mount point for {workspace} under {}", root.display())]
    NoFreeMountPoint {
        /// Remote workspace name
        workspace: String,
        /// Mount root that was searched
        root: PathBuf,
    },

    /// Another handle is registered at this mount point.
    #[error("Mount point {} is already in use by another workspace", .0.display())]
    MountPointInUse(PathBuf),

    /// The mount tool failed, or the mount point never showed up as mounted.
    #[error(
        "Could not mount {workspace} to {} (Err {}: {stderr})",
        mount_point.display(),
        format_status(*status)
    )]
    MountFailed {
        /// Remote workspace name
        workspace: String,
        /// Mount point that was attempted
        mount_point: PathBuf,
        /// Exit status of the mount tool (`None` if killed by a signal)
        status: Option<i32>,
        /// Decoded standard error of the mount tool
        stderr: String,
    },

    /// The handle is not tracked by this manager.
    #[error("Workspace at {} is not managed by this workspace manager", .0.display())]
    UnmanagedHandle(PathBuf),

    /// The unmount tool failed, or the mount point is still mounted.
    #[error(
        "Could not unmount {workspace} from {} (Err {}: {stderr})",
        mount_point.display(),
        format_status(*status)
    )]
    UnmountFailed {
        /// Remote workspace name
        workspace: String,
        /// Mount point that was being released
        mount_point: PathBuf,
        /// Exit status of the unmount tool (`None` if killed by a signal)
        status: Option<i32>,
        /// Decoded standard error of the unmount tool
        stderr: String,
    },

    /// The external tool could not be run to completion.
    #[error("Failed to run {}: {source}", tool.display())]
    Tool {
        /// Path of the tool that was invoked
        tool: PathBuf,
        /// Underlying launch or wait error (`TimedOut` when the deadline expired)
        #[source]
        source: io::Error,
    },
}

impl WorkspaceError {
    /// The mount point involved in this error, if any.
    pub fn mount_point(&self) -> Option<&std::path::Path> {
        match self {
            WorkspaceError::MountRootNotFound(_)
            | WorkspaceError::InvalidWorkspaceName(_)
            | WorkspaceError::NoFreeMountPoint { .. }
            | WorkspaceError::Tool { .. } => None,
            WorkspaceError::MountFailed { mount_point, .. }
            | WorkspaceError::UnmountFailed { mount_point, .. } => Some(mount_point),
            WorkspaceError::UnmanagedHandle(path) | WorkspaceError::MountPointInUse(path) => {
                Some(path)
            }
        }
    }

    /// Whether the external tool hit its configured deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, WorkspaceError::Tool { source, .. } if source.kind() == io::ErrorKind::TimedOut)
    }
}

fn format_status(status: Option<i32>) -> String {
    status.map_or_else(|| "signal".to_string(), |code| code.to_string())
}

/// Result alias for workspace operations.
pub type Result<T, E = WorkspaceError> = std::result::Result<T, E>;
