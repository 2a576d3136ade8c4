//! Mount lifecycle management for Avid NEXIS workspaces.
//!
//! This crate attaches remote NEXIS workspaces to local directories through
//! the NEXIS client's mount utility, remembers every mount it made, and
//! makes sure each one is released again.
//!
//! # Components
//!
//! - [`WorkspaceManager`] - Registry of active mounts; allocates mount points
//!   and runs the mount/unmount tools
//! - [`MountHandle`] - Immutable record of one active mount
//! - [`MountGuard`] - Scope guard that unmounts its handle on drop
//! - [`CommandRunner`] / [`SystemCommandRunner`] - External tool invocation
//! - [`MountTable`] / [`SystemMountTable`] - "Is this path mounted?" check
//! - [`WorkspaceError`] - Error type for all of the above
//!
//! # Guarantees
//!
//! - A mount only counts as successful when the tool exits 0 *and* the OS
//!   reports a mount point at the target.
//! - An unmount removes the handle from the registry even when it fails, so
//!   the registry never claims a mount point it lost control of.
//! - Whatever is still registered when the manager is shut down or dropped
//!   is unmounted on a best-effort basis.
//!
//! # Example
//!
//! ```no_run
//! use nexis_mount::{Credentials, ToolConfig, WorkspaceManager};
//! use std::time::Duration;
//!
//! let manager = WorkspaceManager::builder(Credentials::new("nexis.example.com", "editor", "secret"))
//!     .mount_root("/Volumes")
//!     .tools(ToolConfig {
//!         timeout: Some(Duration::from_secs(60)),
//!         ..ToolConfig::default()
//!     })
//!     .build()?;
//!
//! let handle = manager.mount("ProjectX", true)?;
//! for entry in std::fs::read_dir(handle.mount_point()).unwrap() {
//!     println!("{}", entry.unwrap().path().display());
//! }
//! manager.unmount(&handle)?;
//! # Ok::<(), nexis_mount::WorkspaceError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod command;
mod credentials;
mod error;
mod handle;
mod manager;
mod mount_table;
mod paths;

/// Fakes for exercising the manager without real mounts.
pub mod testing;

pub use command::{
    decode_stderr, mount_args, unmount_args, CommandRunner, SystemCommandRunner, ToolConfig,
    ToolOutput, DEFAULT_MOUNT_TOOL, DEFAULT_UNMOUNT_TOOL,
};
pub use credentials::Credentials;
pub use error::{Result, WorkspaceError};
pub use handle::{MountGuard, MountHandle};
pub use manager::{SweepReport, WorkspaceManager, WorkspaceManagerBuilder, DEFAULT_MOUNT_ROOT};
pub use mount_table::{
    is_mount_point, mounts_under, parse_linux_mount_line, parse_macos_mount_line, system_mounts,
    MountTable, SystemMount, SystemMountTable, DEFAULT_CHECK_TIMEOUT,
};
pub use paths::{
    build_workspace_path, is_valid_workspace_name, path_exists, DEFAULT_ACCESS_TIMEOUT,
    MAX_CHECK_TIMEOUTS, MAX_SUFFIX,
};
