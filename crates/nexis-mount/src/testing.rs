//! In-memory stand-ins for the mount tools and the OS mount table.
//!
//! [`FakeMountSystem`] implements both [`CommandRunner`] and [`MountTable`]
//! over one shared state, so a manager built with it behaves like one talking
//! to a real NEXIS client without touching the real mount table.
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use nexis_mount::{Credentials, WorkspaceManager};
//! use nexis_mount::testing::{FakeMountSystem, ToolBehavior};
//!
//! let root = tempfile::tempdir().unwrap();
//! let fake = FakeMountSystem::new();
//! let manager = WorkspaceManager::builder(Credentials::new("nexis", "editor", "pw"))
//!     .mount_root(root.path())
//!     .runner(Arc::new(fake.clone()))
//!     .mount_table(Arc::new(fake.clone()))
//!     .build()
//!     .unwrap();
//!
//! fake.set_unmount_behavior(ToolBehavior::Fail { code: 16, stderr: "Resource busy".into() });
//! let handle = manager.mount("ProjectX", true).unwrap();
//! assert!(manager.unmount(&handle).is_err());
//! ```

use std::collections::HashSet;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::command::{CommandRunner, ToolOutput};
use crate::mount_table::MountTable;

/// How a fake tool responds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ToolBehavior {
    /// Exit 0 and change the mount state
    #[default]
    Succeed,
    /// Exit with `code` and `stderr`, leaving the mount state alone
    Fail {
        /// Exit code to report
        code: i32,
        /// Standard error to report
        stderr: String,
    },
    /// Exit 0 without changing the mount state
    Lie,
    /// Fail to launch with an I/O error of this kind
    LaunchError(io::ErrorKind),
}

/// One recorded tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program that was run
    pub program: PathBuf,
    /// Arguments it received
    pub args: Vec<OsString>,
}

impl Invocation {
    /// Whether this was a mount tool call (it carries `-U`).
    pub fn is_mount(&self) -> bool {
        self.args.iter().any(|a| a == "-U")
    }

    /// The mount point argument (always last).
    pub fn mount_point(&self) -> Option<&Path> {
        self.args.last().map(Path::new)
    }
}

#[derive(Debug, Default)]
struct FakeState {
    mounted: HashSet<PathBuf>,
    mount_behavior: ToolBehavior,
    unmount_behavior: ToolBehavior,
    invocations: Vec<Invocation>,
}

/// Simulated NEXIS client and mount table.
///
/// The mount tool creates the target directory and marks it mounted; the
/// unmount tool unmarks it and removes the directory, like the macOS client
/// does under `/Volumes`. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeMountSystem {
    state: Arc<Mutex<FakeState>>,
}

impl FakeMountSystem {
    /// A system where every tool call succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the mount tool.
    pub fn set_mount_behavior(&self, behavior: ToolBehavior) {
        self.state.lock().mount_behavior = behavior;
    }

    /// Script the unmount tool.
    pub fn set_unmount_behavior(&self, behavior: ToolBehavior) {
        self.state.lock().unmount_behavior = behavior;
    }

    /// Mark a path as mounted or not, as if someone outside the manager did it.
    pub fn set_mounted(&self, path: &Path, mounted: bool) {
        let mut state = self.state.lock();
        if mounted {
            state.mounted.insert(path.to_path_buf());
        } else {
            state.mounted.remove(path);
        }
    }

    /// Every tool call so far, oldest first.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().invocations.clone()
    }

    /// Unmount tool calls so far.
    pub fn unmount_invocations(&self) -> Vec<Invocation> {
        self.invocations()
            .into_iter()
            .filter(|i| !i.is_mount())
            .collect()
    }

    /// Currently mounted paths.
    pub fn mounted_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.state.lock().mounted.iter().cloned().collect();
        paths.sort();
        paths
    }
}

impl CommandRunner for FakeMountSystem {
    fn run(&self, program: &Path, args: &[OsString]) -> io::Result<ToolOutput> {
        let invocation = Invocation {
            program: program.to_path_buf(),
            args: args.to_vec(),
        };
        let is_mount = invocation.is_mount();
        let target = invocation.mount_point().map(Path::to_path_buf);

        let mut state = self.state.lock();
        state.invocations.push(invocation);
        let behavior = if is_mount {
            state.mount_behavior.clone()
        } else {
            state.unmount_behavior.clone()
        };

        match behavior {
            ToolBehavior::Succeed => {
                if let Some(target) = target {
                    if is_mount {
                        std::fs::create_dir_all(&target)?;
                        state.mounted.insert(target);
                    } else {
                        state.mounted.remove(&target);
                        let _ = std::fs::remove_dir(&target);
                    }
                }
                Ok(ToolOutput::success())
            }
            ToolBehavior::Fail { code, stderr } => Ok(ToolOutput::failure(code, stderr)),
            ToolBehavior::Lie => Ok(ToolOutput::success()),
            ToolBehavior::LaunchError(kind) => Err(io::Error::new(kind, "simulated launch failure")),
        }
    }
}

impl MountTable for FakeMountSystem {
    fn is_mounted(&self, path: &Path) -> bool {
        self.state.lock().mounted.contains(path)
    }
}
