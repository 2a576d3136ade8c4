//! The workspace mount registry.
//!
//! [`WorkspaceManager`] owns the NEXIS credentials, the mount root and the
//! set of active mounts. Every mount and unmount goes through it:
//!
//! 1. `mount` picks a free directory under the mount root, runs the mount
//!    tool, confirms the OS reports a mount point there and registers a
//!    [`MountHandle`].
//! 2. `unmount` claims the handle out of the registry, runs the unmount tool
//!    and confirms the mount point is gone. The handle leaves the registry
//!    whether or not that works.
//! 3. `shutdown` (also run on drop) unmounts whatever is still registered.
//!
//! The registry is keyed by mount point and guarded by a mutex that is never
//! held while an external tool runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::command::{CommandRunner, SystemCommandRunner, ToolConfig, mount_args, unmount_args};
use crate::credentials::Credentials;
use crate::error::{Result, WorkspaceError};
use crate::handle::{MountGuard, MountHandle};
use crate::mount_table::{MountTable, SystemMountTable};
use crate::paths::{build_workspace_path, is_valid_workspace_name};

/// Default directory under which workspaces are mounted.
pub const DEFAULT_MOUNT_ROOT: &str = "/Volumes";

/// Mounts NEXIS workspaces and keeps track of them until they are unmounted.
///
/// # Example
///
/// ```no_run
/// use nexis_mount::WorkspaceManager;
///
/// let manager = WorkspaceManager::new("nexis.example.com", "editor", "secret", "/Volumes")?;
///
/// {
///     let ws = manager.mount_scoped("ProjectX", true)?;
///     println!("{} mounted at {}", ws.name(), ws.mount_point().display());
/// } // unmounted here
///
/// let report = manager.shutdown();
/// assert!(report.is_clean());
/// # Ok::<(), nexis_mount::WorkspaceError>(())
/// ```
pub struct WorkspaceManager {
    inner: Arc<Registry>,
}

/// State shared between the manager and the `Weak` references in its handles.
pub(crate) struct Registry {
    credentials: Credentials,
    mount_root: PathBuf,
    tools: ToolConfig,
    runner: Arc<dyn CommandRunner>,
    mount_table: Arc<dyn MountTable>,
    active: Mutex<HashMap<PathBuf, MountHandle>>,
}

/// Builder for [`WorkspaceManager`].
pub struct WorkspaceManagerBuilder {
    credentials: Credentials,
    mount_root: PathBuf,
    tools: ToolConfig,
    runner: Option<Arc<dyn CommandRunner>>,
    mount_table: Option<Arc<dyn MountTable>>,
}

/// Outcome of unmounting stray workspaces at shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Mount points that were released
    pub unmounted: Vec<PathBuf>,
    /// Mount points that could not be released, with the error message
    pub failed: Vec<(PathBuf, String)>,
}

impl SweepReport {
    /// Whether every stray mount was released (or there were none).
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of mounts the sweep touched.
    pub fn len(&self) -> usize {
        self.unmounted.len() + self.failed.len()
    }

    /// Whether there was nothing to sweep.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WorkspaceManagerBuilder {
    /// Start a builder with the default mount root and tools.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            mount_root: PathBuf::from(DEFAULT_MOUNT_ROOT),
            tools: ToolConfig::default(),
            runner: None,
            mount_table: None,
        }
    }

    /// Directory under which workspaces are mounted.
    #[must_use]
    pub fn mount_root(mut self, mount_root: impl Into<PathBuf>) -> Self {
        self.mount_root = mount_root.into();
        self
    }

    /// Mount/unmount tool paths and timeout.
    #[must_use]
    pub fn tools(mut self, tools: ToolConfig) -> Self {
        self.tools = tools;
        self
    }

    /// Replace the process runner (defaults to [`SystemCommandRunner`]).
    #[must_use]
    pub fn runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Replace the mount point check (defaults to [`SystemMountTable`]).
    #[must_use]
    pub fn mount_table(mut self, mount_table: Arc<dyn MountTable>) -> Self {
        self.mount_table = Some(mount_table);
        self
    }

    /// Validate the mount root and create the manager.
    ///
    /// # Errors
    ///
    /// [`WorkspaceError::MountRootNotFound`] if the mount root is not an
    /// existing directory.
    pub fn build(self) -> Result<WorkspaceManager> {
        if !self.mount_root.is_dir() {
            return Err(WorkspaceError::MountRootNotFound(self.mount_root));
        }

        let runner = self
            .runner
            .unwrap_or_else(|| Arc::new(SystemCommandRunner::with_timeout(self.tools.timeout)));
        let mount_table = self
            .mount_table
            .unwrap_or_else(|| Arc::new(SystemMountTable::new()));

        tracing::debug!(
            server = self.credentials.server(),
            username = self.credentials.username(),
            mount_root = %self.mount_root.display(),
            "Created workspace manager"
        );

        Ok(WorkspaceManager {
            inner: Arc::new(Registry {
                credentials: self.credentials,
                mount_root: self.mount_root,
                tools: self.tools,
                runner,
                mount_table,
                active: Mutex::new(HashMap::new()),
            }),
        })
    }
}

impl WorkspaceManager {
    /// Create a manager that uses the system mount tools.
    ///
    /// # Errors
    ///
    /// [`WorkspaceError::MountRootNotFound`] if `mount_root` is not an
    /// existing directory.
    pub fn new(
        server: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        mount_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        Self::builder(Credentials::new(server, username, password))
            .mount_root(mount_root)
            .build()
    }

    /// Start configuring a manager.
    pub fn builder(credentials: Credentials) -> WorkspaceManagerBuilder {
        WorkspaceManagerBuilder::new(credentials)
    }

    /// The login name used for mounts.
    pub fn username(&self) -> &str {
        self.inner.credentials.username()
    }

    /// The NEXIS server address.
    pub fn server(&self) -> &str {
        self.inner.credentials.server()
    }

    /// Directory under which workspaces are mounted.
    pub fn mount_root(&self) -> &Path {
        &self.inner.mount_root
    }

    /// The configured external tools.
    pub fn tools(&self) -> &ToolConfig {
        &self.inner.tools
    }

    /// Pick a free mount point for `workspace` under `root` (default: the mount root).
    ///
    /// # Errors
    ///
    /// [`WorkspaceError::NoFreeMountPoint`] if no candidate could be confirmed free.
    pub fn build_workspace_path(&self, workspace: &str, root: Option<&Path>) -> Result<PathBuf> {
        build_workspace_path(root.unwrap_or(&self.inner.mount_root), workspace)
    }

    /// Mount `workspace` at a fresh mount point.
    ///
    /// # Errors
    ///
    /// - [`WorkspaceError::InvalidWorkspaceName`] - name is not a single path component
    /// - [`WorkspaceError::NoFreeMountPoint`] - the allocator gave up
    /// - [`WorkspaceError::Tool`] - the mount tool could not be run
    /// - [`WorkspaceError::MountFailed`] - nonzero exit, or no mount point afterwards
    pub fn mount(&self, workspace: &str, read_only: bool) -> Result<MountHandle> {
        self.inner.mount(workspace, read_only)
    }

    /// Mount `workspace` and return a guard that unmounts it on drop.
    ///
    /// # Errors
    ///
    /// Same as [`mount`](Self::mount).
    pub fn mount_scoped(&self, workspace: &str, read_only: bool) -> Result<MountGuard> {
        self.mount(workspace, read_only).map(MountHandle::into_guard)
    }

    /// Unmount a workspace mounted by this manager.
    ///
    /// # Errors
    ///
    /// - [`WorkspaceError::UnmanagedHandle`] - the handle is not registered here
    /// - [`WorkspaceError::Tool`] - the unmount tool could not be run
    /// - [`WorkspaceError::UnmountFailed`] - nonzero exit, or still mounted afterwards
    ///
    /// Except for `UnmanagedHandle`, the handle is no longer registered after
    /// this returns.
    pub fn unmount(&self, handle: &MountHandle) -> Result<()> {
        self.inner.unmount(handle)
    }

    /// Mount a handle's workspace again at the handle's own mount point.
    ///
    /// Does nothing (apart from a warning) if the handle is registered and
    /// still mounted. A registered handle whose mount vanished is mounted
    /// again, as is a handle that was released earlier.
    ///
    /// # Errors
    ///
    /// - [`WorkspaceError::UnmanagedHandle`] - the handle came from another manager
    /// - [`WorkspaceError::MountPointInUse`] - a different handle owns the mount point
    /// - anything [`mount`](Self::mount) returns
    pub fn remount(&self, handle: &MountHandle) -> Result<()> {
        self.inner.remount(handle)
    }

    /// Whether `handle` is currently registered with this manager.
    pub fn is_active(&self, handle: &MountHandle) -> bool {
        self.inner.is_registered(handle)
    }

    /// Snapshot of all registered handles.
    pub fn active_mounts(&self) -> Vec<MountHandle> {
        let mut mounts: Vec<MountHandle> = self.inner.active.lock().values().cloned().collect();
        mounts.sort_by(|a, b| a.mount_point().cmp(b.mount_point()));
        mounts
    }

    /// Unmount every workspace still registered.
    ///
    /// Failures are logged and collected, never returned as errors. Safe to
    /// call more than once; the drop handler runs it again as a backstop.
    pub fn shutdown(&self) -> SweepReport {
        self.inner.sweep()
    }
}

impl std::fmt::Debug for WorkspaceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceManager")
            .field("credentials", &self.inner.credentials)
            .field("mount_root", &self.inner.mount_root)
            .field("tools", &self.inner.tools)
            .field("active", &self.inner.active.lock().len())
            .finish()
    }
}

impl Drop for WorkspaceManager {
    fn drop(&mut self) {
        let report = self.inner.sweep();
        if !report.is_empty() {
            tracing::info!(
                "Released {} stray workspace(s), {} failed",
                report.unmounted.len(),
                report.failed.len()
            );
        }
    }
}

impl Registry {
    fn weak(self: &Arc<Self>) -> Weak<Self> {
        Arc::downgrade(self)
    }

    fn is_registered(self: &Arc<Self>, handle: &MountHandle) -> bool {
        handle.belongs_to(&self.weak())
            && self
                .active
                .lock()
                .get(handle.mount_point())
                .is_some_and(|h| h == handle)
    }

    #[tracing::instrument(level = "info", skip(self), fields(mount_root = %self.mount_root.display()))]
    fn mount(self: &Arc<Self>, workspace: &str, read_only: bool) -> Result<MountHandle> {
        if !is_valid_workspace_name(workspace) {
            return Err(WorkspaceError::InvalidWorkspaceName(workspace.to_string()));
        }

        let mount_point = build_workspace_path(&self.mount_root, workspace)?;
        let handle = MountHandle::new(self.weak(), workspace, mount_point, read_only);
        self.attach(&handle)?;
        Ok(handle)
    }

    #[tracing::instrument(level = "info", skip_all, fields(workspace = handle.workspace(), mount_point = %handle.mount_point().display()))]
    fn remount(self: &Arc<Self>, handle: &MountHandle) -> Result<()> {
        if !handle.belongs_to(&self.weak()) {
            return Err(WorkspaceError::UnmanagedHandle(handle.mount_point().to_path_buf()));
        }

        let registered = self.active.lock().get(handle.mount_point()).cloned();
        match registered {
            Some(current) if &current == handle => {
                if self.mount_table.is_mounted(handle.mount_point()) {
                    tracing::warn!("Already mounted: {}", handle);
                    return Ok(());
                }
                tracing::warn!("Registered mount {} has vanished, mounting again", handle);
                self.active.lock().remove(handle.mount_point());
            }
            Some(_) => {
                return Err(WorkspaceError::MountPointInUse(
                    handle.mount_point().to_path_buf(),
                ));
            }
            None => {}
        }

        self.attach(handle)
    }

    /// Run the mount tool for `handle` and register it on success.
    fn attach(&self, handle: &MountHandle) -> Result<()> {
        let mount_point = handle.mount_point();
        let args = mount_args(
            self.credentials.username(),
            self.credentials.password(),
            self.credentials.server(),
            handle.workspace(),
            mount_point,
            handle.read_only(),
        );

        tracing::debug!(
            "Running {} for {}:{} -> {}",
            self.tools.mount_tool.display(),
            self.credentials.server(),
            handle.workspace(),
            mount_point.display()
        );

        let output = self
            .runner
            .run(&self.tools.mount_tool, &args)
            .map_err(|source| WorkspaceError::Tool {
                tool: self.tools.mount_tool.clone(),
                source,
            })?;

        let mounted = self.mount_table.is_mounted(mount_point);
        if !output.succeeded() || !mounted {
            if mounted {
                tracing::warn!(
                    "{} reports a mount point although the mount tool failed",
                    mount_point.display()
                );
            }
            return Err(WorkspaceError::MountFailed {
                workspace: handle.workspace().to_string(),
                mount_point: mount_point.to_path_buf(),
                status: output.status,
                stderr: output.stderr,
            });
        }

        self.active
            .lock()
            .insert(mount_point.to_path_buf(), handle.clone());
        tracing::info!("Mounted {}", handle);
        Ok(())
    }

    #[tracing::instrument(level = "info", skip_all, fields(workspace = handle.workspace(), mount_point = %handle.mount_point().display()))]
    pub(crate) fn unmount(self: &Arc<Self>, handle: &MountHandle) -> Result<()> {
        let mount_point = handle.mount_point();

        // Claim the entry first so a concurrent unmount of the same handle
        // sees it as unmanaged instead of running the tool twice.
        let claimed = handle.belongs_to(&self.weak()) && {
            let mut active = self.active.lock();
            if active.get(mount_point).is_some_and(|h| h == handle) {
                active.remove(mount_point);
                true
            } else {
                false
            }
        };
        if !claimed {
            return Err(WorkspaceError::UnmanagedHandle(mount_point.to_path_buf()));
        }

        if !self.mount_table.is_mounted(mount_point) {
            tracing::warn!("Already unmounted: {}", handle);
            return Ok(());
        }

        tracing::debug!(
            "Running {} {}",
            self.tools.unmount_tool.display(),
            mount_point.display()
        );

        let output = self
            .runner
            .run(&self.tools.unmount_tool, &unmount_args(mount_point))
            .map_err(|source| WorkspaceError::Tool {
                tool: self.tools.unmount_tool.clone(),
                source,
            })?;

        if !output.succeeded() || self.mount_table.is_mounted(mount_point) {
            return Err(WorkspaceError::UnmountFailed {
                workspace: handle.workspace().to_string(),
                mount_point: mount_point.to_path_buf(),
                status: output.status,
                stderr: output.stderr,
            });
        }

        tracing::info!("Unmounted {}", handle);
        Ok(())
    }

    fn sweep(self: &Arc<Self>) -> SweepReport {
        let stray: Vec<MountHandle> = self.active.lock().values().cloned().collect();
        let mut report = SweepReport::default();

        for handle in stray {
            tracing::warn!("Unmounting stray workspace {}...", handle);
            match self.unmount(&handle) {
                Ok(()) => report.unmounted.push(handle.mount_point().to_path_buf()),
                Err(e) => {
                    tracing::error!("Failed to unmount stray workspace {}: {}", handle, e);
                    report
                        .failed
                        .push((handle.mount_point().to_path_buf(), e.to_string()));
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMountSystem;
    use tempfile::TempDir;

    fn manager_with(fake: &FakeMountSystem, root: &Path) -> WorkspaceManager {
        WorkspaceManager::builder(Credentials::new("nexis.local", "editor", "pw"))
            .mount_root(root)
            .runner(Arc::new(fake.clone()))
            .mount_table(Arc::new(fake.clone()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_missing_mount_root_is_rejected() {
        let err = WorkspaceManager::new("nexis", "editor", "pw", "/nonexistent/nexis/root/12345")
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::MountRootNotFound(_)));
    }

    #[test]
    fn test_file_as_mount_root_is_rejected() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();

        let err = WorkspaceManager::new("nexis", "editor", "pw", &file).unwrap_err();
        assert!(matches!(err, WorkspaceError::MountRootNotFound(p) if p == file));
    }

    #[test]
    fn test_accessors_do_not_expose_password() {
        let temp = TempDir::new().unwrap();
        let manager = WorkspaceManager::new("nexis.local", "editor", "hunter2", temp.path()).unwrap();

        assert_eq!(manager.username(), "editor");
        assert_eq!(manager.server(), "nexis.local");
        assert_eq!(manager.mount_root(), temp.path());
        assert!(!format!("{manager:?}").contains("hunter2"));
    }

    #[test]
    fn test_build_workspace_path_with_explicit_root() {
        let temp = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let manager = WorkspaceManager::new("nexis", "editor", "pw", temp.path()).unwrap();

        assert_eq!(
            manager.build_workspace_path("ProjectX", Some(other.path())).unwrap(),
            other.path().join("ProjectX")
        );
        assert_eq!(
            manager.build_workspace_path("ProjectX", None).unwrap(),
            temp.path().join("ProjectX")
        );
    }

    #[test]
    fn test_invalid_workspace_name_never_runs_tool() {
        let temp = TempDir::new().unwrap();
        let fake = FakeMountSystem::new();
        let manager = manager_with(&fake, temp.path());

        let err = manager.mount("../etc", true).unwrap_err();
        assert!(matches!(err, WorkspaceError::InvalidWorkspaceName(_)));
        assert!(fake.invocations().is_empty());
    }

    #[test]
    fn test_mount_tool_receives_credentials() {
        let temp = TempDir::new().unwrap();
        let fake = FakeMountSystem::new();
        let manager = manager_with(&fake, temp.path());

        let handle = manager.mount("ProjectX", false).unwrap();

        let calls = fake.invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, PathBuf::from(crate::command::DEFAULT_MOUNT_TOOL));
        let args: Vec<String> = calls[0]
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-U".to_string(),
                "editor:pw".to_string(),
                "nexis.local:ProjectX".to_string(),
                handle.mount_point().display().to_string(),
            ]
        );
    }

    #[test]
    fn test_unmount_claims_handle_once() {
        let temp = TempDir::new().unwrap();
        let fake = FakeMountSystem::new();
        let manager = manager_with(&fake, temp.path());

        let handle = manager.mount("ProjectX", true).unwrap();
        manager.unmount(&handle).unwrap();

        let err = manager.unmount(&handle).unwrap_err();
        assert!(matches!(err, WorkspaceError::UnmanagedHandle(_)));
        // one mount, one unmount
        assert_eq!(fake.invocations().len(), 2);
    }

    #[test]
    fn test_sweep_report_counts() {
        let report = SweepReport {
            unmounted: vec![PathBuf::from("/Volumes/A")],
            failed: vec![(PathBuf::from("/Volumes/B"), "busy".to_string())],
        };
        assert_eq!(report.len(), 2);
        assert!(!report.is_clean());
        assert!(SweepReport::default().is_empty());
    }
}
