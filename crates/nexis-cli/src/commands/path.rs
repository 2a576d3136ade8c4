//! Path command - print the mount point a workspace would get right now.

use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use nexis_mount::{build_workspace_path, is_valid_workspace_name, WorkspaceError};

use crate::Settings;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Remote workspace name
    pub workspace: String,
}

#[instrument(level = "info", name = "cmd::path", skip_all, fields(workspace = %args.workspace))]
pub fn execute(args: &Args, settings: &Settings) -> Result<()> {
    if !settings.mount_root.is_dir() {
        return Err(WorkspaceError::MountRootNotFound(settings.mount_root.clone()).into());
    }
    if !is_valid_workspace_name(&args.workspace) {
        return Err(WorkspaceError::InvalidWorkspaceName(args.workspace.clone()).into());
    }

    let mount_point = build_workspace_path(&settings.mount_root, &args.workspace)?;
    println!("{}", mount_point.display());
    Ok(())
}
