//! Exec command - mount a workspace, run a command inside it, then unmount.
//!
//! Example:
//! ```bash
//! nexis exec ProjectX -- ls -la
//! nexis exec ProjectX --read-write -- rsync -a ~/renders/ .
//! nexis exec ProjectX -- bash  # interactive shell
//! ```

use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use crate::auth::PasswordOptions;
use crate::commands::CommandExit;
use crate::Settings;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Remote workspace name
    pub workspace: String,

    /// Mount read-write (the default is read-only)
    #[arg(long)]
    pub read_write: bool,

    /// Command and arguments to execute
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

#[instrument(level = "info", name = "cmd::exec", skip_all, fields(workspace = %args.workspace))]
pub fn execute(args: &Args, settings: &Settings, password_opts: &PasswordOptions) -> Result<()> {
    let (program, cmd_args) = args
        .command
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("No command specified"))?;

    let manager = settings.connect(password_opts)?;

    // The child gets the terminal's SIGINT; we stay alive to unmount
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let guard = manager
        .mount_scoped(&args.workspace, !args.read_write)
        .with_context(|| format!("Failed to mount {}", args.workspace))?;

    if !settings.quiet {
        eprintln!("Mounted {}", guard.handle());
        eprintln!("Running: {} {}", program, cmd_args.join(" "));
    }

    let status = Command::new(program)
        .args(cmd_args)
        .current_dir(guard.mount_point())
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status();

    if interrupted.load(Ordering::SeqCst) && !settings.quiet {
        eprintln!("Received interrupt, unmounting...");
    }

    let mount_point = guard.mount_point().to_path_buf();
    let released = guard
        .release()
        .with_context(|| format!("Failed to unmount {}", mount_point.display()));

    // Unmounted already, even if the command never started
    let status = status.with_context(|| format!("Failed to execute command: {program}"))?;
    released?;

    if status.success() {
        Ok(())
    } else {
        let code = status.code().unwrap_or(1);
        tracing::debug!(code, "Command failed");
        Err(CommandExit(code).into())
    }
}
