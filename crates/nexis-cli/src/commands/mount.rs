//! Mount command - attach a workspace and hold it until the user lets go.
//!
//! The workspace stays mounted until Enter is pressed or the process gets
//! Ctrl-C / SIGTERM, then it is released through the scope guard. With stdin
//! at end of file only a signal releases it.

use std::io::{self, BufRead};
use std::sync::mpsc;
use std::thread;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use crate::auth::PasswordOptions;
use crate::Settings;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Remote workspace name
    pub workspace: String,

    /// Mount read-write (the default is read-only)
    #[arg(long)]
    pub read_write: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Release {
    Enter,
    Signal,
}

#[instrument(level = "info", name = "cmd::mount", skip_all, fields(workspace = %args.workspace))]
pub fn execute(args: &Args, settings: &Settings, password_opts: &PasswordOptions) -> Result<()> {
    let manager = settings.connect(password_opts)?;

    // Installed before mounting so an early Ctrl-C still unmounts
    let (tx, rx) = mpsc::channel();
    let signal_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = signal_tx.send(Release::Signal);
    })
    .context("Failed to set signal handler")?;

    let guard = manager
        .mount_scoped(&args.workspace, !args.read_write)
        .with_context(|| format!("Failed to mount {}", args.workspace))?;

    println!("{}", guard.mount_point().display());
    if !settings.quiet {
        eprintln!("Mounted {}. Press Enter or Ctrl-C to unmount.", guard.handle());
    }

    thread::spawn(move || {
        let mut line = String::new();
        if matches!(io::stdin().lock().read_line(&mut line), Ok(n) if n > 0) {
            let _ = tx.send(Release::Enter);
        }
    });

    let reason = rx.recv().unwrap_or(Release::Signal);
    tracing::debug!(?reason, "Releasing workspace");
    if reason == Release::Signal && !settings.quiet {
        eprintln!();
        eprintln!("Received interrupt, unmounting...");
    }

    let mount_point = guard.mount_point().to_path_buf();
    guard
        .release()
        .with_context(|| format!("Failed to unmount {}", mount_point.display()))?;

    if !settings.quiet {
        eprintln!("Unmounted {}", mount_point.display());
    }
    Ok(())
}
