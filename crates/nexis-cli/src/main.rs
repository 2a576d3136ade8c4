#![deny(unsafe_code)]

// Use mimalloc for reduced allocation latency (enabled by default).
#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod auth;
mod commands;
mod config;
mod exit_code;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nexis_mount::{Credentials, WorkspaceError, WorkspaceManager, DEFAULT_MOUNT_ROOT};

use crate::auth::PasswordOptions;
use crate::commands::{completions, exec, mount, mounts, path, CommandExit};
use crate::config::Config;

/// Mount Avid NEXIS workspaces and make sure they get unmounted again
#[derive(Parser)]
#[command(name = "nexis")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Mount a workspace read-only until Enter or Ctrl-C
    nexis --server nexis.example.com --username editor mount ProjectX

    # Mount read-write, run a command inside, then unmount
    echo \"$SECRET\" | nexis --password-stdin exec ProjectX --read-write -- rsync -a ./renders/ .

    # Show where a workspace would be mounted
    nexis path ProjectX

    # List NEXIS mounts under the mount root
    nexis mounts --json
")]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// NEXIS server host name
    #[arg(long, env = "NEXIS_SERVER", global = true)]
    server: Option<String>,

    /// NEXIS user name
    #[arg(short, long, env = "NEXIS_USERNAME", global = true)]
    username: Option<String>,

    /// Directory under which workspaces are mounted [default: /Volumes]
    #[arg(long, value_name = "DIR", env = "NEXIS_MOUNT_ROOT", global = true)]
    mount_root: Option<PathBuf>,

    /// NEXIS password (insecure, prefer --password-stdin or NEXIS_PASSWORD)
    #[arg(long, env = "NEXIS_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Read password from stdin (single line)
    #[arg(long, conflicts_with = "password", global = true)]
    password_stdin: bool,

    #[command(subcommand)]
    command: Commands,
}

impl From<&Cli> for PasswordOptions {
    fn from(cli: &Cli) -> Self {
        Self {
            password: cli.password.clone(),
            password_stdin: cli.password_stdin,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Mount a workspace and hold it until Enter or Ctrl-C
    Mount(mount::Args),

    /// Mount a workspace, run a command inside it, then unmount
    Exec(exec::Args),

    /// Print the mount point a workspace would get
    Path(path::Args),

    /// List NEXIS mounts under the mount root
    Mounts(mounts::Args),

    /// Generate shell completions
    Completions(completions::Args),
}

/// Connection settings after merging flags, environment and config file
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: Option<String>,
    pub username: Option<String>,
    pub mount_root: PathBuf,
    pub config: Config,
    pub quiet: bool,
}

impl Settings {
    fn resolve(cli: &Cli, config: Config) -> Self {
        let mount_root = cli
            .mount_root
            .clone()
            .or_else(|| config.mount_root.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MOUNT_ROOT));
        Self {
            server: cli.server.clone().or_else(|| config.server.clone()),
            username: cli.username.clone().or_else(|| config.username.clone()),
            mount_root,
            config,
            quiet: cli.quiet,
        }
    }

    /// Ask for the password and build a manager for this session.
    pub fn connect(&self, password_opts: &PasswordOptions) -> Result<WorkspaceManager> {
        let Some(server) = self.server.as_deref() else {
            return Err(UsageError("No server given (use --server or NEXIS_SERVER)").into());
        };
        let Some(username) = self.username.as_deref() else {
            return Err(UsageError("No username given (use --username or NEXIS_USERNAME)").into());
        };

        let password = auth::get_password(password_opts, username, server)?;

        let manager = WorkspaceManager::builder(Credentials::new(server, username, password))
            .mount_root(&self.mount_root)
            .tools(self.config.tools.clone())
            .build()?;
        Ok(manager)
    }
}

/// Missing or contradictory settings
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct UsageError(pub &'static str);

fn main() -> ExitCode {
    let cli = Cli::parse();
    let quiet = cli.quiet;

    match run(cli) {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            // The child already reported its own failure
            if let Some(exit) = e.downcast_ref::<CommandExit>() {
                return ExitCode::from(exit.code());
            }

            let code = categorize_error(&e);
            if !quiet {
                eprintln!("Error: {e:#}");
            }
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if !cli.quiet {
        setup_tracing(cli.verbose);
    }

    // Completions never need connection settings
    if let Commands::Completions(args) = &cli.command {
        return completions::execute(args);
    }

    let password_opts = PasswordOptions::from(&cli);
    let settings = Settings::resolve(&cli, Config::load()?);

    match cli.command {
        Commands::Mount(args) => mount::execute(&args, &settings, &password_opts),
        Commands::Exec(args) => exec::execute(&args, &settings, &password_opts),
        Commands::Path(args) => path::execute(&args, &settings),
        Commands::Mounts(args) => mounts::execute(&args, &settings),
        Commands::Completions(_) => Ok(()),
    }
}

/// Set up tracing/logging based on verbosity level
fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}

/// Categorize an error into an exit code using typed error downcasting
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if cause.downcast_ref::<UsageError>().is_some() {
            return exit_code::USAGE_ERROR;
        }

        if let Some(ws_err) = cause.downcast_ref::<WorkspaceError>() {
            return match ws_err {
                WorkspaceError::MountRootNotFound(_) => exit_code::NOT_FOUND,
                WorkspaceError::InvalidWorkspaceName(_) => exit_code::USAGE_ERROR,
                WorkspaceError::MountFailed { .. }
                | WorkspaceError::MountPointInUse(_)
                | WorkspaceError::NoFreeMountPoint { .. } => exit_code::MOUNT_FAILED,
                WorkspaceError::UnmountFailed { .. } | WorkspaceError::UnmanagedHandle(_) => {
                    exit_code::UNMOUNT_FAILED
                }
                WorkspaceError::Tool { source, .. } => match source.kind() {
                    io::ErrorKind::NotFound => exit_code::NOT_FOUND,
                    io::ErrorKind::PermissionDenied => exit_code::PERMISSION_DENIED,
                    _ => exit_code::GENERAL_ERROR,
                },
            };
        }

        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::PermissionDenied => return exit_code::PERMISSION_DENIED,
                io::ErrorKind::NotFound => return exit_code::NOT_FOUND,
                io::ErrorKind::Interrupted => return exit_code::CANCELLED,
                _ => {}
            }
        }
    }

    let msg = format!("{e:#}").to_lowercase();
    if msg.contains("cancelled") || msg.contains("interrupted") {
        exit_code::CANCELLED
    } else {
        exit_code::GENERAL_ERROR
    }
}
