//! External mount and unmount tool invocation.
//!
//! The manager never attaches filesystems itself. It builds an argument list
//! for the NEXIS mount utility (or `umount`), runs it through a
//! [`CommandRunner`] and inspects the exit status and standard error.
//!
//! [`SystemCommandRunner`] is the real implementation. Tests substitute
//! [`crate::testing::FakeMountSystem`].

use std::ffi::OsString;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default path of the NEXIS client mount utility.
pub const DEFAULT_MOUNT_TOOL: &str = "/usr/local/bin/mount_avid";

/// Default unmount utility (resolved through `PATH`).
pub const DEFAULT_UNMOUNT_TOOL: &str = "umount";

/// Which external tools to run and how long to wait for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Mount utility, invoked as `mount_tool [-o rdonly] -U user:pass server:workspace mount_point`
    pub mount_tool: PathBuf,
    /// Unmount utility, invoked as `unmount_tool mount_point`
    pub unmount_tool: PathBuf,
    /// Upper bound on a single tool invocation. `None` waits forever.
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            mount_tool: PathBuf::from(DEFAULT_MOUNT_TOOL),
            unmount_tool: PathBuf::from(DEFAULT_UNMOUNT_TOOL),
            timeout: None,
        }
    }
}

/// Outcome of one external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, or `None` if the process was terminated by a signal
    pub status: Option<i32>,
    /// Standard error, decoded as Latin-1 and trimmed
    pub stderr: String,
}

impl ToolOutput {
    /// A zero exit status.
    pub fn success() -> Self {
        Self {
            status: Some(0),
            stderr: String::new(),
        }
    }

    /// A failing exit status with diagnostic text.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            stderr: stderr.into(),
        }
    }

    /// Whether the tool reported success.
    pub fn succeeded(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs an external program to completion.
///
/// Implementations must be synchronous: the call returns only after the
/// program has exited (or been killed).
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, capturing its exit status and standard error.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the program could not be started or waited on.
    /// A timed-out invocation reports [`io::ErrorKind::TimedOut`].
    fn run(&self, program: &Path, args: &[OsString]) -> io::Result<ToolOutput>;
}

/// [`CommandRunner`] backed by `std::process::Command`.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner {
    timeout: Option<Duration>,
}

impl SystemCommandRunner {
    /// Create a runner that waits for tools indefinitely.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a runner that kills tools still running after `timeout`.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &Path, args: &[OsString]) -> io::Result<ToolOutput> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let Some(timeout) = self.timeout else {
            let output = child.wait_with_output()?;
            return Ok(ToolOutput {
                status: output.status.code(),
                stderr: decode_stderr(&output.stderr),
            });
        };

        let mut stderr_pipe = child.stderr.take();
        let child_id = child.id();
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            let mut stderr = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut stderr);
            }
            let result = child.wait().map(|status| (status, stderr));
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(Ok((status, stderr))) => Ok(ToolOutput {
                status: status.code(),
                stderr: decode_stderr(&stderr),
            }),
            Ok(Err(e)) => Err(e),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                kill_child(child_id);
                tracing::warn!(
                    "{} did not finish within {:?}, killed pid {}",
                    program.display(),
                    timeout,
                    child_id
                );
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("timed out after {timeout:?}"),
                ))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(io::Error::other(
                "tool wait thread terminated unexpectedly",
            )),
        }
    }
}

fn kill_child(child_id: u32) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(child_id) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGKILL) {
        tracing::debug!("Failed to kill pid {}: {}", child_id, e);
    }
}

/// Decode tool diagnostics byte-for-byte (Latin-1), so any output is printable.
pub fn decode_stderr(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect::<String>().trim().to_string()
}

/// Argument list for the mount tool.
///
/// The password is embedded in the `-U` argument; never log the result.
pub fn mount_args(
    username: &str,
    password: &str,
    server: &str,
    workspace: &str,
    mount_point: &Path,
    read_only: bool,
) -> Vec<OsString> {
    let mut args = Vec::with_capacity(6);
    if read_only {
        args.push(OsString::from("-o"));
        args.push(OsString::from("rdonly"));
    }
    args.push(OsString::from("-U"));
    args.push(OsString::from(format!("{username}:{password}")));
    args.push(OsString::from(format!("{server}:{workspace}")));
    args.push(mount_point.as_os_str().to_os_string());
    args
}

/// Argument list for the unmount tool.
pub fn unmount_args(mount_point: &Path) -> Vec<OsString> {
    vec![mount_point.as_os_str().to_os_string()]
}
