//! Subcommand implementations.

pub mod completions;
pub mod exec;
pub mod mount;
pub mod mounts;
pub mod path;

/// A child command exited unsuccessfully; `nexis` exits with the same code.
#[derive(Debug, thiserror::Error)]
#[error("Command exited with status {0}")]
pub struct CommandExit(pub i32);

impl CommandExit {
    /// Exit code for the process; signals and out-of-range codes map to 1.
    pub fn code(&self) -> u8 {
        u8::try_from(self.0).unwrap_or(1)
    }
}
