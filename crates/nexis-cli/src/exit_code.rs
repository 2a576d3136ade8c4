//! Process exit codes for the `nexis` binary.

/// Command completed
pub const SUCCESS: u8 = 0;

/// Anything not covered below
pub const GENERAL_ERROR: u8 = 1;

/// Invalid arguments or configuration (clap also uses 2)
pub const USAGE_ERROR: u8 = 2;

/// Mount root, tool or workspace name not found
pub const NOT_FOUND: u8 = 3;

/// The workspace could not be mounted
pub const MOUNT_FAILED: u8 = 4;

/// The workspace could not be unmounted
pub const UNMOUNT_FAILED: u8 = 5;

/// Permission denied
pub const PERMISSION_DENIED: u8 = 6;

/// Interrupted by the user
pub const CANCELLED: u8 = 130;
