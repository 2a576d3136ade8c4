//! Operating-system view of which paths are mounted.
//!
//! The manager never trusts a tool's exit status alone: after every mount
//! and unmount it asks a [`MountTable`] whether the target path is a mount
//! point right now.
//!
//! # Platform Differences
//!
//! - **Stat**: device/inode comparison against the parent directory (all Unix)
//! - **Listing on macOS**: parse `mount` command output
//! - **Listing on Linux**: parse `/proc/mounts`

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use anyhow::Result;
#[cfg(any(target_os = "macos", target_os = "linux"))]
use anyhow::Context;

/// Default timeout for the mount point check.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_millis(500);

/// Answers "is this path currently a mount point?".
pub trait MountTable: Send + Sync {
    /// Whether `path` is an active mount point.
    fn is_mounted(&self, path: &Path) -> bool;
}

/// [`MountTable`] that asks the operating system.
#[derive(Debug, Clone)]
pub struct SystemMountTable {
    check_timeout: Duration,
}

impl SystemMountTable {
    /// Create a table with [`DEFAULT_CHECK_TIMEOUT`].
    pub fn new() -> Self {
        Self {
            check_timeout: DEFAULT_CHECK_TIMEOUT,
        }
    }

    /// Create a table with a custom timeout.
    pub fn with_check_timeout(check_timeout: Duration) -> Self {
        Self { check_timeout }
    }
}

impl Default for SystemMountTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MountTable for SystemMountTable {
    fn is_mounted(&self, path: &Path) -> bool {
        let path_buf = path.to_path_buf();
        let (tx, rx) = mpsc::channel();

        // stat on a hung network mount blocks, so check off-thread
        std::thread::spawn(move || {
            let _ = tx.send(is_mount_point(&path_buf));
        });

        match rx.recv_timeout(self.check_timeout) {
            Ok(mounted) => mounted,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "Mount check for {} timed out after {:?}, treating it as mounted",
                    path.display(),
                    self.check_timeout
                );
                true
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => false,
        }
    }
}

/// Device/inode mount point test.
///
/// A directory is a mount point when it lives on a different device than its
/// parent, or when it is its own parent (the filesystem root). Symlinks and
/// missing paths are never mount points.
#[cfg(unix)]
pub fn is_mount_point(path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    let Ok(meta) = std::fs::symlink_metadata(path) else {
        return false;
    };
    if meta.file_type().is_symlink() || !meta.is_dir() {
        return false;
    }
    let Ok(parent) = std::fs::symlink_metadata(path.join("..")) else {
        return false;
    };

    meta.dev() != parent.dev() || meta.ino() == parent.ino()
}

/// Mount table lookup for platforms without device numbers.
#[cfg(not(unix))]
pub fn is_mount_point(path: &Path) -> bool {
    system_mounts()
        .map(|mounts| mounts.iter().any(|m| m.mount_point == path))
        .unwrap_or(false)
}

/// One entry of the system mount table.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SystemMount {
    /// Where the filesystem is attached
    pub mount_point: PathBuf,
    /// Filesystem type (e.g. `avidfs`, `nfs`, `apfs`)
    pub fstype: String,
    /// Source device or remote resource
    pub source: String,
}

/// List every mounted filesystem.
pub fn system_mounts() -> Result<Vec<SystemMount>> {
    #[cfg(target_os = "macos")]
    {
        let output = std::process::Command::new("mount")
            .stdin(std::process::Stdio::null())
            .output()
            .context("Failed to run mount")?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().filter_map(parse_macos_mount_line).collect())
    }

    #[cfg(target_os = "linux")]
    {
        let contents =
            std::fs::read_to_string("/proc/mounts").context("Failed to read /proc/mounts")?;
        Ok(contents.lines().filter_map(parse_linux_mount_line).collect())
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Ok(Vec::new())
    }
}

/// List mounted filesystems whose mount point is directly inside `root`.
pub fn mounts_under(root: &Path) -> Result<Vec<SystemMount>> {
    Ok(system_mounts()?
        .into_iter()
        .filter(|m| m.mount_point.parent() == Some(root))
        .collect())
}

/// Parse one line of macOS `mount` output.
///
/// Format: `{source} on {mount_point} ({fstype}, {options...})`
pub fn parse_macos_mount_line(line: &str) -> Option<SystemMount> {
    let on_idx = line.find(" on ")?;
    let source = line[..on_idx].to_string();

    let rest = &line[on_idx + 4..];
    let paren_idx = rest.rfind(" (")?;
    let mount_point = PathBuf::from(&rest[..paren_idx]);

    let opts = rest[paren_idx + 2..].strip_suffix(')')?;
    let fstype = opts.split(',').next()?.trim().to_string();

    Some(SystemMount {
        mount_point,
        fstype,
        source,
    })
}

/// Parse one line of `/proc/mounts`.
///
/// Format: `{source} {mount_point} {fstype} {options} {dump} {pass}`
pub fn parse_linux_mount_line(line: &str) -> Option<SystemMount> {
    let mut parts = line.split_whitespace();
    let source = parts.next()?;
    let mount_point = parts.next()?;
    let fstype = parts.next()?;

    Some(SystemMount {
        mount_point: PathBuf::from(unescape_mount_path(mount_point)),
        fstype: fstype.to_string(),
        source: unescape_mount_path(source),
    })
}

/// Undo the octal escapes `/proc/mounts` uses for whitespace and backslashes.
fn unescape_mount_path(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let escape = bytes
            .get(i + 1..i + 4)
            .filter(|digits| bytes[i] == b'\\' && digits.iter().all(|b| (b'0'..=b'7').contains(b)))
            .and_then(|digits| {
                let code = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                u8::try_from(code).ok()
            });

        if let Some(code) = escape {
            out.push(code);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_plain_directory_is_not_mounted() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("ProjectX");
        std::fs::create_dir(&dir).unwrap();
        assert!(!is_mount_point(&dir));
        assert!(!SystemMountTable::new().is_mounted(&dir));
    }

    #[test]
    fn test_missing_path_is_not_mounted() {
        let table = SystemMountTable::new();
        assert!(!table.is_mounted(Path::new("/nonexistent/nexis/mount/12345")));
    }

    #[cfg(unix)]
    #[test]
    fn test_filesystem_root_is_mounted() {
        assert!(is_mount_point(Path::new("/")));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_is_not_mounted() {
        let temp = TempDir::new().unwrap();
        let link = temp.path().join("root-link");
        std::os::unix::fs::symlink("/", &link).unwrap();
        assert!(!is_mount_point(&link));
    }

    #[test]
    fn test_parse_macos_mount_line() {
        let line = "nexis.example.com:ProjectX on /Volumes/ProjectX (avidfs, nodev, nosuid, read-only)";
        let mount = parse_macos_mount_line(line).unwrap();

        assert_eq!(mount.source, "nexis.example.com:ProjectX");
        assert_eq!(mount.mount_point, PathBuf::from("/Volumes/ProjectX"));
        assert_eq!(mount.fstype, "avidfs");
    }

    #[test]
    fn test_parse_macos_mount_line_with_spaces() {
        let line = "nexis:Project X on /Volumes/Project X (avidfs, nodev)";
        let mount = parse_macos_mount_line(line).unwrap();

        assert_eq!(mount.mount_point, PathBuf::from("/Volumes/Project X"));
    }

    #[test]
    fn test_parse_macos_mount_line_garbage() {
        assert!(parse_macos_mount_line("not a mount line").is_none());
    }

    #[test]
    fn test_parse_linux_mount_line() {
        let line = "nexis:ProjectX /mnt/nexis/Project\\040X fuse.avid ro,nosuid,nodev 0 0";
        let mount = parse_linux_mount_line(line).unwrap();

        assert_eq!(mount.source, "nexis:ProjectX");
        assert_eq!(mount.mount_point, PathBuf::from("/mnt/nexis/Project X"));
        assert_eq!(mount.fstype, "fuse.avid");
    }

    #[test]
    fn test_parse_linux_mount_line_too_short() {
        assert!(parse_linux_mount_line("tmpfs /tmp").is_none());
    }

    #[test]
    fn test_unescape_mount_path() {
        assert_eq!(unescape_mount_path("/mnt/a\\040b\\040c"), "/mnt/a b c");
        assert_eq!(unescape_mount_path("/mnt/tab\\011"), "/mnt/tab\t");
        assert_eq!(unescape_mount_path("/mnt/back\\134slash"), "/mnt/back\\slash");
        // incomplete escapes pass through
        assert_eq!(unescape_mount_path("/mnt/odd\\04"), "/mnt/odd\\04");
        assert_eq!(unescape_mount_path("/mnt/plain"), "/mnt/plain");
    }
}
