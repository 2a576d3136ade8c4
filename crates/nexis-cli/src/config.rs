//! Configuration file support.
//!
//! Connection defaults live in `~/.config/nexis/config.toml` (or the
//! platform equivalent, or `$NEXIS_CONFIG_DIR/config.toml`):
//!
//! ```toml
//! server = "nexis.example.com"
//! username = "editor"
//! mount_root = "/Volumes"
//!
//! [tools]
//! mount_tool = "/usr/local/bin/mount_avid"
//! unmount_tool = "umount"
//! timeout = "2m"
//! ```
//!
//! The password is never read from this file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;

use nexis_mount::ToolConfig;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "NEXIS_CONFIG_DIR";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: Option<String>,
    pub username: Option<String>,
    pub mount_root: Option<PathBuf>,
    pub tools: ToolConfig,
}

impl Config {
    /// Load from the default location. A missing file yields defaults.
    pub fn load() -> Result<Self> {
        match config_file() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("No config file at {}", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        toml::from_str(&contents).with_context(|| format!("Invalid config file {}", path.display()))
    }
}

/// Path of the config file, if a config directory can be determined
pub fn config_file() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return Some(PathBuf::from(dir).join("config.toml"));
    }
    ProjectDirs::from("", "", "nexis").map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config::load_from(&temp.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_full_config() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
server = "nexis.example.com"
username = "editor"
mount_root = "/mnt/nexis"

[tools]
mount_tool = "/opt/avid/mount_avid"
timeout = "90s"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.server.as_deref(), Some("nexis.example.com"));
        assert_eq!(config.username.as_deref(), Some("editor"));
        assert_eq!(config.mount_root, Some(PathBuf::from("/mnt/nexis")));
        assert_eq!(config.tools.mount_tool, PathBuf::from("/opt/avid/mount_avid"));
        assert_eq!(config.tools.unmount_tool, PathBuf::from("umount"));
        assert_eq!(config.tools.timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_password_key_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "password = \"hunter2\"\n").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}
