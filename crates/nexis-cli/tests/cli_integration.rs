#![cfg(unix)]
#![allow(deprecated)] // cargo_bin! macro doesn't exist yet in assert_cmd 2.1

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const TEST_PASSWORD: &str = "test-password-123";

/// Scratch mount root, config dir and stub tools for one test
struct Env {
    temp: TempDir,
}

impl Env {
    fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir(temp.path().join("root")).unwrap();
        fs::create_dir(temp.path().join("config")).unwrap();
        Self { temp }
    }

    fn root(&self) -> PathBuf {
        self.temp.path().join("root")
    }

    fn config_dir(&self) -> PathBuf {
        self.temp.path().join("config")
    }

    fn log(&self) -> PathBuf {
        self.temp.path().join("calls.log")
    }

    /// Write a shell script stub and return its path
    fn stub(&self, name: &str, body: &str) -> PathBuf {
        let path = self.temp.path().join(name);
        let script = format!(
            "#!/bin/sh\necho \"{name} $*\" >> '{}'\n{body}\n",
            self.log().display()
        );
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn write_config(&self, mount_tool: &Path, unmount_tool: &Path) {
        let config = format!(
            "server = \"nexis.example.com\"\nusername = \"editor\"\n\n[tools]\nmount_tool = \"{}\"\nunmount_tool = \"{}\"\ntimeout = \"10s\"\n",
            mount_tool.display(),
            unmount_tool.display()
        );
        fs::write(self.config_dir().join("config.toml"), config).unwrap();
    }

    fn calls(&self) -> String {
        fs::read_to_string(self.log()).unwrap_or_default()
    }

    fn nexis(&self) -> Command {
        let mut cmd = Command::cargo_bin("nexis").unwrap();
        cmd.env_remove("NEXIS_SERVER")
            .env_remove("NEXIS_USERNAME")
            .env_remove("RUST_LOG")
            .env("NEXIS_PASSWORD", TEST_PASSWORD)
            .env("NEXIS_CONFIG_DIR", self.config_dir())
            .env("NEXIS_MOUNT_ROOT", self.root());
        cmd
    }
}

// ============================================================================
// Help and completions
// ============================================================================

#[test]
fn test_help() {
    let env = Env::new();
    env.nexis()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("mount"))
        .stdout(predicate::str::contains("exec"))
        .stdout(predicate::str::contains("EXAMPLES"));
}

#[test]
fn test_completions_bash() {
    let env = Env::new();
    env.nexis()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nexis"));
}

#[test]
fn test_completions_ignore_broken_config() {
    let env = Env::new();
    fs::write(env.config_dir().join("config.toml"), "server = [").unwrap();

    env.nexis()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nexis"));
}

#[test]
fn test_unknown_subcommand_is_usage_error() {
    let env = Env::new();
    env.nexis().arg("frobnicate").assert().code(2);
}

// ============================================================================
// Path
// ============================================================================

#[test]
fn test_path_free_name() {
    let env = Env::new();
    env.nexis()
        .args(["path", "ProjectX"])
        .assert()
        .success()
        .stdout(format!("{}\n", env.root().join("ProjectX").display()));
}

#[test]
fn test_path_skips_taken_names() {
    let env = Env::new();
    fs::create_dir(env.root().join("ProjectX")).unwrap();
    fs::create_dir(env.root().join("ProjectX_1")).unwrap();

    env.nexis()
        .args(["path", "ProjectX"])
        .assert()
        .success()
        .stdout(format!("{}\n", env.root().join("ProjectX_2").display()));
}

#[test]
fn test_path_rejects_traversal() {
    let env = Env::new();
    env.nexis()
        .args(["path", "../etc"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid workspace name"));
}

#[test]
fn test_path_missing_mount_root() {
    let env = Env::new();
    env.nexis()
        .args(["path", "ProjectX"])
        .env("NEXIS_MOUNT_ROOT", env.temp.path().join("nope"))
        .assert()
        .code(3)
        .stderr(predicate::str::contains("is not a valid directory"));
}

// ============================================================================
// Mounts
// ============================================================================

#[test]
fn test_mounts_json_empty_root() {
    let env = Env::new();
    env.nexis()
        .args(["mounts", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"mounts\": []"));
}

#[test]
fn test_mounts_table_empty_root() {
    let env = Env::new();
    env.nexis()
        .arg("mounts")
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("No mounts under"));
}

// ============================================================================
// Mount
// ============================================================================

#[test]
fn test_mount_requires_server() {
    let env = Env::new();
    env.nexis()
        .args(["--username", "editor", "mount", "ProjectX"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No server given"));
}

#[test]
fn test_mount_tool_failure() {
    let env = Env::new();
    let mount = env.stub("mount_avid", "echo 'Authentication failed' >&2\nexit 1");
    let unmount = env.stub("umount", "exit 0");
    env.write_config(&mount, &unmount);

    env.nexis()
        .args(["mount", "ProjectX"])
        .write_stdin("\n")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Could not mount ProjectX"))
        .stderr(predicate::str::contains("Err 1: Authentication failed"));

    let calls = env.calls();
    assert!(calls.contains("-o rdonly"));
    assert!(calls.contains("nexis.example.com:ProjectX"));
    assert!(!calls.contains("umount"));
}

#[test]
fn test_mount_read_write_omits_rdonly() {
    let env = Env::new();
    let mount = env.stub("mount_avid", "exit 1");
    let unmount = env.stub("umount", "exit 0");
    env.write_config(&mount, &unmount);

    env.nexis()
        .args(["mount", "ProjectX", "--read-write"])
        .assert()
        .code(4);

    assert!(!env.calls().contains("rdonly"));
}

#[test]
fn test_mount_claimed_success_without_mount_point() {
    let env = Env::new();
    // Exits 0 but never attaches anything
    let mount = env.stub("mount_avid", "for last; do :; done\nmkdir -p \"$last\"\nexit 0");
    let unmount = env.stub("umount", "exit 0");
    env.write_config(&mount, &unmount);

    env.nexis()
        .args(["mount", "ProjectX"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Err 0"));
}

#[test]
fn test_mount_tool_missing() {
    let env = Env::new();
    let unmount = env.stub("umount", "exit 0");
    env.write_config(&env.temp.path().join("no-such-tool"), &unmount);

    env.nexis()
        .args(["mount", "ProjectX"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Failed to run"));
}

#[test]
fn test_password_stays_out_of_error_output() {
    let env = Env::new();
    let mount = env.stub("mount_avid", "echo 'bad credentials' >&2\nexit 1");
    let unmount = env.stub("umount", "exit 0");
    env.write_config(&mount, &unmount);

    env.nexis()
        .args(["-vvv", "mount", "ProjectX"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains(TEST_PASSWORD).not());

    // The tool itself does receive it
    assert!(env.calls().contains(&format!("editor:{TEST_PASSWORD}")));
}

#[test]
fn test_password_from_stdin() {
    let env = Env::new();
    let mount = env.stub("mount_avid", "exit 1");
    let unmount = env.stub("umount", "exit 0");
    env.write_config(&mount, &unmount);

    env.nexis()
        .env_remove("NEXIS_PASSWORD")
        .args(["--password-stdin", "mount", "ProjectX"])
        .write_stdin("from-stdin\n")
        .assert()
        .code(4);

    assert!(env.calls().contains("editor:from-stdin"));
}

#[test]
fn test_invalid_config_is_reported() {
    let env = Env::new();
    fs::write(env.config_dir().join("config.toml"), "server = [").unwrap();

    env.nexis()
        .args(["path", "ProjectX"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid config file"));
}

// ============================================================================
// Exec
// ============================================================================

#[test]
fn test_exec_does_not_run_command_when_mount_fails() {
    let env = Env::new();
    let mount = env.stub("mount_avid", "exit 1");
    let unmount = env.stub("umount", "exit 0");
    env.write_config(&mount, &unmount);
    let marker = env.temp.path().join("ran");

    env.nexis()
        .args(["exec", "ProjectX", "--", "touch"])
        .arg(&marker)
        .assert()
        .code(4);

    assert!(!marker.exists());
}

#[test]
fn test_exec_requires_command() {
    let env = Env::new();
    env.nexis().args(["exec", "ProjectX"]).assert().code(2);
}
