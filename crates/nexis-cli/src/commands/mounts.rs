//! Mounts command - list filesystems mounted under the mount root.

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use comfy_table::{Cell, Color, Table};
use tracing::instrument;

use nexis_mount::{mounts_under, SystemMount};

use crate::Settings;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

#[instrument(level = "info", name = "cmd::mounts", skip_all)]
pub fn execute(args: &Args, settings: &Settings) -> Result<()> {
    let mounts = mounts_under(&settings.mount_root).context("Failed to read the mount table")?;

    if args.json {
        return output_json(&mounts);
    }

    if mounts.is_empty() {
        if !settings.quiet {
            eprintln!("No mounts under {}.", settings.mount_root.display());
        }
        return Ok(());
    }

    output_table(&mounts);
    if !settings.quiet {
        eprintln!();
        eprintln!("{} mount(s)", mounts.len());
    }
    Ok(())
}

fn output_table(mounts: &[SystemMount]) {
    let mut table = Table::new();
    table.set_header(vec!["Workspace", "Mountpoint", "Type", "Source"]);

    for mount in mounts {
        let name = mount
            .mount_point
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "?".to_string());

        let fstype_cell = Cell::new(&mount.fstype).fg(if is_nexis_fstype(&mount.fstype) {
            Color::Green
        } else {
            Color::White
        });

        table.add_row(vec![
            Cell::new(name),
            Cell::new(mount.mount_point.display().to_string()),
            fstype_cell,
            Cell::new(&mount.source),
        ]);
    }

    println!("{table}");
}

/// `avidfs` on macOS, `fuse.avid*` on Linux
fn is_nexis_fstype(fstype: &str) -> bool {
    fstype.contains("avid")
}

fn output_json(mounts: &[SystemMount]) -> Result<()> {
    let output = serde_json::json!({ "mounts": mounts });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
