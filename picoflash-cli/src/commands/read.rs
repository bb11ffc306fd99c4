//! Read command implementation.

use anyhow::{Context, Result};
use console::style;
use std::fs;
use std::path::Path;

use super::{open_programmer, progress_bar};
use crate::Cli;
use crate::config::Config;

/// Read `size` bytes at `address` into `output`.
pub(crate) fn cmd_read(
    cli: &Cli,
    config: &Config,
    address: u32,
    size: u32,
    output: &Path,
) -> Result<()> {
    let mut programmer = open_programmer(cli, config)?;

    let pb = progress_bar(cli, u64::from(size));
    pb.set_message("Reading");

    let data = programmer
        .read_memory(address, size, &mut |current, _total| {
            pb.set_position(current as u64);
        })
        .with_context(|| format!("Failed to read {size} bytes at 0x{address:08X}"))?;

    pb.finish_with_message("Complete");

    fs::write(output, &data).with_context(|| format!("Failed to write {}", output.display()))?;

    if !cli.quiet {
        eprintln!(
            "{} Saved {} bytes from 0x{address:08X} to {}",
            style("✓").green(),
            data.len(),
            output.display()
        );
    }

    Ok(())
}
