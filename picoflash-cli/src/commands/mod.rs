//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.

pub(crate) mod completions;
pub(crate) mod flash;
pub(crate) mod list;
pub(crate) mod read;
pub(crate) mod reboot;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use picoflash::{FlashProgrammer, RusbTransport};
use std::time::Duration;

use crate::config::Config;
use crate::device::select_device;
use crate::{Cli, use_fancy_output};

/// Select, open and reset the bootloader.
pub(crate) fn open_programmer(cli: &Cli, config: &Config) -> Result<FlashProgrammer<RusbTransport>> {
    let id = select_device(cli, config)?;

    let mut transport =
        RusbTransport::find(Some(id)).with_context(|| format!("Failed to find device {id}"))?;
    if let Some(ms) = cli.timeout_ms.or(config.device.timeout_ms) {
        transport = transport.with_timeout(Duration::from_millis(ms));
    }

    if !cli.quiet {
        eprintln!(
            "{} Using device {}",
            console::style("🔌").cyan(),
            console::style(id).bold()
        );
    }

    FlashProgrammer::open(transport).with_context(|| format!("Failed to open device {id}"))
}

/// Byte-based progress bar on stderr, hidden when quiet or not a terminal.
pub(crate) fn progress_bar(cli: &Cli, len: u64) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            )
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    pb
}
