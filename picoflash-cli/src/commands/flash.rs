//! Flash command implementation.

use anyhow::{Context, Result};
use console::style;
use picoflash::target::FLASH_START;
use picoflash::{ExclusiveMode, FlashImage, FlashOptions, FlashStrategy, RebootParams};
use std::path::Path;

use super::{open_programmer, progress_bar};
use crate::config::Config;
use crate::{Cli, CliError, Strategy};

/// Flash options given on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FlashArgs {
    pub(crate) base: Option<u32>,
    pub(crate) strategy: Option<Strategy>,
    pub(crate) eject: bool,
    pub(crate) pad_byte: Option<u8>,
    pub(crate) verify: bool,
}

/// Combine command-line flags with config file defaults.
pub(crate) fn build_options(args: &FlashArgs, config: &Config) -> Result<FlashOptions> {
    let strategy = match (args.strategy, config.flash.strategy.as_deref()) {
        (Some(strategy), _) => strategy.into(),
        (None, Some(name)) => FlashStrategy::from_name(name).ok_or_else(|| {
            CliError::Config(format!(
                "unknown flash strategy '{name}' in config (expected chunked or bulk)"
            ))
        })?,
        (None, None) => FlashStrategy::default(),
    };

    let exclusive = if args.eject || config.flash.eject {
        ExclusiveMode::ExclusiveAndEject
    } else {
        ExclusiveMode::Exclusive
    };

    let mut reboot = RebootParams::default();
    if let Some(delay_ms) = config.flash.reboot_delay_ms {
        reboot.delay_ms = delay_ms;
    }

    Ok(FlashOptions::default()
        .with_base_address(
            args.base
                .or(config.flash.base_address)
                .unwrap_or(FLASH_START),
        )
        .with_strategy(strategy)
        .with_exclusive(exclusive)
        .with_pad_byte(
            args.pad_byte
                .or(config.flash.pad_byte)
                .unwrap_or(0x00),
        )
        .with_verify(args.verify || config.flash.verify)
        .with_reboot(reboot))
}

/// Flash command implementation.
pub(crate) fn cmd_flash(cli: &Cli, config: &Config, path: &Path, args: &FlashArgs) -> Result<()> {
    if !cli.quiet {
        eprintln!(
            "{} Loading image {}",
            style("📦").cyan(),
            path.display()
        );
    }

    let image = FlashImage::from_file(path)
        .with_context(|| format!("Failed to load image {}", path.display()))?;
    let options = build_options(args, config)?;

    if !cli.quiet {
        eprintln!(
            "{} {} bytes ({} sectors) @ 0x{:08X}, {} strategy{}",
            style("ℹ").blue(),
            image.len(),
            image.sector_count(),
            options.base_address,
            options.strategy,
            if options.verify { ", verify" } else { "" }
        );
    }

    let mut programmer = open_programmer(cli, config)?.with_options(options);

    let pb = progress_bar(cli, image.len() as u64);
    pb.set_message("Flashing");

    programmer
        .flash(&image, &mut |current, _total| {
            pb.set_position(current as u64);
        })
        .context("Flashing failed")?;

    pb.finish_with_message("Complete");

    if !cli.quiet {
        eprintln!(
            "\n{} Flashed {} bytes, device rebooting",
            style("🎉").green().bold(),
            image.len()
        );
    }

    Ok(())
}
