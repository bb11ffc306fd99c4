//! Reboot command implementation.

use anyhow::{Context, Result};
use console::style;
use picoflash::RebootParams;

use super::open_programmer;
use crate::Cli;
use crate::config::Config;

/// Fill unset reboot parameters from config, then library defaults.
pub(crate) fn reboot_params(
    config: &Config,
    pc: u32,
    sp: Option<u32>,
    delay: Option<u32>,
) -> RebootParams {
    let defaults = RebootParams::default();
    RebootParams {
        pc,
        sp: sp.unwrap_or(defaults.sp),
        delay_ms: delay
            .or(config.flash.reboot_delay_ms)
            .unwrap_or(defaults.delay_ms),
    }
}

/// Reboot command implementation.
pub(crate) fn cmd_reboot(
    cli: &Cli,
    config: &Config,
    pc: u32,
    sp: Option<u32>,
    delay: Option<u32>,
) -> Result<()> {
    let params = reboot_params(config, pc, sp, delay);
    let mut programmer = open_programmer(cli, config)?;

    programmer
        .reboot_only(params)
        .context("Reboot failed")?;

    if !cli.quiet {
        eprintln!(
            "{} Rebooting in {} ms",
            style("🔄").cyan(),
            params.delay_ms
        );
    }

    Ok(())
}
