//! Interactive device selection.
//!
//! Devices in BOOTSEL mode carry no stable name, so they are picked by
//! bus/address. Selection order:
//! - Explicit `--device` / `PICOFLASH_DEVICE` / config value
//! - The only attached bootloader
//! - Interactive choice via dialoguer when several are attached
//! - Non-interactive mode for CI/CD fails instead of prompting

use {
    crate::{CliError, Cli, config::Config, requested_device},
    anyhow::Result,
    console::style,
    dialoguer::{Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, info},
    picoflash::{DetectedDevice, DeviceId, detect_devices, format_device_list},
    std::io::IsTerminal,
};

fn usage_err(message: &str) -> anyhow::Error {
    CliError::Usage(message.to_string()).into()
}

/// Pick a device without prompting.
///
/// Exactly one candidate is a valid auto-selection; none is "not found",
/// several is a usage error since the choice would be arbitrary.
fn select_non_interactive(devices: Vec<DetectedDevice>) -> Result<DetectedDevice> {
    let count = devices.len();
    let mut iter = devices.into_iter();
    match (iter.next(), count) {
        (Some(device), 1) => Ok(device),
        (Some(_), _) => Err(usage_err(&format!(
            "{count} devices in BOOTSEL mode found; choose one with --device BUS:ADDRESS"
        ))),
        (None, _) => Err(not_found()),
    }
}

fn not_found() -> anyhow::Error {
    CliError::DeviceNotFound(
        "no device in BOOTSEL mode found (hold BOOTSEL while plugging in)".to_string(),
    )
    .into()
}

/// Resolve which bootloader to talk to.
pub(crate) fn select_device(cli: &Cli, config: &Config) -> Result<DeviceId> {
    if let Some(id) = requested_device(cli, config)? {
        debug!("Using requested device {id}");
        return Ok(id);
    }

    let devices = detect_devices();
    if devices.len() <= 1 || cli.non_interactive {
        let device = select_non_interactive(devices)?;
        info!("Auto-selected device {}", device.id);
        return Ok(device.id);
    }

    ensure_interactive_terminal()?;
    select_device_interactive(&devices)
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "several devices found and no terminal to prompt on; use --device BUS:ADDRESS",
        ))
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("device selection cancelled".to_string()).into()
            } else {
                usage_err("device prompt failed")
            }
        },
    }
}

/// Interactive device selection.
fn select_device_interactive(devices: &[DetectedDevice]) -> Result<DeviceId> {
    eprintln!(
        "{} {} devices in BOOTSEL mode",
        style("ℹ").blue(),
        devices.len()
    );

    // Truncate labels to fit terminal width to prevent wrapping in narrow
    // terminals.
    let term_width = usize::from(console::Term::stderr().size().1);
    let max_item_width = term_width.saturating_sub(4);
    let labels: Vec<String> = format_device_list(devices)
        .into_iter()
        .map(|n| console::truncate_str(&n, max_item_width, "\u{2026}").into_owned())
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a device")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection {
        Some(index) => devices
            .get(index)
            .map(|d| d.id)
            .ok_or_else(|| anyhow::anyhow!("Invalid device index: {index}")),
        None => Err(CliError::Cancelled("device selection cancelled".to_string()).into()),
    }
}
