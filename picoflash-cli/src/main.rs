//! picoflash CLI - Command-line tool for flashing RP2040 chips over PICOBOOT.
//!
//! ## Features
//!
//! - Flash raw binary images to the external flash
//! - Read memory ranges back to a file
//! - Reboot a device sitting in BOOTSEL mode
//! - Interactive device selection
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use env_logger::Env;
use log::debug;
use picoflash::{DeviceId, FlashStrategy};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

/// Check if emoji/animations should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(std::sync::atomic::Ordering::Relaxed) && console::colors_enabled_stderr()
}

mod commands;
mod config;
mod device;

use config::Config;

/// CLI error classes mapped to process exit codes.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Bad invocation or ambiguous selection.
    #[error("{0}")]
    Usage(String),
    /// Invalid configuration value.
    #[error("{0}")]
    Config(String),
    /// No bootloader could be found.
    #[error("{0}")]
    DeviceNotFound(String),
    /// The user backed out of a prompt.
    #[error("{0}")]
    Cancelled(String),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
            Self::Config(_) => 3,
            Self::DeviceNotFound(_) => 4,
            Self::Cancelled(_) => 130,
        }
    }
}

/// Map an error chain to the process exit code.
pub(crate) fn exit_code_for(err: &anyhow::Error) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return cli_err.exit_code();
    }
    for cause in err.chain() {
        if let Some(lib_err) = cause.downcast_ref::<picoflash::Error>() {
            return match lib_err.root_cause() {
                picoflash::Error::DeviceNotFound => 4,
                picoflash::Error::Config(_) => 3,
                _ => 1,
            };
        }
    }
    1
}

/// picoflash - Flash RP2040 chips through the BOOTSEL USB bootloader.
///
/// Environment variables:
///   PICOFLASH_DEVICE            - Default device (BUS:ADDRESS)
///   PICOFLASH_TIMEOUT_MS        - USB transfer timeout in milliseconds
///   PICOFLASH_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "picoflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Device to use as BUS:ADDRESS (auto-detected if not specified).
    #[arg(short, long, global = true, env = "PICOFLASH_DEVICE")]
    pub(crate) device: Option<String>,

    /// USB transfer timeout in milliseconds.
    #[arg(long, global = true, env = "PICOFLASH_TIMEOUT_MS")]
    pub(crate) timeout_ms: Option<u64>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "PICOFLASH_NON_INTERACTIVE")]
    pub(crate) non_interactive: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub(crate) config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

/// Flash strategy names accepted on the command line.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum Strategy {
    /// Erase and write one 4 KiB sector at a time (default).
    Chunked,
    /// Erase the whole range, then write the whole image at once.
    Bulk,
}

impl From<Strategy> for FlashStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Chunked => FlashStrategy::Chunked,
            Strategy::Bulk => FlashStrategy::Bulk,
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Flash a raw binary image.
    Flash {
        /// Path to the binary image.
        image: PathBuf,

        /// Flash address of the first byte (default 0x10000000).
        #[arg(long, value_parser = parse_hex_u32)]
        base: Option<u32>,

        /// Erase/write strategy.
        #[arg(long, value_enum)]
        strategy: Option<Strategy>,

        /// Eject the mass-storage drive while flashing.
        #[arg(long)]
        eject: bool,

        /// Byte used to pad the last partial sector.
        #[arg(long, value_parser = parse_hex_u8)]
        pad_byte: Option<u8>,

        /// Read every sector back and compare.
        #[arg(long)]
        verify: bool,
    },

    /// Read memory into a file.
    Read {
        /// Start address.
        #[arg(value_parser = parse_hex_u32)]
        address: u32,

        /// Number of bytes to read (hex with 0x prefix, or decimal).
        #[arg(value_parser = parse_size)]
        size: u32,

        /// Output file.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Reboot the device.
    Reboot {
        /// Entry point (0 boots from flash).
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        pc: u32,

        /// Initial stack pointer (default end of SRAM).
        #[arg(long, value_parser = parse_hex_u32)]
        sp: Option<u32>,

        /// Delay before rebooting, in milliseconds.
        #[arg(long)]
        delay: Option<u32>,
    },

    /// List devices in BOOTSEL mode.
    ListDevices {
        /// Output device list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parse hexadecimal address (supports 0x prefix and underscores).
pub(crate) fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    // Support underscore separators like 0x1000_0000
    let s: String = s.chars().filter(|c| *c != '_').collect();
    u32::from_str_radix(&s, 16).map_err(|e| format!("Invalid hex address: {e}"))
}

/// Parse a hexadecimal byte (supports 0x prefix).
fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let s = s.trim();
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(s, 16).map_err(|e| format!("Invalid hex byte: {e}"))
}

/// Parse a size: hex with `0x` prefix, otherwise decimal.
fn parse_size(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if s.starts_with("0x") || s.starts_with("0X") {
        parse_hex_u32(s)
    } else {
        s.parse::<u32>()
            .map_err(|e| format!("Invalid size: {e}"))
    }
}

/// Resolve the device id from flags/env, then config.
pub(crate) fn requested_device(cli: &Cli, config: &Config) -> Result<Option<DeviceId>> {
    let Some(raw) = cli.device.as_ref().or(config.device.id.as_ref()) else {
        return Ok(None);
    };
    raw.parse::<DeviceId>()
        .map(Some)
        .map_err(|e| CliError::Usage(e.to_string()).into())
}

fn run(cli: &Cli) -> Result<()> {
    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Flash {
            image,
            base,
            strategy,
            eject,
            pad_byte,
            verify,
        } => commands::flash::cmd_flash(
            cli,
            &config,
            image,
            &commands::flash::FlashArgs {
                base: *base,
                strategy: *strategy,
                eject: *eject,
                pad_byte: *pad_byte,
                verify: *verify,
            },
        ),
        Commands::Read {
            address,
            size,
            output,
        } => commands::read::cmd_read(cli, &config, *address, *size, output),
        Commands::Reboot { pc, sp, delay } => {
            commands::reboot::cmd_reboot(cli, &config, *pc, *sp, *delay)
        },
        Commands::ListDevices { json } => {
            commands::list::cmd_list_devices(*json);
            Ok(())
        },
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

fn main() -> ExitCode {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, std::sync::atomic::Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        // Disable all color output
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "picoflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", console::style("Error:").red().bold());
            ExitCode::from(exit_code_for(&err))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context as _;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_hex_u32() {
        assert_eq!(parse_hex_u32("0x10000000"), Ok(0x1000_0000));
        assert_eq!(parse_hex_u32("0X1000_0000"), Ok(0x1000_0000));
        assert_eq!(parse_hex_u32("20042000"), Ok(0x2004_2000));
        assert!(parse_hex_u32("0xZZ").is_err());
        assert!(parse_hex_u32("0x100000000").is_err());
    }

    #[test]
    fn test_parse_hex_u8() {
        assert_eq!(parse_hex_u8("0xFF"), Ok(0xFF));
        assert_eq!(parse_hex_u8("00"), Ok(0));
        assert!(parse_hex_u8("0x100").is_err());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096"), Ok(4096));
        assert_eq!(parse_size("0x1000"), Ok(4096));
        assert!(parse_size("4k").is_err());
    }

    #[test]
    fn test_exit_codes() {
        let usage: anyhow::Error = CliError::Usage("x".into()).into();
        assert_eq!(exit_code_for(&usage), 2);

        let cancelled: anyhow::Error = CliError::Cancelled("x".into()).into();
        assert_eq!(exit_code_for(&cancelled), 130);

        let not_found: anyhow::Error = picoflash::Error::DeviceNotFound.into();
        assert_eq!(exit_code_for(&not_found), 4);

        let wrapped = Err::<(), _>(picoflash::Error::DeviceNotFound)
            .context("opening device")
            .unwrap_err();
        assert_eq!(exit_code_for(&wrapped), 4);

        let aborted: anyhow::Error = picoflash::Error::Aborted {
            step: picoflash::FlashStep::Reboot,
            source: Box::new(picoflash::Error::DeviceNotFound),
        }
        .into();
        assert_eq!(exit_code_for(&aborted), 4);

        let generic = anyhow::anyhow!("boom");
        assert_eq!(exit_code_for(&generic), 1);
    }

    #[test]
    fn test_requested_device_precedence() {
        let mut config = Config::default();
        config.device.id = Some("002:003".to_string());

        let cli = Cli::parse_from(["picoflash", "--device", "001:005", "list-devices"]);
        assert_eq!(
            requested_device(&cli, &config).unwrap(),
            Some(DeviceId { bus: 1, address: 5 })
        );

        let cli = Cli::parse_from(["picoflash", "list-devices"]);
        if cli.device.is_none() {
            assert_eq!(
                requested_device(&cli, &config).unwrap(),
                Some(DeviceId { bus: 2, address: 3 })
            );
        }
    }

    #[test]
    fn test_requested_device_invalid_is_usage_error() {
        let cli = Cli::parse_from(["picoflash", "--device", "nope", "list-devices"]);
        let err = requested_device(&cli, &Config::default()).unwrap_err();
        assert_eq!(exit_code_for(&err), 2);
    }
}
