//! Configuration file support for picoflash.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (PICOFLASH_*)
//! 3. Local config file (./picoflash.toml)
//! 4. Global config file (~/.config/picoflash/config.toml)

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Local configuration file name.
pub const LOCAL_CONFIG_FILE: &str = "picoflash.toml";

/// Device selection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Preferred device as `BUS:ADDRESS`.
    pub id: Option<String>,
    /// Per-transfer USB timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// Flash configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlashConfig {
    /// Default flash base address.
    pub base_address: Option<u32>,
    /// Default strategy name (`chunked` or `bulk`).
    pub strategy: Option<String>,
    /// Eject the mass-storage drive while flashing.
    #[serde(default)]
    pub eject: bool,
    /// Pad byte for the final partial sector.
    pub pad_byte: Option<u8>,
    /// Verify by default.
    #[serde(default)]
    pub verify: bool,
    /// Delay before the final reboot.
    pub reboot_delay_ms: Option<u32>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Device configuration.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Flash configuration.
    #[serde(default)]
    pub flash: FlashConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "picoflash").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        // Device config
        if other.device.id.is_some() {
            self.device.id = other.device.id;
        }
        if other.device.timeout_ms.is_some() {
            self.device.timeout_ms = other.device.timeout_ms;
        }

        // Flash config
        if other.flash.base_address.is_some() {
            self.flash.base_address = other.flash.base_address;
        }
        if other.flash.strategy.is_some() {
            self.flash.strategy = other.flash.strategy;
        }
        if other.flash.pad_byte.is_some() {
            self.flash.pad_byte = other.flash.pad_byte;
        }
        if other.flash.reboot_delay_ms.is_some() {
            self.flash.reboot_delay_ms = other.flash.reboot_delay_ms;
        }
        if other.flash.eject {
            self.flash.eject = true;
        }
        if other.flash.verify {
            self.flash.verify = true;
        }
    }
}
