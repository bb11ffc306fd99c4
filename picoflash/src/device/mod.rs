//! Device discovery utilities.
//!
//! Enumerates USB devices in BOOTSEL mode (VID `0x2E8A`, PID `0x0003`) and
//! identifies them by bus and address, the only identity the bootloader
//! reliably exposes before a session is opened.

use {
    crate::{
        error::{Error, Result},
        target::{PICOBOOT_PID, PICOBOOT_VID},
    },
    std::{fmt, str::FromStr},
};

#[cfg(feature = "native")]
use {
    log::{debug, info, trace},
    rusb::{Context, Device, UsbContext},
};

/// USB bus/address pair, written `BBB:AAA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId {
    /// Bus number.
    pub bus: u8,
    /// Device address on the bus.
    pub address: u8,
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}:{:03}", self.bus, self.address)
    }
}

impl FromStr for DeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Config(format!("invalid device id '{s}', expected BUS:ADDRESS"));

        let (bus, address) = s.trim().split_once(':').ok_or_else(invalid)?;
        Ok(Self {
            bus: bus.parse().map_err(|_| invalid())?,
            address: address.parse().map_err(|_| invalid())?,
        })
    }
}

/// A bootloader found on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedDevice {
    /// Bus/address identifier.
    pub id: DeviceId,
    /// USB Vendor ID.
    pub vid: u16,
    /// USB Product ID.
    pub pid: u16,
    /// Product string (if readable).
    pub product: Option<String>,
    /// Serial number (if readable).
    pub serial: Option<String>,
}

/// Check whether a VID/PID pair belongs to the BOOTSEL bootloader.
#[must_use]
pub fn is_picoboot(vid: u16, pid: u16) -> bool {
    vid == PICOBOOT_VID && pid == PICOBOOT_PID
}

/// Detect all bootloaders currently attached.
///
/// Enumeration failures are logged and yield an empty list.
#[cfg(feature = "native")]
pub fn detect_devices() -> Vec<DetectedDevice> {
    let context = match Context::new() {
        Ok(context) => context,
        Err(e) => {
            debug!("Failed to create libusb context: {e}");
            return Vec::new();
        },
    };

    let devices = match context.devices() {
        Ok(devices) => devices,
        Err(e) => {
            debug!("Failed to enumerate USB devices: {e}");
            return Vec::new();
        },
    };

    let mut result = Vec::new();
    for device in devices.iter() {
        let Ok(desc) = device.device_descriptor() else {
            continue;
        };
        if !is_picoboot(desc.vendor_id(), desc.product_id()) {
            continue;
        }

        let (product, serial) = match device.open() {
            Ok(handle) => (
                handle.read_product_string_ascii(&desc).ok(),
                handle.read_serial_number_string_ascii(&desc).ok(),
            ),
            Err(e) => {
                trace!("Cannot open device for string descriptors: {e}");
                (None, None)
            },
        };

        let detected = DetectedDevice {
            id: DeviceId {
                bus: device.bus_number(),
                address: device.address(),
            },
            vid: desc.vendor_id(),
            pid: desc.product_id(),
            product,
            serial,
        };
        trace!("Found bootloader: {detected:?}");
        result.push(detected);
    }

    result
}

/// Detect all bootloaders (no USB backend compiled in - always empty).
#[cfg(not(feature = "native"))]
pub fn detect_devices() -> Vec<DetectedDevice> {
    Vec::new()
}

/// Resolve a bootloader to a libusb device.
///
/// With `id = None` the first bootloader on the bus is used.
#[cfg(feature = "native")]
pub fn find_usb_device(id: Option<DeviceId>) -> Result<Device<Context>> {
    let context = Context::new()?;

    for device in context.devices()?.iter() {
        let Ok(desc) = device.device_descriptor() else {
            continue;
        };
        if !is_picoboot(desc.vendor_id(), desc.product_id()) {
            continue;
        }

        let found = DeviceId {
            bus: device.bus_number(),
            address: device.address(),
        };
        match id {
            Some(wanted) if wanted != found => continue,
            Some(_) => debug!("Matched requested device {found}"),
            None => info!("Auto-detected bootloader at {found}"),
        }
        return Ok(device);
    }

    Err(Error::DeviceNotFound)
}

/// Format a list of detected devices for display.
pub fn format_device_list(devices: &[DetectedDevice]) -> Vec<String> {
    devices
        .iter()
        .map(|d| {
            let product = d
                .product
                .as_ref()
                .map(|p| format!(" - {p}"))
                .unwrap_or_default();
            let serial = d
                .serial
                .as_ref()
                .map(|s| format!(" (serial {s})"))
                .unwrap_or_default();
            format!(
                "{} [VID:{:04X} PID:{:04X}]{product}{serial}",
                d.id, d.vid, d.pid
            )
        })
        .collect()
}
