//! Transport abstraction for the PICOBOOT USB interface.
//!
//! This module provides a `Transport` trait that captures exactly what the
//! protocol needs from a USB stack, so the framing and sequencing code never
//! touches a USB library directly:
//!
//! - **Native platforms** (Linux, macOS, Windows): `RusbTransport` over libusb
//! - **Tests**: an in-crate mock that emulates the bootloader
//!
//! ## Architecture
//!
//! ```text
//! +------------------+
//! |  FlashProgrammer |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |  CommandChannel  |  frames, tokens, data/status phases
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! | TransportSession |  interface, endpoints, reset
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |  Transport trait |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |   RusbTransport  |
//! |      (rusb)      |
//! +------------------+
//! ```

#[cfg(feature = "native")]
pub mod native;

#[cfg(test)]
pub(crate) mod mock;

use crate::error::Result;

/// USB class code of vendor-specific interfaces.
pub const VENDOR_SPECIFIC_CLASS: u8 = 0xFF;

/// Endpoint address bit marking an IN endpoint.
pub const ENDPOINT_DIR_IN: u8 = 0x80;

/// USB endpoint transfer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    /// Control endpoint.
    Control,
    /// Isochronous endpoint.
    Isochronous,
    /// Bulk endpoint.
    Bulk,
    /// Interrupt endpoint.
    Interrupt,
}

/// One endpoint of an alternate setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointInfo {
    /// Endpoint address, including the direction bit.
    pub address: u8,
    /// Transfer type.
    pub transfer_type: TransferType,
}

impl EndpointInfo {
    /// Endpoint number without the direction bit.
    pub fn number(&self) -> u8 {
        self.address & 0x0F
    }

    /// Whether this is an IN (device-to-host) endpoint.
    pub fn is_in(&self) -> bool {
        self.address & ENDPOINT_DIR_IN != 0
    }
}

/// One alternate setting of an interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternateSetting {
    /// Alternate setting number.
    pub setting: u8,
    /// Interface class code.
    pub class_code: u8,
    /// Endpoints in descriptor order.
    pub endpoints: Vec<EndpointInfo>,
}

/// One interface of the active configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    /// Interface number used for claiming and control requests.
    pub number: u8,
    /// Alternate settings in descriptor order.
    pub alternates: Vec<AlternateSetting>,
}

/// The active configuration, as reported when the device is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceConfiguration {
    /// Interfaces in descriptor order.
    pub interfaces: Vec<InterfaceInfo>,
}

/// bmRequestType "type" field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    /// Standard request.
    Standard,
    /// Class request.
    Class,
    /// Vendor request.
    Vendor,
}

/// bmRequestType "recipient" field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// The device.
    Device,
    /// An interface.
    Interface,
    /// An endpoint.
    Endpoint,
    /// Other.
    Other,
}

/// A host-to-device control request without a data stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    /// Request type.
    pub request_type: RequestType,
    /// Request recipient.
    pub recipient: Recipient,
    /// bRequest.
    pub request: u8,
    /// wValue.
    pub value: u16,
    /// wIndex.
    pub index: u16,
}

/// Transport provider contract.
///
/// Calls are blocking and strictly sequential. Timeouts, if any, are the
/// implementation's business; the protocol layer never retries.
pub trait Transport {
    /// Open the device and report its active configuration.
    fn open(&mut self) -> Result<DeviceConfiguration>;

    /// Release the device handle.
    fn close(&mut self) -> Result<()>;

    /// Claim an interface for exclusive use by this host.
    fn claim_interface(&mut self, number: u8) -> Result<()>;

    /// Issue a control OUT request on endpoint 0.
    fn control_transfer_out(&mut self, request: ControlRequest) -> Result<()>;

    /// Write `data` to a bulk OUT endpoint, returning the bytes written.
    fn bulk_write(&mut self, endpoint: u8, data: &[u8]) -> Result<usize>;

    /// Read up to `length` bytes from a bulk IN endpoint.
    fn bulk_read(&mut self, endpoint: u8, length: usize) -> Result<Vec<u8>>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) -> Result<DeviceConfiguration> {
        (**self).open()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn claim_interface(&mut self, number: u8) -> Result<()> {
        (**self).claim_interface(number)
    }

    fn control_transfer_out(&mut self, request: ControlRequest) -> Result<()> {
        (**self).control_transfer_out(request)
    }

    fn bulk_write(&mut self, endpoint: u8, data: &[u8]) -> Result<usize> {
        (**self).bulk_write(endpoint, data)
    }

    fn bulk_read(&mut self, endpoint: u8, length: usize) -> Result<Vec<u8>> {
        (**self).bulk_read(endpoint, length)
    }
}

// Re-export the appropriate implementation based on features
#[cfg(feature = "native")]
pub use native::RusbTransport;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_info_direction() {
        let out = EndpointInfo {
            address: 0x03,
            transfer_type: TransferType::Bulk,
        };
        let inp = EndpointInfo {
            address: 0x84,
            transfer_type: TransferType::Bulk,
        };
        assert!(!out.is_in());
        assert!(inp.is_in());
        assert_eq!(out.number(), 3);
        assert_eq!(inp.number(), 4);
    }
}
