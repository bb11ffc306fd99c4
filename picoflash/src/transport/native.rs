//! Native USB transport implementation using the `rusb` crate.
//!
//! This module provides the libusb-backed transport for native platforms
//! (Linux, macOS, Windows, FreeBSD, etc.).

use {
    crate::{
        device::{self, DeviceId},
        error::{Error, Result, TransportError},
        transport::{
            AlternateSetting, ControlRequest, DeviceConfiguration, EndpointInfo, InterfaceInfo,
            Recipient, RequestType, TransferType, Transport,
        },
    },
    log::{debug, trace, warn},
    rusb::{Context, Device, DeviceHandle},
    std::time::Duration,
};

/// Default per-transfer timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// libusb-backed transport.
pub struct RusbTransport {
    device: Device<Context>,
    handle: Option<DeviceHandle<Context>>,
    claimed: Option<u8>,
    timeout: Duration,
}

impl RusbTransport {
    /// Wrap an enumerated device. Nothing is opened until [`Transport::open`].
    pub fn new(device: Device<Context>) -> Self {
        Self {
            device,
            handle: None,
            claimed: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Locate a bootloader device and wrap it.
    ///
    /// With `id = None` the first device in BOOTSEL mode is used.
    pub fn find(id: Option<DeviceId>) -> Result<Self> {
        let device = device::find_usb_device(id)?;
        debug!(
            "Using device at bus {:03} address {:03}",
            device.bus_number(),
            device.address()
        );
        Ok(Self::new(device))
    }

    /// Set the per-transfer timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Per-transfer timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Bus/address identifier of the wrapped device.
    pub fn id(&self) -> DeviceId {
        DeviceId {
            bus: self.device.bus_number(),
            address: self.device.address(),
        }
    }

    fn handle(&self) -> Result<&DeviceHandle<Context>> {
        self.handle
            .as_ref()
            .ok_or(Error::Transport(TransportError::NotOpen))
    }

    fn read_configuration(&self) -> Result<DeviceConfiguration> {
        let config = self
            .device
            .active_config_descriptor()
            .map_err(TransportError::from)?;

        let interfaces = config
            .interfaces()
            .map(|iface| InterfaceInfo {
                number: iface.number(),
                alternates: iface
                    .descriptors()
                    .map(|alt| AlternateSetting {
                        setting: alt.setting_number(),
                        class_code: alt.class_code(),
                        endpoints: alt
                            .endpoint_descriptors()
                            .map(|ep| EndpointInfo {
                                address: ep.address(),
                                transfer_type: ep.transfer_type().into(),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        Ok(DeviceConfiguration { interfaces })
    }
}

impl Transport for RusbTransport {
    fn open(&mut self) -> Result<DeviceConfiguration> {
        let mut handle = self
            .device
            .open()
            .map_err(TransportError::from)?;
        // Not every platform supports detaching; the PICOBOOT interface
        // normally has no kernel driver bound anyway.
        if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
            trace!("Kernel driver auto-detach unavailable: {e}");
        }
        self.handle = Some(handle);

        let config = self.read_configuration()?;
        trace!("Active configuration: {config:?}");
        Ok(config)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut handle) = self.handle.take() {
            if let Some(number) = self.claimed.take() {
                if let Err(e) = handle.release_interface(number) {
                    warn!("Failed to release interface {number}: {e}");
                }
            }
        }
        Ok(())
    }

    fn claim_interface(&mut self, number: u8) -> Result<()> {
        self.handle
            .as_mut()
            .ok_or(Error::Transport(TransportError::NotOpen))?
            .claim_interface(number)
            .map_err(TransportError::from)?;
        self.claimed = Some(number);
        Ok(())
    }

    fn control_transfer_out(&mut self, request: ControlRequest) -> Result<()> {
        let request_type = rusb::request_type(
            rusb::Direction::Out,
            request.request_type.into(),
            request.recipient.into(),
        );
        self.handle()?
            .write_control(
                request_type,
                request.request,
                request.value,
                request.index,
                &[],
                self.timeout,
            )
            .map_err(TransportError::from)?;
        Ok(())
    }

    fn bulk_write(&mut self, endpoint: u8, data: &[u8]) -> Result<usize> {
        let written = self
            .handle()?
            .write_bulk(endpoint, data, self.timeout)
            .map_err(TransportError::from)?;
        Ok(written)
    }

    fn bulk_read(&mut self, endpoint: u8, length: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; length];
        let read = self
            .handle()?
            .read_bulk(endpoint, &mut buf, self.timeout)
            .map_err(TransportError::from)?;
        buf.truncate(read);
        Ok(buf)
    }
}

impl From<rusb::Error> for TransportError {
    fn from(err: rusb::Error) -> Self {
        match err {
            rusb::Error::NoDevice => Self::Disconnected,
            rusb::Error::Pipe => Self::Stalled,
            rusb::Error::Access => Self::PermissionDenied,
            rusb::Error::Timeout => Self::Timeout,
            rusb::Error::Busy => Self::Busy,
            other => Self::Usb(other.to_string()),
        }
    }
}

impl From<rusb::Error> for Error {
    fn from(err: rusb::Error) -> Self {
        Self::Transport(err.into())
    }
}

impl From<rusb::TransferType> for TransferType {
    fn from(value: rusb::TransferType) -> Self {
        match value {
            rusb::TransferType::Control => Self::Control,
            rusb::TransferType::Isochronous => Self::Isochronous,
            rusb::TransferType::Bulk => Self::Bulk,
            rusb::TransferType::Interrupt => Self::Interrupt,
        }
    }
}

impl From<RequestType> for rusb::RequestType {
    fn from(value: RequestType) -> Self {
        match value {
            RequestType::Standard => Self::Standard,
            RequestType::Class => Self::Class,
            RequestType::Vendor => Self::Vendor,
        }
    }
}

impl From<Recipient> for rusb::Recipient {
    fn from(value: Recipient) -> Self {
        match value {
            Recipient::Device => Self::Device,
            Recipient::Interface => Self::Interface,
            Recipient::Endpoint => Self::Endpoint,
            Recipient::Other => Self::Other,
        }
    }
}
