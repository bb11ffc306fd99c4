//! USB session with the bootloader interface.
//!
//! A [`TransportSession`] owns the transport, knows which interface and bulk
//! endpoints carry PICOBOOT traffic, and hands out command tokens.

use {
    crate::{
        error::{Error, ProtocolError, Result, TransportError},
        transport::{
            ControlRequest, DeviceConfiguration, Recipient, RequestType, TransferType, Transport,
            VENDOR_SPECIFIC_CLASS,
        },
    },
    log::{debug, info, warn},
};

/// Vendor control request that resets the PICOBOOT interface state.
pub const INTERFACE_RESET_REQUEST: u8 = 0x41;

/// Interface index tried when the configuration has interfaces.
const PICOBOOT_INTERFACE_INDEX: usize = 1;

#[derive(Debug, Clone, Copy)]
struct Endpoints {
    interface: u8,
    out_ep: u8,
    in_ep: u8,
}

/// An open (or openable) bootloader session.
pub struct TransportSession<T: Transport> {
    transport: T,
    endpoints: Option<Endpoints>,
    token: u32,
}

impl<T: Transport> TransportSession<T> {
    /// Wrap a transport. Nothing is sent until [`open`](Self::open).
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            endpoints: None,
            token: 0,
        }
    }

    /// Open the device, locate the bootloader interface and claim it.
    ///
    /// If anything after the transport open fails, the transport is closed
    /// again before the error is returned.
    pub fn open(&mut self) -> Result<()> {
        let config = self.transport.open()?;

        let endpoints = match self.claim(&config) {
            Ok(endpoints) => endpoints,
            Err(e) => {
                if let Err(close_err) = self.transport.close() {
                    warn!("Failed to close device after open error: {close_err}");
                }
                return Err(e);
            },
        };

        info!(
            "Claimed interface {} (OUT 0x{:02X}, IN 0x{:02X})",
            endpoints.interface, endpoints.out_ep, endpoints.in_ep
        );
        self.endpoints = Some(endpoints);
        self.token = 1;
        Ok(())
    }

    fn claim(&mut self, config: &DeviceConfiguration) -> Result<Endpoints> {
        let index = if config.interfaces.is_empty() {
            0
        } else {
            PICOBOOT_INTERFACE_INDEX
        };
        #[allow(clippy::cast_possible_truncation)]
        let index_u8 = index as u8;

        let iface = config
            .interfaces
            .get(index)
            .ok_or(ProtocolError::MissingInterface(index_u8))?;
        let alt = iface
            .alternates
            .first()
            .ok_or(ProtocolError::MissingEndpoints {
                interface: iface.number,
            })?;

        if alt.class_code != VENDOR_SPECIFIC_CLASS {
            return Err(ProtocolError::UnexpectedInterfaceClass {
                interface: iface.number,
                class: alt.class_code,
            }
            .into());
        }

        let missing = ProtocolError::MissingEndpoints {
            interface: iface.number,
        };
        let (Some(out_ep), Some(in_ep)) = (alt.endpoints.first(), alt.endpoints.get(1)) else {
            return Err(missing.into());
        };
        let bulk_pair = out_ep.transfer_type == TransferType::Bulk
            && in_ep.transfer_type == TransferType::Bulk
            && !out_ep.is_in()
            && in_ep.is_in();
        if !bulk_pair {
            return Err(missing.into());
        }

        debug!(
            "Bootloader interface {} class 0x{:02X}",
            iface.number, alt.class_code
        );
        self.transport.claim_interface(iface.number)?;

        Ok(Endpoints {
            interface: iface.number,
            out_ep: out_ep.address,
            in_ep: in_ep.address,
        })
    }

    /// Reset the bootloader interface with the vendor control request.
    ///
    /// Clears any half-finished command left by an earlier host.
    pub fn reset(&mut self) -> Result<()> {
        let endpoints = self.endpoints()?;
        debug!("Resetting interface {}", endpoints.interface);
        self.transport.control_transfer_out(ControlRequest {
            request_type: RequestType::Vendor,
            recipient: Recipient::Interface,
            request: INTERFACE_RESET_REQUEST,
            value: 0,
            index: u16::from(endpoints.interface),
        })
    }

    /// Release the device handle.
    pub fn close(&mut self) -> Result<()> {
        self.endpoints = None;
        self.transport.close()
    }

    /// Return the token for the next frame and advance the counter.
    pub fn next_token(&mut self) -> Result<u32> {
        self.endpoints()?;
        let token = self.token;
        self.token = self.token.wrapping_add(1);
        Ok(token)
    }

    /// Token the next frame will carry.
    pub fn token(&self) -> u32 {
        self.token
    }

    /// Check whether the session has been opened and not closed since.
    pub fn is_open(&self) -> bool {
        self.endpoints.is_some()
    }

    /// Claimed interface number.
    pub fn interface_number(&self) -> Result<u8> {
        Ok(self.endpoints()?.interface)
    }

    /// Bulk OUT endpoint address.
    pub fn out_endpoint(&self) -> Result<u8> {
        Ok(self.endpoints()?.out_ep)
    }

    /// Bulk IN endpoint address.
    pub fn in_endpoint(&self) -> Result<u8> {
        Ok(self.endpoints()?.in_ep)
    }

    /// Borrow the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the session and return the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    fn endpoints(&self) -> Result<Endpoints> {
        self.endpoints
            .ok_or(Error::Transport(TransportError::NotOpen))
    }

    #[cfg(test)]
    pub(crate) fn set_token(&mut self, token: u32) {
        self.token = token;
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::transport::{
            AlternateSetting, EndpointInfo, InterfaceInfo,
            mock::{Event, MOCK_IN_EP, MOCK_OUT_EP, MockTransport},
        },
    };

    fn single_interface(class_code: u8, endpoints: Vec<EndpointInfo>) -> DeviceConfiguration {
        DeviceConfiguration {
            interfaces: vec![InterfaceInfo {
                number: 0,
                alternates: vec![AlternateSetting {
                    setting: 0,
                    class_code,
                    endpoints,
                }],
            }],
        }
    }

    fn ep(address: u8, transfer_type: TransferType) -> EndpointInfo {
        EndpointInfo {
            address,
            transfer_type,
        }
    }

    #[test]
    fn test_open_claims_second_interface() {
        let mut session = TransportSession::new(MockTransport::picoboot());
        session.open().unwrap();

        assert!(session.is_open());
        assert_eq!(session.interface_number().unwrap(), 1);
        assert_eq!(session.out_endpoint().unwrap(), MOCK_OUT_EP);
        assert_eq!(session.in_endpoint().unwrap(), MOCK_IN_EP);
        assert_eq!(session.token(), 1);
        assert_eq!(
            session.transport().events,
            vec![Event::Open, Event::Claim(1)]
        );
    }

    #[test]
    fn test_open_rejects_non_vendor_class() {
        let mut config = MockTransport::picoboot().config_for_test();
        config.interfaces[1].alternates[0].class_code = 0x08;
        let mut session = TransportSession::new(MockTransport::with_config(config));

        let err = session.open().unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::UnexpectedInterfaceClass {
                interface: 1,
                class: 0x08
            })
        ));
        assert!(!session.is_open());
        assert!(session.transport().closed());
        assert!(
            !session
                .transport()
                .events
                .iter()
                .any(|e| matches!(e, Event::Claim(_)))
        );
    }

    #[test]
    fn test_open_single_interface_is_missing() {
        // Index 1 is chosen whenever interfaces exist, so a lone interface
        // is reported missing rather than silently used.
        let config = single_interface(
            VENDOR_SPECIFIC_CLASS,
            vec![ep(0x01, TransferType::Bulk), ep(0x82, TransferType::Bulk)],
        );
        let mut session = TransportSession::new(MockTransport::with_config(config));

        assert!(matches!(
            session.open(),
            Err(Error::Protocol(ProtocolError::MissingInterface(1)))
        ));
        assert!(session.transport().closed());
    }

    #[test]
    fn test_open_without_interfaces() {
        let mut session =
            TransportSession::new(MockTransport::with_config(DeviceConfiguration::default()));
        assert!(matches!(
            session.open(),
            Err(Error::Protocol(ProtocolError::MissingInterface(0)))
        ));
    }

    #[test]
    fn test_open_rejects_wrong_endpoint_layout() {
        let mut base = MockTransport::picoboot().config_for_test();
        base.interfaces[1].alternates[0].endpoints =
            vec![ep(0x84, TransferType::Bulk), ep(0x03, TransferType::Bulk)];
        let mut session = TransportSession::new(MockTransport::with_config(base));
        assert!(matches!(
            session.open(),
            Err(Error::Protocol(ProtocolError::MissingEndpoints { interface: 1 }))
        ));

        let mut base = MockTransport::picoboot().config_for_test();
        base.interfaces[1].alternates[0].endpoints =
            vec![ep(0x03, TransferType::Interrupt), ep(0x84, TransferType::Bulk)];
        let mut session = TransportSession::new(MockTransport::with_config(base));
        assert!(session.open().is_err());

        let mut base = MockTransport::picoboot().config_for_test();
        base.interfaces[1].alternates[0].endpoints.truncate(1);
        let mut session = TransportSession::new(MockTransport::with_config(base));
        assert!(session.open().is_err());
    }

    #[test]
    fn test_open_failure_is_transport_error() {
        let transport = MockTransport::picoboot().fail_open(TransportError::PermissionDenied);
        let mut session = TransportSession::new(transport);
        let err = session.open().unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::PermissionDenied)
        ));
    }

    #[test]
    fn test_claim_failure_closes_transport() {
        let transport = MockTransport::picoboot().fail_claim(TransportError::Busy);
        let mut session = TransportSession::new(transport);
        assert!(matches!(
            session.open(),
            Err(Error::Transport(TransportError::Busy))
        ));
        assert!(session.transport().closed());
        assert!(!session.is_open());
    }

    #[test]
    fn test_reset_request() {
        let mut session = TransportSession::new(MockTransport::picoboot());
        session.open().unwrap();
        session.reset().unwrap();

        assert_eq!(
            session.transport().events.last(),
            Some(&Event::Control(ControlRequest {
                request_type: RequestType::Vendor,
                recipient: Recipient::Interface,
                request: 0x41,
                value: 0,
                index: 1,
            }))
        );
    }

    #[test]
    fn test_not_open() {
        let mut session = TransportSession::new(MockTransport::picoboot());
        assert!(matches!(
            session.reset(),
            Err(Error::Transport(TransportError::NotOpen))
        ));
        assert!(matches!(
            session.next_token(),
            Err(Error::Transport(TransportError::NotOpen))
        ));
        assert!(session.out_endpoint().is_err());
    }

    #[test]
    fn test_tokens_increment_and_wrap() {
        let mut session = TransportSession::new(MockTransport::picoboot());
        session.open().unwrap();
        assert_eq!(session.next_token().unwrap(), 1);
        assert_eq!(session.next_token().unwrap(), 2);

        session.set_token(u32::MAX);
        assert_eq!(session.next_token().unwrap(), u32::MAX);
        assert_eq!(session.next_token().unwrap(), 0);
        assert_eq!(session.token(), 1);
    }

    #[test]
    fn test_close_then_reopen_restarts_tokens() {
        let mut session = TransportSession::new(MockTransport::picoboot());
        session.open().unwrap();
        session.next_token().unwrap();
        session.close().unwrap();
        assert!(!session.is_open());

        session.open().unwrap();
        assert_eq!(session.next_token().unwrap(), 1);
    }
}
