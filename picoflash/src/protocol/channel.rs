//! PICOBOOT command channel.
//!
//! Every command is one frame on the OUT endpoint, an optional data phase and
//! exactly one status phase. The status phase always flows against the data
//! direction:
//!
//! ```text
//! IN-class  (bit 7 set):   OUT frame -> IN data  -> OUT zero byte
//! OUT-class / no data:     OUT frame -> OUT data -> IN status byte
//! ```

use {
    crate::{
        error::{Direction, Error, ProtocolError, Result, TransportError},
        protocol::frame::{CommandFrame, CommandId, pack_words},
        session::TransportSession,
        transport::Transport,
    },
    log::{debug, trace},
    std::fmt,
};

/// Exclusivity requested with `SET_EXCLUSIVE_ACCESS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ExclusiveMode {
    /// Share flash with the mass-storage view.
    NotExclusive = 0,
    /// Lock out the mass-storage view while programming.
    #[default]
    Exclusive = 1,
    /// Lock out the mass-storage view and eject the drive.
    ExclusiveAndEject = 2,
}

impl fmt::Display for ExclusiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotExclusive => write!(f, "not exclusive"),
            Self::Exclusive => write!(f, "exclusive"),
            Self::ExclusiveAndEject => write!(f, "exclusive and eject"),
        }
    }
}

/// Data phase of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataPhase<'a> {
    /// No data phase.
    None,
    /// Device sends this many bytes to the host.
    In(u32),
    /// Host sends these bytes to the device.
    Out(&'a [u8]),
}

/// Frames commands over an open [`TransportSession`].
pub struct CommandChannel<T: Transport> {
    session: TransportSession<T>,
}

impl<T: Transport> CommandChannel<T> {
    /// Wrap a session. The session must be opened before the first command.
    pub fn new(session: TransportSession<T>) -> Self {
        Self { session }
    }

    /// Send one command and run its data and status phases.
    ///
    /// Returns the data read for IN-class commands, the status bytes (zero
    /// or one) otherwise. The data phase direction must match the command.
    #[allow(clippy::cast_possible_truncation)]
    pub fn send(
        &mut self,
        command: CommandId,
        inline: &[u8],
        phase: DataPhase<'_>,
    ) -> Result<Vec<u8>> {
        let transfer_length = match phase {
            DataPhase::None => 0,
            DataPhase::In(length) => {
                Self::check_direction(command, Direction::In)?;
                length
            },
            DataPhase::Out(data) => {
                Self::check_direction(command, Direction::Out)?;
                u32::try_from(data.len())
                    .map_err(|_| ProtocolError::TransferTooLarge(data.len()))?
            },
        };

        let out_ep = self.session.out_endpoint()?;
        let in_ep = self.session.in_endpoint()?;

        let frame = CommandFrame::new(self.session.token(), command, inline, transfer_length)?;
        self.session.next_token()?;

        debug!(
            "{command} token={} inline={} transfer={transfer_length}",
            frame.token(),
            inline.len()
        );
        trace!("frame: {:02X?}", frame.encode());
        self.write_all(out_ep, &frame.encode())?;

        if let DataPhase::Out(data) = phase {
            if !data.is_empty() {
                self.write_all(out_ep, data)?;
            }
        }

        if command.is_device_to_host() {
            let mut data = Vec::new();
            if let DataPhase::In(length) = phase {
                if length > 0 {
                    let expected = length as usize;
                    data = self.session.transport_mut().bulk_read(in_ep, expected)?;
                    trace!("read {} of {expected} bytes", data.len());
                    if data.len() != expected {
                        return Err(ProtocolError::ShortRead {
                            expected,
                            actual: data.len(),
                        }
                        .into());
                    }
                }
            }
            self.write_all(out_ep, &[0])?;
            Ok(data)
        } else {
            let status = self.session.transport_mut().bulk_read(in_ep, 1)?;
            trace!("status: {status:02X?}");
            if status.len() > 1 {
                return Err(ProtocolError::MalformedStatus(status.len()).into());
            }
            Ok(status)
        }
    }

    fn check_direction(command: CommandId, requested: Direction) -> Result<()> {
        if command.direction() == requested {
            Ok(())
        } else {
            Err(ProtocolError::DirectionMismatch { command, requested }.into())
        }
    }

    fn write_all(&mut self, endpoint: u8, data: &[u8]) -> Result<()> {
        let written = self.session.transport_mut().bulk_write(endpoint, data)?;
        if written != data.len() {
            return Err(Error::Transport(TransportError::ShortWrite {
                endpoint,
                expected: data.len(),
                written,
            }));
        }
        Ok(())
    }

    /// Request or release exclusive access to flash.
    pub fn set_exclusive_access(&mut self, mode: ExclusiveMode) -> Result<()> {
        self.send(CommandId::ExclusiveAccess, &[mode as u8], DataPhase::None)?;
        Ok(())
    }

    /// Reboot into `pc` with stack pointer `sp` after `delay_ms`.
    ///
    /// `pc = 0` boots normally from flash.
    pub fn reboot(&mut self, pc: u32, sp: u32, delay_ms: u32) -> Result<()> {
        self.send(
            CommandId::Reboot,
            &pack_words(&[pc, sp, delay_ms]),
            DataPhase::None,
        )?;
        Ok(())
    }

    /// Erase `size` bytes of flash at `addr`. Both must be sector aligned.
    pub fn flash_erase(&mut self, addr: u32, size: u32) -> Result<()> {
        self.send(
            CommandId::FlashErase,
            &pack_words(&[addr, size]),
            DataPhase::None,
        )?;
        Ok(())
    }

    /// Read `size` bytes of memory at `addr`.
    pub fn read(&mut self, addr: u32, size: u32) -> Result<Vec<u8>> {
        self.send(
            CommandId::Read,
            &pack_words(&[addr, size]),
            DataPhase::In(size),
        )
    }

    /// Write `data` to memory at `addr`.
    pub fn write(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let size =
            u32::try_from(data.len()).map_err(|_| ProtocolError::TransferTooLarge(data.len()))?;
        self.send(
            CommandId::Write,
            &pack_words(&[addr, size]),
            DataPhase::Out(data),
        )?;
        Ok(())
    }

    /// Leave execute-in-place mode so flash can be erased and written.
    pub fn exit_xip(&mut self) -> Result<()> {
        self.send(CommandId::ExitXip, &[], DataPhase::None)?;
        Ok(())
    }

    /// Enter command-mode execute-in-place.
    pub fn enter_cmd_xip(&mut self) -> Result<()> {
        self.send(CommandId::EnterCmdXip, &[], DataPhase::None)?;
        Ok(())
    }

    /// Call the function at `addr`.
    pub fn exec(&mut self, addr: u32) -> Result<()> {
        self.send(CommandId::Exec, &pack_words(&[addr]), DataPhase::None)?;
        Ok(())
    }

    /// Point the flash vector table at `addr`.
    pub fn vectorize_flash(&mut self, addr: u32) -> Result<()> {
        self.send(
            CommandId::VectorizeFlash,
            &pack_words(&[addr]),
            DataPhase::None,
        )?;
        Ok(())
    }

    /// Borrow the session.
    pub fn session(&self) -> &TransportSession<T> {
        &self.session
    }

    /// Mutably borrow the session.
    pub fn session_mut(&mut self) -> &mut TransportSession<T> {
        &mut self.session
    }

    /// Consume the channel and return the session.
    pub fn into_session(self) -> TransportSession<T> {
        self.session
    }
}
