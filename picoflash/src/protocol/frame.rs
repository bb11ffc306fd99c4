//! PICOBOOT command frame.
//!
//! ## Frame Format
//!
//! Every command starts with one 32-byte little-endian frame on the bulk OUT
//! endpoint:
//!
//! ```text
//! +------------+--------+-----+------+--------+----------+----------------+
//! |   Magic    | Token  | CMD | Size | Unused | Transfer | Inline payload |
//! +------------+--------+-----+------+--------+----------+----------------+
//! |   4 bytes  | 4 bytes|  1  |  1   | 2 bytes| 4 bytes  |    16 bytes    |
//! +------------+--------+-----+------+--------+----------+----------------+
//! | 0x431FD10B |  n     | id  | len  | 0x0000 | length   | args, 0-padded |
//! +------------+--------+-----+------+--------+----------+----------------+
//! ```
//!
//! Bit 7 of the command id selects the data phase direction: set means the
//! device sends `Transfer` bytes to the host.

use {
    crate::error::{Direction, ProtocolError},
    byteorder::{ByteOrder, LittleEndian},
    std::fmt,
};

/// Frame magic number.
pub const PICOBOOT_MAGIC: u32 = 0x431F_D10B;

/// Size of an encoded frame.
pub const FRAME_SIZE: usize = 32;

/// Maximum inline payload carried inside a frame.
pub const MAX_INLINE_PAYLOAD: usize = 16;

/// Command id bit marking a device-to-host data phase.
pub const DIRECTION_IN_BIT: u8 = 0x80;

/// PICOBOOT command ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandId {
    /// Request or release exclusive access (flag: u8).
    ExclusiveAccess = 0x01,
    /// Reboot the chip (pc, sp, delay_ms: u32).
    Reboot = 0x02,
    /// Erase a sector-aligned flash range (addr, size: u32).
    FlashErase = 0x03,
    /// Read memory (addr, size: u32), IN data phase.
    Read = 0x84,
    /// Write memory (addr, size: u32), OUT data phase.
    Write = 0x05,
    /// Leave execute-in-place mode.
    ExitXip = 0x06,
    /// Enter command-mode execute-in-place.
    EnterCmdXip = 0x07,
    /// Call a function at an address (addr: u32).
    Exec = 0x08,
    /// Relocate the flash vector table (addr: u32).
    VectorizeFlash = 0x09,
}

impl CommandId {
    /// All known commands.
    pub const ALL: [Self; 9] = [
        Self::ExclusiveAccess,
        Self::Reboot,
        Self::FlashErase,
        Self::Read,
        Self::Write,
        Self::ExitXip,
        Self::EnterCmdXip,
        Self::Exec,
        Self::VectorizeFlash,
    ];

    /// Raw wire value.
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Direction of this command's data phase.
    pub const fn direction(self) -> Direction {
        if self.id() & DIRECTION_IN_BIT != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    /// Whether the data phase flows from device to host.
    pub const fn is_device_to_host(self) -> bool {
        matches!(self.direction(), Direction::In)
    }

    /// Protocol name of the command.
    pub const fn name(self) -> &'static str {
        match self {
            Self::ExclusiveAccess => "SET_EXCLUSIVE_ACCESS",
            Self::Reboot => "REBOOT",
            Self::FlashErase => "FLASH_ERASE",
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::ExitXip => "EXIT_XIP",
            Self::EnterCmdXip => "ENTER_CMD_XIP",
            Self::Exec => "EXEC",
            Self::VectorizeFlash => "VECTORIZE_FLASH",
        }
    }
}

impl TryFrom<u8> for CommandId {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|c| c.id() == value)
            .ok_or(ProtocolError::UnknownCommand(value))
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded or to-be-encoded command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    token: u32,
    command: CommandId,
    inline_len: u8,
    inline: [u8; MAX_INLINE_PAYLOAD],
    transfer_length: u32,
}

impl CommandFrame {
    /// Create a frame.
    ///
    /// Fails if `inline` is longer than [`MAX_INLINE_PAYLOAD`].
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(
        token: u32,
        command: CommandId,
        inline: &[u8],
        transfer_length: u32,
    ) -> Result<Self, ProtocolError> {
        if inline.len() > MAX_INLINE_PAYLOAD {
            return Err(ProtocolError::InlinePayloadTooLarge(inline.len()));
        }

        let mut payload = [0u8; MAX_INLINE_PAYLOAD];
        payload[..inline.len()].copy_from_slice(inline);

        Ok(Self {
            token,
            command,
            // Bounded by MAX_INLINE_PAYLOAD above
            inline_len: inline.len() as u8,
            inline: payload,
            transfer_length,
        })
    }

    /// Session token carried by the frame.
    pub fn token(&self) -> u32 {
        self.token
    }

    /// Command id.
    pub fn command(&self) -> CommandId {
        self.command
    }

    /// The meaningful part of the inline payload.
    pub fn inline_payload(&self) -> &[u8] {
        &self.inline[..usize::from(self.inline_len)]
    }

    /// Announced data phase length.
    pub fn transfer_length(&self) -> u32 {
        self.transfer_length
    }

    /// Serialize to the 32-byte wire layout.
    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        let mut buf = [0u8; FRAME_SIZE];
        LittleEndian::write_u32(&mut buf[0..4], PICOBOOT_MAGIC);
        LittleEndian::write_u32(&mut buf[4..8], self.token);
        buf[8] = self.command.id();
        buf[9] = self.inline_len;
        // 10..12 reserved, left zero
        LittleEndian::write_u32(&mut buf[12..16], self.transfer_length);
        buf[16..32].copy_from_slice(&self.inline);
        buf
    }

    /// Parse a frame from its wire layout.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() != FRAME_SIZE {
            return Err(ProtocolError::FrameLength(buf.len()));
        }

        let magic = LittleEndian::read_u32(&buf[0..4]);
        if magic != PICOBOOT_MAGIC {
            return Err(ProtocolError::InvalidMagic(magic));
        }

        let reserved = LittleEndian::read_u16(&buf[10..12]);
        if reserved != 0 {
            return Err(ProtocolError::ReservedNotZero(reserved));
        }

        let command = CommandId::try_from(buf[8])?;
        let inline_len = usize::from(buf[9]);
        if inline_len > MAX_INLINE_PAYLOAD {
            return Err(ProtocolError::InlinePayloadTooLarge(inline_len));
        }

        Self::new(
            LittleEndian::read_u32(&buf[4..8]),
            command,
            &buf[16..16 + inline_len],
            LittleEndian::read_u32(&buf[12..16]),
        )
    }
}

/// Pack little-endian `u32` arguments into an inline payload.
pub fn pack_words(words: &[u32]) -> Vec<u8> {
    let mut buf = vec![0u8; words.len() * 4];
    LittleEndian::write_u32_into(words, &mut buf);
    buf
}
