//! PICOBOOT protocol implementation.

pub mod channel;
pub mod frame;

// Re-export common types
pub use {
    channel::{CommandChannel, DataPhase, ExclusiveMode},
    frame::{
        CommandFrame, CommandId, DIRECTION_IN_BIT, FRAME_SIZE, MAX_INLINE_PAYLOAD, PICOBOOT_MAGIC,
        pack_words,
    },
};
