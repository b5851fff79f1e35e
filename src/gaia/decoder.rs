//! Streaming decoder for serial-framed GAIA packets.
//!
//! Bytes read from an RFCOMM/serial link arrive in arbitrary chunks. The
//! decoder waits for a start of frame, reads the length and flags from the
//! header and yields a packet once the whole frame has been buffered.

use tracing::debug;

use super::packet::{
    GaiaPacket, TransportKind, SERIAL_FLAG_CHECKSUM, SERIAL_HEADER_LENGTH, SERIAL_SOF,
};
use crate::error::FrameResult;

/// Largest possible serial frame: header, maximum length byte and checksum.
pub const MAX_SERIAL_FRAME_SIZE: usize = SERIAL_HEADER_LENGTH + 255 + 1;

/// Position of the flags byte in a serial frame.
const FLAGS_OFFSET: usize = 2;

/// Position of the length byte in a serial frame.
const LENGTH_OFFSET: usize = 3;

/// Streaming decoder for serial-framed packets.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Create a new decoder.
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_SERIAL_FRAME_SIZE),
        }
    }

    /// Feed a byte to the decoder.
    ///
    /// Returns `Some` when a complete frame has been received.
    pub fn feed(&mut self, byte: u8) -> Option<FrameResult<GaiaPacket>> {
        if self.buffer.is_empty() && byte != SERIAL_SOF {
            debug!("Dropping byte 0x{:02X} outside of a frame", byte);
            return None;
        }

        self.buffer.push(byte);

        let expected = self.expected_len()?;
        if self.buffer.len() < expected {
            return None;
        }

        let frame = std::mem::take(&mut self.buffer);
        Some(GaiaPacket::from_bytes(TransportKind::Serial, &frame))
    }

    /// Feed a chunk of bytes, returning every frame it completes.
    pub fn push(&mut self, data: &[u8]) -> Vec<FrameResult<GaiaPacket>> {
        data.iter().filter_map(|&byte| self.feed(byte)).collect()
    }

    /// Reset the decoder state.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Number of bytes buffered for the frame being assembled.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn expected_len(&self) -> Option<usize> {
        if self.buffer.len() <= LENGTH_OFFSET {
            return None;
        }
        let payload = usize::from(self.buffer[LENGTH_OFFSET]);
        let checksum = usize::from(self.buffer[FLAGS_OFFSET] & SERIAL_FLAG_CHECKSUM != 0);
        Some(SERIAL_HEADER_LENGTH + payload + checksum)
    }
}
