//! Upgrade protocol packet: `opcode(1) | length(2, big-endian) | data`.

use tracing::warn;

use super::codes::OpCode;
use crate::error::{FrameError, FrameResult};

/// Length of the opcode and length fields.
pub const UPGRADE_HEADER_LENGTH: usize = 3;

/// A packet of the upgrade protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradePacket {
    pub opcode: OpCode,
    pub data: Vec<u8>,
}

impl UpgradePacket {
    pub fn new(opcode: OpCode, data: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode,
            data: data.into(),
        }
    }

    /// Parse an upgrade packet.
    ///
    /// A declared length that disagrees with the bytes actually present is
    /// logged and tolerated; the bytes present are always exposed as `data`.
    pub fn from_bytes(bytes: &[u8]) -> FrameResult<Self> {
        if bytes.len() < UPGRADE_HEADER_LENGTH {
            return Err(FrameError::FrameTooShort {
                needed: UPGRADE_HEADER_LENGTH,
                actual: bytes.len(),
            });
        }

        let opcode = OpCode::from_byte(bytes[0]);
        let declared = usize::from(u16::from_be_bytes([bytes[1], bytes[2]]));
        let data = bytes[UPGRADE_HEADER_LENGTH..].to_vec();

        if declared != data.len() {
            warn!(
                "Upgrade packet {:?} declares {} data bytes but carries {}",
                opcode,
                declared,
                data.len()
            );
        }

        Ok(Self { opcode, data })
    }

    /// Encode this packet. Fails when `data` does not fit the 16-bit length field.
    pub fn to_bytes(&self) -> FrameResult<Vec<u8>> {
        let length = u16::try_from(self.data.len()).map_err(|_| FrameError::PayloadTooLong {
            size: self.data.len(),
            max_size: usize::from(u16::MAX),
        })?;

        let mut bytes = Vec::with_capacity(UPGRADE_HEADER_LENGTH + self.data.len());
        bytes.push(self.opcode.value());
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes.extend_from_slice(&self.data);
        Ok(bytes)
    }
}
