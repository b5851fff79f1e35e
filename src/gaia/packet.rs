//! GAIA transport packet encoding for the two link types.
//!
//! The connection-oriented (BLE) variant is a bare header:
//!
//! ```text
//! vendor_id(2) | command_id(2) | payload(0..=16)
//! ```
//!
//! The serial-framed (RFCOMM) variant adds a start of frame, a version, a
//! flags byte, the payload length and an optional trailing XOR checksum:
//!
//! ```text
//! 0xFF | 0x01 | flags(1) | length(1) | vendor_id(2) | command_id(2) | payload(0..=254) | checksum(1)?
//! ```
//!
//! All multi-byte fields are big-endian.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::commands::{command_of, is_acknowledgement, GaiaStatus, ACKNOWLEDGMENT_MASK};
use crate::error::{FrameError, FrameResult};

/// Maximum payload of a connection-oriented packet.
pub const BLE_MAX_PAYLOAD: usize = 16;

/// Header length of a connection-oriented packet.
pub const BLE_HEADER_LENGTH: usize = 4;

/// Maximum payload of a serial-framed packet.
pub const SERIAL_MAX_PAYLOAD: usize = 254;

/// Header length of a serial-framed packet, checksum excluded.
pub const SERIAL_HEADER_LENGTH: usize = 8;

/// Start of frame byte of a serial-framed packet.
pub const SERIAL_SOF: u8 = 0xFF;

/// Protocol version written in serial-framed packets.
pub const SERIAL_PROTOCOL_VERSION: u8 = 0x01;

/// Flag bit announcing a trailing checksum.
pub const SERIAL_FLAG_CHECKSUM: u8 = 0x01;

/// Link type a packet travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransportKind {
    /// Connection-oriented link with a 4-byte header.
    #[default]
    Ble,
    /// Byte stream with SOF framing and optional checksum.
    Serial,
}

impl TransportKind {
    /// Maximum payload a packet of this kind can carry.
    pub const fn max_payload(self) -> usize {
        match self {
            TransportKind::Ble => BLE_MAX_PAYLOAD,
            TransportKind::Serial => SERIAL_MAX_PAYLOAD,
        }
    }
}

/// An immutable GAIA packet.
///
/// Built either from received bytes or from its fields. The encoded form is
/// computed on first use and cached.
#[derive(Debug, Clone)]
pub struct GaiaPacket {
    kind: TransportKind,
    vendor_id: u16,
    command_id: u16,
    payload: Vec<u8>,
    flags: u8,
    bytes: OnceLock<Vec<u8>>,
}

impl PartialEq for GaiaPacket {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.vendor_id == other.vendor_id
            && self.command_id == other.command_id
            && self.payload == other.payload
            && self.flags == other.flags
    }
}

impl Eq for GaiaPacket {}

impl GaiaPacket {
    /// Build a packet from its fields.
    ///
    /// Serial packets built this way carry no checksum; see [`GaiaPacket::serial`].
    pub fn new(
        kind: TransportKind,
        vendor_id: u16,
        command_id: u16,
        payload: impl Into<Vec<u8>>,
    ) -> FrameResult<Self> {
        Self::with_flags(kind, vendor_id, command_id, payload.into(), 0)
    }

    /// Build a serial-framed packet, optionally protected by a checksum.
    pub fn serial(
        vendor_id: u16,
        command_id: u16,
        payload: impl Into<Vec<u8>>,
        checksum: bool,
    ) -> FrameResult<Self> {
        let flags = if checksum { SERIAL_FLAG_CHECKSUM } else { 0 };
        Self::with_flags(TransportKind::Serial, vendor_id, command_id, payload.into(), flags)
    }

    fn with_flags(
        kind: TransportKind,
        vendor_id: u16,
        command_id: u16,
        payload: Vec<u8>,
        flags: u8,
    ) -> FrameResult<Self> {
        check_payload_length(kind, payload.len())?;
        Ok(Self {
            kind,
            vendor_id,
            command_id,
            payload,
            flags,
            bytes: OnceLock::new(),
        })
    }

    /// Parse a packet received on a link of the given kind.
    pub fn from_bytes(kind: TransportKind, data: &[u8]) -> FrameResult<Self> {
        let packet = match kind {
            TransportKind::Ble => parse_ble(data)?,
            TransportKind::Serial => parse_serial(data)?,
        };
        // The source buffer is already the encoded form.
        let _ = packet.bytes.set(data.to_vec());
        Ok(packet)
    }

    /// Encoded bytes of this packet.
    pub fn to_bytes(&self) -> &[u8] {
        self.bytes.get_or_init(|| match self.kind {
            TransportKind::Ble => encode_ble(self.vendor_id, self.command_id, &self.payload),
            TransportKind::Serial => {
                encode_serial(self.vendor_id, self.command_id, &self.payload, self.has_checksum())
            }
        })
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    /// Raw command identifier, acknowledgement bit included.
    pub fn command_id(&self) -> u16 {
        self.command_id
    }

    /// Command identifier without the acknowledgement bit.
    pub fn command(&self) -> u16 {
        command_of(self.command_id)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Whether a serial-framed packet carries a checksum.
    pub fn has_checksum(&self) -> bool {
        self.flags & SERIAL_FLAG_CHECKSUM != 0
    }

    pub fn is_acknowledgement(&self) -> bool {
        is_acknowledgement(self.command_id)
    }

    /// Status of an acknowledgement, `None` for any other packet.
    pub fn status(&self) -> Option<GaiaStatus> {
        if !self.is_acknowledgement() {
            return None;
        }
        self.payload.first().map(|&byte| GaiaStatus::from_byte(byte))
    }

    /// Build the acknowledgement of this packet.
    ///
    /// The reply payload is the status byte followed by `data`, truncated so
    /// that the whole payload fits the transport variant.
    pub fn acknowledgement(&self, status: GaiaStatus, data: &[u8]) -> FrameResult<GaiaPacket> {
        if self.is_acknowledgement() {
            return Err(FrameError::AlreadyAcknowledgement {
                command_id: self.command_id,
            });
        }

        let data_len = data.len().min(self.kind.max_payload() - 1);
        let mut payload = Vec::with_capacity(1 + data_len);
        payload.push(status.value());
        payload.extend_from_slice(&data[..data_len]);

        Self::with_flags(
            self.kind,
            self.vendor_id,
            self.command_id | ACKNOWLEDGMENT_MASK,
            payload,
            self.flags,
        )
    }
}

/// Encode a packet without checksum.
pub fn encode(
    kind: TransportKind,
    vendor_id: u16,
    command_id: u16,
    payload: &[u8],
) -> FrameResult<Vec<u8>> {
    check_payload_length(kind, payload.len())?;
    Ok(match kind {
        TransportKind::Ble => encode_ble(vendor_id, command_id, payload),
        TransportKind::Serial => encode_serial(vendor_id, command_id, payload, false),
    })
}

/// Decode a packet received on a link of the given kind.
pub fn decode(kind: TransportKind, data: &[u8]) -> FrameResult<GaiaPacket> {
    GaiaPacket::from_bytes(kind, data)
}

/// XOR of every byte in `data`.
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, &byte| acc ^ byte)
}

fn check_payload_length(kind: TransportKind, size: usize) -> FrameResult<()> {
    let max_size = kind.max_payload();
    if size > max_size {
        return Err(FrameError::PayloadTooLong { size, max_size });
    }
    Ok(())
}

fn encode_ble(vendor_id: u16, command_id: u16, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(BLE_HEADER_LENGTH + payload.len());
    bytes.extend_from_slice(&vendor_id.to_be_bytes());
    bytes.extend_from_slice(&command_id.to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

fn encode_serial(vendor_id: u16, command_id: u16, payload: &[u8], checksum: bool) -> Vec<u8> {
    let flags = if checksum { SERIAL_FLAG_CHECKSUM } else { 0 };
    let mut bytes = Vec::with_capacity(SERIAL_HEADER_LENGTH + payload.len() + 1);
    bytes.push(SERIAL_SOF);
    bytes.push(SERIAL_PROTOCOL_VERSION);
    bytes.push(flags);
    bytes.push(payload.len() as u8);
    bytes.extend_from_slice(&vendor_id.to_be_bytes());
    bytes.extend_from_slice(&command_id.to_be_bytes());
    bytes.extend_from_slice(payload);

    if checksum {
        let sum = xor_checksum(&bytes);
        bytes.push(sum);
    }

    bytes
}

fn parse_ble(data: &[u8]) -> FrameResult<GaiaPacket> {
    if data.len() < BLE_HEADER_LENGTH {
        return Err(FrameError::FrameTooShort {
            needed: BLE_HEADER_LENGTH,
            actual: data.len(),
        });
    }

    let payload = data[BLE_HEADER_LENGTH..].to_vec();
    check_payload_length(TransportKind::Ble, payload.len())?;

    Ok(GaiaPacket {
        kind: TransportKind::Ble,
        vendor_id: u16::from_be_bytes([data[0], data[1]]),
        command_id: u16::from_be_bytes([data[2], data[3]]),
        payload,
        flags: 0,
        bytes: OnceLock::new(),
    })
}

fn parse_serial(data: &[u8]) -> FrameResult<GaiaPacket> {
    if data.len() < SERIAL_HEADER_LENGTH {
        return Err(FrameError::FrameTooShort {
            needed: SERIAL_HEADER_LENGTH,
            actual: data.len(),
        });
    }
    if data[0] != SERIAL_SOF {
        return Err(FrameError::BadStartOfFrame(data[0]));
    }

    let flags = data[2];
    let checksum_len = usize::from(flags & SERIAL_FLAG_CHECKSUM != 0);
    let needed = SERIAL_HEADER_LENGTH + checksum_len;
    if data.len() < needed {
        return Err(FrameError::FrameTooShort {
            needed,
            actual: data.len(),
        });
    }

    let payload_len = data.len() - needed;
    check_payload_length(TransportKind::Serial, payload_len)?;

    if data[1] != SERIAL_PROTOCOL_VERSION {
        warn!("Serial frame has protocol version {}, expected {}", data[1], SERIAL_PROTOCOL_VERSION);
    }
    if usize::from(data[3]) != payload_len {
        warn!(
            "Serial frame declares {} payload bytes but carries {}",
            data[3], payload_len
        );
    }

    if checksum_len == 1 {
        let expected = xor_checksum(&data[..data.len() - 1]);
        let actual = data[data.len() - 1];
        if expected != actual {
            return Err(FrameError::ChecksumMismatch { expected, actual });
        }
    }

    let end = SERIAL_HEADER_LENGTH + payload_len;
    Ok(GaiaPacket {
        kind: TransportKind::Serial,
        vendor_id: u16::from_be_bytes([data[4], data[5]]),
        command_id: u16::from_be_bytes([data[6], data[7]]),
        payload: data[SERIAL_HEADER_LENGTH..end].to_vec(),
        flags,
        bytes: OnceLock::new(),
    })
}
