//! GAIA transport packets.
//!
//! Every command exchanged with the device travels in a GAIA packet. Two
//! link types are supported: the connection-oriented BLE link with a 4-byte
//! header, and the serial (RFCOMM) link with SOF framing and an optional
//! XOR checksum. Upgrade traffic is carried in `VM_UPGRADE_CONTROL` commands
//! towards the device and in `VMU_PACKET` event notifications back.

pub mod commands;
mod decoder;
mod framer;
mod packet;

pub use commands::GaiaStatus;
pub use decoder::FrameDecoder;
pub use framer::{GaiaFramer, Inbound};
pub use packet::{
    decode, encode, xor_checksum, GaiaPacket, TransportKind, BLE_MAX_PAYLOAD, SERIAL_MAX_PAYLOAD,
};
