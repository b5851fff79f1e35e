//! Wraps upgrade traffic in GAIA packets and classifies what the device sends back.

use super::commands::{
    GaiaStatus, COMMAND_CANCEL_NOTIFICATION, COMMAND_EVENT_NOTIFICATION,
    COMMAND_REGISTER_NOTIFICATION, COMMAND_VM_UPGRADE_CONNECT, COMMAND_VM_UPGRADE_CONTROL,
    COMMAND_VM_UPGRADE_DISCONNECT, EVENT_VMU_PACKET,
};
use super::packet::{GaiaPacket, TransportKind};
use crate::error::FrameResult;
use crate::upgrade::packet::UPGRADE_HEADER_LENGTH;

/// A received GAIA packet, sorted by what the upgrade channel does with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Event notification carrying an upgrade packet.
    UpgradePacket {
        notification: GaiaPacket,
        data: Vec<u8>,
    },
    /// Acknowledgement of a `VM_UPGRADE_CONTROL` command.
    ControlAck(Option<GaiaStatus>),
    /// Acknowledgement of any other command.
    Acknowledgement {
        command: u16,
        status: Option<GaiaStatus>,
    },
    /// Anything the upgrade channel does not handle.
    Other(GaiaPacket),
}

/// Builds and classifies the GAIA packets of the upgrade channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GaiaFramer {
    kind: TransportKind,
    vendor_id: u16,
    checksum: bool,
}

impl GaiaFramer {
    /// Create a framer. `checksum` only applies to serial-framed links.
    pub fn new(kind: TransportKind, vendor_id: u16, checksum: bool) -> Self {
        Self {
            kind,
            vendor_id,
            checksum: checksum && kind == TransportKind::Serial,
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Largest upgrade packet data field that fits in one control command.
    pub fn upgrade_data_budget(&self) -> usize {
        self.kind.max_payload() - UPGRADE_HEADER_LENGTH
    }

    /// Build a packet from this framer's vendor and link settings.
    pub fn packet(&self, command_id: u16, payload: impl Into<Vec<u8>>) -> FrameResult<GaiaPacket> {
        match self.kind {
            TransportKind::Ble => GaiaPacket::new(self.kind, self.vendor_id, command_id, payload),
            TransportKind::Serial => {
                GaiaPacket::serial(self.vendor_id, command_id, payload, self.checksum)
            }
        }
    }

    /// Wrap an encoded upgrade packet in a `VM_UPGRADE_CONTROL` command.
    pub fn upgrade_control(&self, upgrade_packet: &[u8]) -> FrameResult<Vec<u8>> {
        self.encode(COMMAND_VM_UPGRADE_CONTROL, upgrade_packet)
    }

    /// `VM_UPGRADE_CONNECT` command.
    pub fn upgrade_connect(&self) -> FrameResult<Vec<u8>> {
        self.encode(COMMAND_VM_UPGRADE_CONNECT, &[])
    }

    /// `VM_UPGRADE_DISCONNECT` command.
    pub fn upgrade_disconnect(&self) -> FrameResult<Vec<u8>> {
        self.encode(COMMAND_VM_UPGRADE_DISCONNECT, &[])
    }

    /// Registration for upgrade packet notifications.
    pub fn register_upgrade_notifications(&self) -> FrameResult<Vec<u8>> {
        self.encode(COMMAND_REGISTER_NOTIFICATION, &[EVENT_VMU_PACKET])
    }

    /// Cancels the registration made by [`Self::register_upgrade_notifications`].
    pub fn cancel_upgrade_notifications(&self) -> FrameResult<Vec<u8>> {
        self.encode(COMMAND_CANCEL_NOTIFICATION, &[EVENT_VMU_PACKET])
    }

    /// Decode received bytes.
    pub fn decode(&self, data: &[u8]) -> FrameResult<GaiaPacket> {
        GaiaPacket::from_bytes(self.kind, data)
    }

    /// Encoded acknowledgement of a received packet.
    pub fn acknowledge(&self, packet: &GaiaPacket, status: GaiaStatus) -> FrameResult<Vec<u8>> {
        Ok(packet.acknowledgement(status, &[])?.to_bytes().to_vec())
    }

    /// Sort a received packet.
    pub fn classify(&self, packet: GaiaPacket) -> Inbound {
        if packet.is_acknowledgement() {
            let status = packet.status();
            return match packet.command() {
                COMMAND_VM_UPGRADE_CONTROL => Inbound::ControlAck(status),
                command => Inbound::Acknowledgement { command, status },
            };
        }

        let is_upgrade_event = packet.command() == COMMAND_EVENT_NOTIFICATION
            && packet.payload().first() == Some(&EVENT_VMU_PACKET);
        if is_upgrade_event {
            let data = packet.payload()[1..].to_vec();
            return Inbound::UpgradePacket {
                notification: packet,
                data,
            };
        }

        Inbound::Other(packet)
    }

    fn encode(&self, command_id: u16, payload: &[u8]) -> FrameResult<Vec<u8>> {
        Ok(self.packet(command_id, payload.to_vec())?.to_bytes().to_vec())
    }
}
