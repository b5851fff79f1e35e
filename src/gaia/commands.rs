//! GAIA command identifiers and acknowledgement statuses used by the upgrade channel.

use serde::Serialize;

// ============================================================================
// Vendors
// ============================================================================

/// Qualcomm vendor identifier.
pub const VENDOR_QUALCOMM: u16 = 0x000A;

// ============================================================================
// Command identifiers
// ============================================================================

/// Bit set in a command identifier when the packet is an acknowledgement.
pub const ACKNOWLEDGMENT_MASK: u16 = 0x8000;

/// Opens the VM upgrade channel on the device.
pub const COMMAND_VM_UPGRADE_CONNECT: u16 = 0x0640;

/// Closes the VM upgrade channel on the device.
pub const COMMAND_VM_UPGRADE_DISCONNECT: u16 = 0x0641;

/// Carries one upgrade packet from the host to the device.
pub const COMMAND_VM_UPGRADE_CONTROL: u16 = 0x0642;

/// Registers the host for a device event.
pub const COMMAND_REGISTER_NOTIFICATION: u16 = 0x4001;

/// Cancels a registration made with [`COMMAND_REGISTER_NOTIFICATION`].
pub const COMMAND_CANCEL_NOTIFICATION: u16 = 0x4002;

/// Device-initiated event; first payload byte is the event identifier.
pub const COMMAND_EVENT_NOTIFICATION: u16 = 0x4003;

/// Event identifier of a notification that carries an upgrade packet.
pub const EVENT_VMU_PACKET: u8 = 0x12;

/// Strip the acknowledgement bit from a command identifier.
pub const fn command_of(command_id: u16) -> u16 {
    command_id & !ACKNOWLEDGMENT_MASK
}

/// Whether a command identifier carries the acknowledgement bit.
pub const fn is_acknowledgement(command_id: u16) -> bool {
    command_id & ACKNOWLEDGMENT_MASK != 0
}

// ============================================================================
// Acknowledgement statuses
// ============================================================================

/// Status byte carried as the first payload byte of an acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GaiaStatus {
    Success,
    NotSupported,
    NotAuthenticated,
    InsufficientResources,
    Authenticating,
    InvalidParameter,
    IncorrectState,
    InProgress,
    Unknown(u8),
}

impl GaiaStatus {
    /// Decode a status byte. Unknown values are preserved.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => GaiaStatus::Success,
            0x01 => GaiaStatus::NotSupported,
            0x02 => GaiaStatus::NotAuthenticated,
            0x03 => GaiaStatus::InsufficientResources,
            0x04 => GaiaStatus::Authenticating,
            0x05 => GaiaStatus::InvalidParameter,
            0x06 => GaiaStatus::IncorrectState,
            0x07 => GaiaStatus::InProgress,
            other => GaiaStatus::Unknown(other),
        }
    }

    /// Wire value of this status.
    pub fn value(&self) -> u8 {
        match self {
            GaiaStatus::Success => 0x00,
            GaiaStatus::NotSupported => 0x01,
            GaiaStatus::NotAuthenticated => 0x02,
            GaiaStatus::InsufficientResources => 0x03,
            GaiaStatus::Authenticating => 0x04,
            GaiaStatus::InvalidParameter => 0x05,
            GaiaStatus::IncorrectState => 0x06,
            GaiaStatus::InProgress => 0x07,
            GaiaStatus::Unknown(value) => *value,
        }
    }

    /// Get a human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            GaiaStatus::Success => "Success",
            GaiaStatus::NotSupported => "Command not supported",
            GaiaStatus::NotAuthenticated => "Host not authenticated",
            GaiaStatus::InsufficientResources => "Insufficient resources",
            GaiaStatus::Authenticating => "Authentication in progress",
            GaiaStatus::InvalidParameter => "Invalid parameter",
            GaiaStatus::IncorrectState => "Incorrect state",
            GaiaStatus::InProgress => "Command in progress",
            GaiaStatus::Unknown(_) => "Unknown status",
        }
    }
}
