//! Error types for the GAIA upgrade protocol implementation.

use thiserror::Error;

use crate::gaia::GaiaStatus;
use crate::upgrade::codes::{OpCode, ReturnCode};

/// Result type alias for packet codec operations.
pub type FrameResult<T> = Result<T, FrameError>;

/// Result type alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors raised while encoding or decoding GAIA and upgrade packets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Buffer is shorter than the mandatory header of the packet type.
    #[error("Frame too short: need at least {needed} bytes, got {actual}")]
    FrameTooShort { needed: usize, actual: usize },

    /// Payload exceeds the maximum allowed by the transport variant.
    #[error("Payload size {size} exceeds maximum {max_size}")]
    PayloadTooLong { size: usize, max_size: usize },

    /// Tried to acknowledge a packet that is itself an acknowledgement.
    #[error("Packet 0x{command_id:04X} is already an acknowledgement")]
    AlreadyAcknowledgement { command_id: u16 },

    /// Serial frame does not begin with the start-of-frame byte.
    #[error("Invalid start of frame 0x{0:02X}")]
    BadStartOfFrame(u8),

    /// Serial frame checksum does not match its contents.
    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

/// Errors from the byte channel carrying GAIA packets.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Serial port error from the serialport crate.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Standard I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The receiving side of the channel has gone away.
    #[error("Transport channel closed")]
    Closed,
}

/// Host-side faults reported through [`UpgradeError::Exception`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExceptionKind {
    /// The firmware image is larger than a 32-bit length can describe.
    #[error("Firmware file of {size} bytes is too big")]
    FileTooBig { size: u64 },

    /// The firmware image could not be read.
    #[error("Failed to read firmware file: {reason}")]
    FileReadFailed { reason: String },

    /// A packet could not be encoded or decoded.
    #[error("{0}")]
    Frame(#[from] FrameError),

    /// The device sent an opcode the host does not expect during an upgrade.
    #[error("Unexpected opcode {0:?}")]
    UnexpectedOpCode(OpCode),

    /// The device refused an upgrade control packet.
    #[error("Upgrade control packet acknowledged with status {0:?}")]
    UnsuccessfulAcknowledgement(GaiaStatus),
}

/// Errors reported to the upgrade listener.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpgradeError {
    /// The device kept answering "application not ready" to the start request.
    #[error("Device is not ready to upgrade")]
    BoardNotReady,

    /// The device sent a confirmation with unexpected or missing data.
    #[error("Device sent unexpected data")]
    WrongDataParameter,

    /// The device reported a fatal return code.
    #[error("Device reported error 0x{:02X}: {}", .code.value(), .code.description())]
    ReceivedErrorFromBoard { code: ReturnCode },

    /// A fault on the host side.
    #[error("Host exception: {kind}")]
    Exception { kind: ExceptionKind },

    /// An upgrade session is already running.
    #[error("An upgrade is already in progress")]
    AlreadyUpgrading,

    /// No firmware image was provided, or it was empty.
    #[error("No firmware file to upload")]
    NoFile,
}

impl UpgradeError {
    /// Get a user-friendly error code for support purposes.
    pub fn error_code(&self) -> &'static str {
        match self {
            UpgradeError::BoardNotReady => "GAIA-001",
            UpgradeError::WrongDataParameter => "GAIA-002",
            UpgradeError::ReceivedErrorFromBoard { .. } => "GAIA-003",
            UpgradeError::Exception { kind } => match kind {
                ExceptionKind::FileTooBig { .. } => "GAIA-010",
                ExceptionKind::FileReadFailed { .. } => "GAIA-011",
                ExceptionKind::Frame(_) => "GAIA-020",
                ExceptionKind::UnexpectedOpCode(_) => "GAIA-021",
                ExceptionKind::UnsuccessfulAcknowledgement(_) => "GAIA-022",
            },
            UpgradeError::AlreadyUpgrading => "GAIA-030",
            UpgradeError::NoFile => "GAIA-031",
        }
    }

    /// Whether the error was raised on the host rather than by the device.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            UpgradeError::Exception { .. } | UpgradeError::AlreadyUpgrading | UpgradeError::NoFile
        )
    }
}

impl From<ExceptionKind> for UpgradeError {
    fn from(kind: ExceptionKind) -> Self {
        UpgradeError::Exception { kind }
    }
}

impl From<FrameError> for UpgradeError {
    fn from(error: FrameError) -> Self {
        UpgradeError::Exception {
            kind: ExceptionKind::Frame(error),
        }
    }
}

/// Errors loading or saving an [`crate::config::UpgradeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors returned by [`crate::driver::UpgradeHandle`].
#[derive(Debug, Error)]
pub enum DriverError {
    /// The driver task has stopped.
    #[error("Upgrade driver is not running")]
    Closed,

    /// The upgrade could not be started.
    #[error(transparent)]
    Upgrade(#[from] UpgradeError),

    /// The task loading the firmware file panicked or was cancelled.
    #[error("Firmware load task failed: {0}")]
    Load(#[from] tokio::task::JoinError),
}
