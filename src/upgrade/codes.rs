//! Upgrade protocol tables: operation codes, device return codes, resume points.
//!
//! Each phase of the upgrade is a request/confirm handshake: the host sends a
//! `*Req` and the device answers with the matching `*Cfm`, or the device
//! raises an `*Ind` and the host answers with a `*Res`. The error/warning
//! indication may arrive at any time and must be echoed back before it is
//! handled.

use serde::Serialize;

// ============================================================================
// Operation codes
// ============================================================================

/// Operation code of an upgrade packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OpCode {
    StartReq,
    StartCfm,
    DataBytesReq,
    Data,
    /// Deprecated.
    SuspendInd,
    /// Deprecated.
    ResumeInd,
    AbortReq,
    AbortCfm,
    /// Deprecated.
    ProgressReq,
    /// Deprecated.
    ProgressCfm,
    TransferCompleteInd,
    TransferCompleteRes,
    /// Deprecated.
    InProgressInd,
    InProgressRes,
    CommitReq,
    CommitCfm,
    ErrorWarnInd,
    CompleteInd,
    SyncReq,
    SyncCfm,
    StartDataReq,
    IsValidationDoneReq,
    IsValidationDoneCfm,
    /// Deprecated.
    SyncAfterRebootReq,
    VersionReq,
    VersionCfm,
    VariantReq,
    VariantCfm,
    /// Deprecated.
    EraseSqifCfm,
    ErrorWarnRes,
    Unknown(u8),
}

impl OpCode {
    /// Decode an opcode byte. Unknown values are preserved.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x01 => OpCode::StartReq,
            0x02 => OpCode::StartCfm,
            0x03 => OpCode::DataBytesReq,
            0x04 => OpCode::Data,
            0x05 => OpCode::SuspendInd,
            0x06 => OpCode::ResumeInd,
            0x07 => OpCode::AbortReq,
            0x08 => OpCode::AbortCfm,
            0x09 => OpCode::ProgressReq,
            0x0A => OpCode::ProgressCfm,
            0x0B => OpCode::TransferCompleteInd,
            0x0C => OpCode::TransferCompleteRes,
            0x0D => OpCode::InProgressInd,
            0x0E => OpCode::InProgressRes,
            0x0F => OpCode::CommitReq,
            0x10 => OpCode::CommitCfm,
            0x11 => OpCode::ErrorWarnInd,
            0x12 => OpCode::CompleteInd,
            0x13 => OpCode::SyncReq,
            0x14 => OpCode::SyncCfm,
            0x15 => OpCode::StartDataReq,
            0x16 => OpCode::IsValidationDoneReq,
            0x17 => OpCode::IsValidationDoneCfm,
            0x18 => OpCode::SyncAfterRebootReq,
            0x19 => OpCode::VersionReq,
            0x1A => OpCode::VersionCfm,
            0x1B => OpCode::VariantReq,
            0x1C => OpCode::VariantCfm,
            0x1D => OpCode::EraseSqifCfm,
            0x1F => OpCode::ErrorWarnRes,
            other => OpCode::Unknown(other),
        }
    }

    /// Wire value of this opcode.
    pub fn value(&self) -> u8 {
        match self {
            OpCode::StartReq => 0x01,
            OpCode::StartCfm => 0x02,
            OpCode::DataBytesReq => 0x03,
            OpCode::Data => 0x04,
            OpCode::SuspendInd => 0x05,
            OpCode::ResumeInd => 0x06,
            OpCode::AbortReq => 0x07,
            OpCode::AbortCfm => 0x08,
            OpCode::ProgressReq => 0x09,
            OpCode::ProgressCfm => 0x0A,
            OpCode::TransferCompleteInd => 0x0B,
            OpCode::TransferCompleteRes => 0x0C,
            OpCode::InProgressInd => 0x0D,
            OpCode::InProgressRes => 0x0E,
            OpCode::CommitReq => 0x0F,
            OpCode::CommitCfm => 0x10,
            OpCode::ErrorWarnInd => 0x11,
            OpCode::CompleteInd => 0x12,
            OpCode::SyncReq => 0x13,
            OpCode::SyncCfm => 0x14,
            OpCode::StartDataReq => 0x15,
            OpCode::IsValidationDoneReq => 0x16,
            OpCode::IsValidationDoneCfm => 0x17,
            OpCode::SyncAfterRebootReq => 0x18,
            OpCode::VersionReq => 0x19,
            OpCode::VersionCfm => 0x1A,
            OpCode::VariantReq => 0x1B,
            OpCode::VariantCfm => 0x1C,
            OpCode::EraseSqifCfm => 0x1D,
            OpCode::ErrorWarnRes => 0x1F,
            OpCode::Unknown(value) => *value,
        }
    }

    /// Flow-control codes the device no longer uses.
    pub fn is_deprecated(&self) -> bool {
        matches!(
            self,
            OpCode::SuspendInd
                | OpCode::ResumeInd
                | OpCode::ProgressReq
                | OpCode::ProgressCfm
                | OpCode::InProgressInd
                | OpCode::SyncAfterRebootReq
                | OpCode::EraseSqifCfm
        )
    }
}

// ============================================================================
// Return codes
// ============================================================================

macro_rules! return_codes {
    ($($name:ident = $value:literal => $description:literal,)+) => {
        /// Return code reported by the device in an error/warning indication.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum ReturnCode {
            $($name,)+
            Unknown(u16),
        }

        impl ReturnCode {
            /// Decode a return code. Unknown values are preserved.
            pub fn from_u16(value: u16) -> Self {
                match value {
                    $($value => ReturnCode::$name,)+
                    other => ReturnCode::Unknown(other),
                }
            }

            /// Wire value of this code.
            pub fn value(&self) -> u16 {
                match self {
                    $(ReturnCode::$name => $value,)+
                    ReturnCode::Unknown(value) => *value,
                }
            }

            /// Get a human-readable description.
            pub fn description(&self) -> &'static str {
                match self {
                    $(ReturnCode::$name => $description,)+
                    ReturnCode::Unknown(_) => "Unknown return code",
                }
            }
        }
    };
}

return_codes! {
    Success = 0x00 => "Success",
    ErrorInternalErrorDeprecated = 0x10 => "Internal error",
    ErrorUnknownId = 0x11 => "Unknown upgrade file identifier",
    ErrorBadLengthDeprecated = 0x12 => "Bad length",
    ErrorWrongVariant = 0x13 => "Upgrade file is for another device variant",
    ErrorWrongPartitionNumber = 0x14 => "Wrong partition number",
    ErrorPartitionSizeMismatch = 0x15 => "Partition size mismatch",
    ErrorPartitionTypeNotFoundDeprecated = 0x16 => "Partition type not found",
    ErrorPartitionOpenFailed = 0x17 => "Partition could not be opened",
    ErrorPartitionWriteFailedDeprecated = 0x18 => "Partition write failed",
    ErrorPartitionCloseFailedDeprecated = 0x19 => "Partition close failed",
    ErrorSfsValidationFailed = 0x1A => "SFS validation failed",
    ErrorOemValidationFailedDeprecated = 0x1B => "OEM validation failed",
    ErrorUpdateFailed = 0x1C => "Update failed",
    ErrorAppNotReady = 0x1D => "Application not ready",
    ErrorLoaderError = 0x1E => "Loader error",
    ErrorUnexpectedLoaderMsg = 0x1F => "Unexpected loader message",
    ErrorMissingLoaderMsg = 0x20 => "Missing loader message",
    ErrorBatteryLow = 0x21 => "Battery low",
    ErrorInvalidSyncId = 0x22 => "Invalid synchronisation identifier",
    ErrorInErrorState = 0x23 => "Device is in an error state",
    ErrorNoMemory = 0x24 => "Device is out of memory",
    ErrorBadLengthPartitionParse = 0x30 => "Bad length while parsing partition",
    ErrorBadLengthTooShort = 0x31 => "Upgrade file too short",
    ErrorBadLengthUpgradeHeader = 0x32 => "Bad upgrade header length",
    ErrorBadLengthPartitionHeader = 0x33 => "Bad partition header length",
    ErrorBadLengthSignature = 0x34 => "Bad signature length",
    ErrorBadLengthDatahdrResume = 0x35 => "Bad data header length on resume",
    ErrorOemValidationFailedHeaders = 0x38 => "OEM validation of headers failed",
    ErrorOemValidationFailedUpgradeHeader = 0x39 => "OEM validation of upgrade header failed",
    ErrorOemValidationFailedPartitionHeader1 = 0x3A => "OEM validation of partition header 1 failed",
    ErrorOemValidationFailedPartitionHeader2 = 0x3B => "OEM validation of partition header 2 failed",
    ErrorOemValidationFailedPartitionData = 0x3C => "OEM validation of partition data failed",
    ErrorOemValidationFailedFooter = 0x3D => "OEM validation of footer failed",
    ErrorOemValidationFailedMemory = 0x3E => "OEM validation ran out of memory",
    ErrorPartitionCloseFailed = 0x40 => "Partition close failed",
    ErrorPartitionCloseFailedHeader = 0x41 => "Partition close failed on header",
    ErrorPartitionCloseFailedPsSpace = 0x42 => "Partition close failed: no persistent store space",
    ErrorPartitionTypeNotMatching = 0x48 => "Partition type does not match",
    ErrorPartitionTypeTwoDfu = 0x49 => "Two DFU partitions in upgrade file",
    ErrorPartitionWriteFailedHeader = 0x50 => "Partition header write failed",
    ErrorPartitionWriteFailedData = 0x51 => "Partition data write failed",
    ErrorFileTooSmall = 0x58 => "Upgrade file too small",
    ErrorFileTooBig = 0x59 => "Upgrade file too big",
    ErrorInternalError1 = 0x65 => "Internal error 1",
    ErrorInternalError2 = 0x66 => "Internal error 2",
    ErrorInternalError3 = 0x67 => "Internal error 3",
    ErrorInternalError4 = 0x68 => "Internal error 4",
    ErrorInternalError5 = 0x69 => "Internal error 5",
    ErrorInternalError6 = 0x6A => "Internal error 6",
    ErrorInternalError7 = 0x6B => "Internal error 7",
    ErrorInternalError8 = 0x6C => "Internal error 8",
    WarnAppConfigVersionIncompatible = 0x80 => "Application configuration version incompatible",
    WarnSyncIdIsDifferent = 0x81 => "Upgrade file differs from the previous attempt",
}

/// How the host must react to a return code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Not an error.
    None,
    /// The listener decides whether to continue.
    Warning,
    /// The upgrade must be aborted.
    Fatal,
}

impl ReturnCode {
    /// Classify this code. Only two codes are warnings.
    pub fn severity(&self) -> Severity {
        match self {
            ReturnCode::Success => Severity::None,
            ReturnCode::WarnSyncIdIsDifferent | ReturnCode::ErrorBatteryLow => Severity::Warning,
            _ => Severity::Fatal,
        }
    }
}

// ============================================================================
// Resume points
// ============================================================================

/// Step of the upgrade the device is at, reported on synchronisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[repr(u8)]
pub enum ResumePoint {
    #[default]
    DataTransfer = 0x00,
    Validation = 0x01,
    TransferComplete = 0x02,
    InProgress = 0x03,
    Commit = 0x04,
}

impl ResumePoint {
    /// Parse a resume point from a byte value.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(ResumePoint::DataTransfer),
            0x01 => Some(ResumePoint::Validation),
            0x02 => Some(ResumePoint::TransferComplete),
            0x03 => Some(ResumePoint::InProgress),
            0x04 => Some(ResumePoint::Commit),
            _ => None,
        }
    }

    /// Get a human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            ResumePoint::DataTransfer => "Transferring data",
            ResumePoint::Validation => "Validating data",
            ResumePoint::TransferComplete => "Transfer complete",
            ResumePoint::InProgress => "Upgrade in progress",
            ResumePoint::Commit => "Committing upgrade",
        }
    }
}

// ============================================================================
// Start confirmation
// ============================================================================

/// Status byte of a start confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartStatus {
    Success,
    AppNotReady,
    Other(u8),
}

impl StartStatus {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => StartStatus::Success,
            0x09 => StartStatus::AppNotReady,
            other => StartStatus::Other(other),
        }
    }
}

// ============================================================================
// Confirmations
// ============================================================================

/// Decision points the listener must arbitrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConfirmationKind {
    /// Data has been transferred; continue to reboot the device.
    TransferComplete,
    /// Commit the new image.
    Commit,
    /// The device rebooted on the new image; continue the upgrade.
    InProgress,
    /// The device battery is low.
    BatteryLow,
    /// The file differs from the one used in a previous attempt.
    FileDiffersWarning,
}

/// Action byte of `*Res`/`*Cfm` answers: continue.
pub const ACTION_CONTINUE: u8 = 0x00;

/// Action byte of `*Res`/`*Cfm` answers: abort.
pub const ACTION_ABORT: u8 = 0x01;

/// Action byte for a listener decision.
pub fn action_byte(accepted: bool) -> u8 {
    if accepted {
        ACTION_CONTINUE
    } else {
        ACTION_ABORT
    }
}

/// Data flag marking the last packet of the file.
pub const DATA_LAST_PACKET: u8 = 0x01;

/// Data flag for every other packet.
pub const DATA_MORE_PACKETS: u8 = 0x00;
