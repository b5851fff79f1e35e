//! VM upgrade protocol.
//!
//! Upgrade packets travel inside GAIA `VM_UPGRADE_CONTROL` commands towards
//! the device and inside `VMU_PACKET` notifications back. The device drives
//! the transfer: it asks for byte ranges of the file and the host answers
//! with data packets.
//!
//! # Protocol Overview
//!
//! 1. **Sync** - Host identifies the file, device reports its resume point
//! 2. **Start** - Device confirms it is ready
//! 3. **Data Transfer** - Device requests ranges, host sends data packets
//! 4. **Validation** - Host polls until the device has checked the file
//! 5. **Transfer Complete** - Device reboots on the new image
//! 6. **Commit** - Host confirms, device reports completion

pub mod codes;
pub mod image;
mod manager;
pub mod packet;
pub mod progress;
mod scheduler;

#[cfg(test)]
mod scenarios;

pub use codes::{ConfirmationKind, OpCode, ResumePoint, ReturnCode};
pub use image::{FirmwareImage, FirmwareSource};
pub use manager::{Phase, UpgradeManager};
pub use packet::UpgradePacket;
pub use progress::UploadProgress;
pub use scheduler::{ManualScheduler, TokioScheduler};
