//! Upgrade configuration: protocol timing constants and host settings.
//!
//! `UpgradeConfig` is persisted as camelCase JSON. Every field has a default,
//! so a partial or missing file yields a working configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::gaia::commands::VENDOR_QUALCOMM;
use crate::gaia::{GaiaFramer, TransportKind};

// ============================================================================
// Protocol Timing
// ============================================================================

/// Delay before the start request is sent again after "application not ready".
pub const START_RETRY_DELAY: Duration = Duration::from_millis(2000);

/// Start requests answered with "application not ready" before giving up.
pub const MAX_START_ATTEMPTS: u8 = 5;

// ============================================================================
// Serial Link
// ============================================================================

/// Baud rate of the serial (RFCOMM) link.
pub const SERIAL_BAUD_RATE: u32 = 115_200;

/// Serial read timeout for individual read operations.
pub const SERIAL_READ_TIMEOUT: Duration = Duration::from_millis(1000);

// ============================================================================
// Host settings
// ============================================================================

/// Settings of an upgrade session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UpgradeConfig {
    /// Link the GAIA packets travel on.
    pub transport: TransportKind,

    /// Vendor id put on outgoing GAIA packets.
    pub vendor_id: u16,

    /// Append an XOR checksum to outgoing serial frames.
    pub serial_checksum: bool,

    pub start_retry_delay_ms: u64,

    pub max_start_attempts: u8,

    /// Acknowledge every upgrade notification received from the device.
    pub acknowledge_notifications: bool,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            vendor_id: VENDOR_QUALCOMM,
            serial_checksum: false,
            start_retry_delay_ms: START_RETRY_DELAY.as_millis() as u64,
            max_start_attempts: MAX_START_ATTEMPTS,
            acknowledge_notifications: true,
        }
    }
}

impl UpgradeConfig {
    /// Parse a JSON document. An empty document gives the defaults.
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(contents)?)
    }

    /// Load from disk, returning defaults if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Save to disk, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn start_retry_delay(&self) -> Duration {
        Duration::from_millis(self.start_retry_delay_ms)
    }

    /// Framer for the configured link.
    pub fn framer(&self) -> GaiaFramer {
        GaiaFramer::new(self.transport, self.vendor_id, self.serial_checksum)
    }

    /// File bytes carried by one data packet: the upgrade data budget of the
    /// link minus the last-packet flag.
    pub fn data_chunk_size(&self) -> usize {
        self.framer().upgrade_data_budget() - 1
    }
}
