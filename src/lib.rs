//! Host side of the GAIA VM upgrade protocol.
//!
//! This crate pushes a firmware image to a Qualcomm GAIA peripheral over an
//! already established byte channel, either a BLE link (4-byte GAIA header)
//! or a serial/RFCOMM link (SOF framing with an optional XOR checksum).
//!
//! # Layers
//!
//! 1. **GAIA packets** ([`gaia`]) - Framing of every command exchanged with the device
//! 2. **Upgrade packets** ([`upgrade::packet`]) - Opcode, length and data inside GAIA
//! 3. **State machine** ([`UpgradeManager`]) - Sync, start, data transfer,
//!    validation, commit, with retry, abort and resume
//! 4. **Driver** ([`UpgradeDriver`]) - Tokio task owning the state machine
//!
//! # Example
//!
//! ```ignore
//! use gaia_updater::{ManualScheduler, UpgradeConfig, UpgradeManager};
//!
//! let config = UpgradeConfig::load(Path::new("upgrade.json"))?;
//! let mut manager = UpgradeManager::new(my_listener, ManualScheduler::new(), &config);
//!
//! manager.start(PathBuf::from("firmware.bin"))?;
//! // Feed every packet received from the device:
//! manager.receive_inbound(&bytes);
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod gaia;
pub mod traits;
pub mod transport;
pub mod upgrade;


// Re-export public types
pub use config::UpgradeConfig;
pub use driver::{UpgradeDriver, UpgradeEvent, UpgradeHandle};
pub use error::{
    ConfigError, DriverError, ExceptionKind, FrameError, FrameResult, TransportError,
    UpgradeError,
};
pub use gaia::{GaiaFramer, GaiaPacket, TransportKind};
pub use traits::{Scheduler, UpgradeListener};
pub use transport::{ChannelTransport, SerialTransport, Transport};
pub use upgrade::{
    ConfirmationKind, FirmwareImage, FirmwareSource, ManualScheduler, Phase, ResumePoint,
    ReturnCode, TokioScheduler, UpgradeManager, UploadProgress,
};
