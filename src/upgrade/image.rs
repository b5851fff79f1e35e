//! Firmware image loading.
//!
//! The image is read once, in full, when an upgrade starts and is immutable
//! for the lifetime of the session. Its MD5 digest identifies the upgrade to
//! the device so that an interrupted transfer can be resumed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use md5::{Digest, Md5};

use crate::error::{ExceptionKind, UpgradeError};

/// Number of digest bytes sent in the synchronisation request.
pub const SYNC_ID_LENGTH: usize = 4;

/// A firmware file held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    bytes: Arc<[u8]>,
    md5: [u8; 16],
}

impl FirmwareImage {
    /// Wrap an in-memory image.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, UpgradeError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(UpgradeError::NoFile);
        }
        check_size(bytes.len() as u64)?;

        let md5: [u8; 16] = Md5::digest(&bytes).into();
        Ok(Self {
            bytes: bytes.into(),
            md5,
        })
    }

    /// Read an image from disk.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, UpgradeError> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| read_failed(path, e))?;
        check_size(metadata.len())?;

        let bytes = std::fs::read(path).map_err(|e| read_failed(path, e))?;
        Self::from_bytes(bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn md5(&self) -> &[u8; 16] {
        &self.md5
    }

    /// Trailing digest bytes identifying this file to the device.
    pub fn sync_id(&self) -> &[u8] {
        let start = self.md5.len().saturating_sub(SYNC_ID_LENGTH);
        &self.md5[start..]
    }
}

/// Anything an upgrade can be started from.
pub trait FirmwareSource {
    /// Load the whole image into memory.
    fn load(self) -> Result<FirmwareImage, UpgradeError>;
}

impl FirmwareSource for FirmwareImage {
    fn load(self) -> Result<FirmwareImage, UpgradeError> {
        Ok(self)
    }
}

impl FirmwareSource for Vec<u8> {
    fn load(self) -> Result<FirmwareImage, UpgradeError> {
        FirmwareImage::from_bytes(self)
    }
}

impl FirmwareSource for &[u8] {
    fn load(self) -> Result<FirmwareImage, UpgradeError> {
        FirmwareImage::from_bytes(self.to_vec())
    }
}

impl FirmwareSource for &Path {
    fn load(self) -> Result<FirmwareImage, UpgradeError> {
        FirmwareImage::read(self)
    }
}

impl FirmwareSource for PathBuf {
    fn load(self) -> Result<FirmwareImage, UpgradeError> {
        FirmwareImage::read(self)
    }
}

impl<S: FirmwareSource> FirmwareSource for Option<S> {
    fn load(self) -> Result<FirmwareImage, UpgradeError> {
        self.ok_or(UpgradeError::NoFile)?.load()
    }
}

/// The outcome of a load already done elsewhere, e.g. on a blocking task.
impl FirmwareSource for Result<FirmwareImage, UpgradeError> {
    fn load(self) -> Result<FirmwareImage, UpgradeError> {
        self
    }
}

/// Reject images whose length does not fit the 32-bit fields of the protocol.
fn check_size(size: u64) -> Result<(), UpgradeError> {
    if size > u64::from(u32::MAX) {
        return Err(ExceptionKind::FileTooBig { size }.into());
    }
    Ok(())
}

fn read_failed(path: &Path, error: std::io::Error) -> UpgradeError {
    ExceptionKind::FileReadFailed {
        reason: format!("{}: {}", path.display(), error),
    }
    .into()
}
