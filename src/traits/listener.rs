use crate::error::UpgradeError;
use crate::upgrade::codes::{ConfirmationKind, ResumePoint};
use crate::upgrade::progress::UploadProgress;

#[cfg(test)]
use mockall::automock;

/// Everything the upgrade state machine asks of its host.
///
/// The host wires these calls to its transport and user interface. Each
/// [`UpgradeListener::ask_confirmation`] must eventually be answered with
/// [`crate::upgrade::UpgradeManager::confirm`].
#[cfg_attr(test, automock)]
pub trait UpgradeListener {
    /// Hand an encoded, transport-wrapped packet to the open channel.
    fn send_bytes(&mut self, bytes: Vec<u8>);

    /// Report an error. Called before the abort it causes is sent.
    fn on_error(&mut self, error: UpgradeError);

    fn on_resume_point_changed(&mut self, point: ResumePoint);

    /// The device completed the upgrade.
    fn on_finished(&mut self);

    fn on_progress(&mut self, progress: UploadProgress);

    fn ask_confirmation(&mut self, kind: ConfirmationKind);

    /// Close the upgrade channel. Called once per ended session.
    fn disconnect(&mut self);
}
