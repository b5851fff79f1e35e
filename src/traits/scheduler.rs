use std::time::Duration;

#[cfg(test)]
use mockall::automock;

/// Delayed step of the upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerAction {
    /// Send the start request again after "application not ready".
    RetryStart,
    /// Ask the device again whether validation is done.
    PollValidation,
}

/// Delivered back to the state machine when a timer fires.
///
/// `session` identifies the session that scheduled the timer; a token from
/// an older session is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub session: u64,
    pub action: TimerAction,
}

/// Identifies a scheduled timer so it can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u64);

/// Source of delayed callbacks for the state machine.
///
/// Implementations hand the token back by calling
/// [`crate::upgrade::UpgradeManager::on_timer`] once `delay` has elapsed,
/// on the same thread of control as packet handling.
#[cfg_attr(test, automock)]
pub trait Scheduler {
    fn schedule(&mut self, delay: Duration, token: TimerToken) -> TimerHandle;

    /// Cancel a timer. Cancelling a timer that already fired is a no-op.
    fn cancel(&mut self, handle: TimerHandle);
}
