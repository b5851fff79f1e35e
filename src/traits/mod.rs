pub mod listener;
pub mod scheduler;

pub use listener::UpgradeListener;
pub use scheduler::{Scheduler, TimerAction, TimerHandle, TimerToken};

#[cfg(test)]
pub use listener::MockUpgradeListener;
#[cfg(test)]
pub use scheduler::MockScheduler;
