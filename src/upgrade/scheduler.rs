//! Scheduler implementations.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::traits::{Scheduler, TimerHandle, TimerToken};

/// Scheduler driven by an explicit clock.
///
/// Nothing fires on its own: the host advances time with
/// [`ManualScheduler::advance`] and delivers the returned tokens to the
/// state machine.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now: Duration,
    next_id: u64,
    pending: Vec<(TimerHandle, Duration, TimerToken)>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Move the clock forward, returning the tokens now due in firing order.
    pub fn advance(&mut self, by: Duration) -> Vec<TimerToken> {
        self.now += by;
        let now = self.now;

        let (mut due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|(_, deadline, _)| *deadline <= now);
        self.pending = pending;

        due.sort_by_key(|(handle, deadline, _)| (*deadline, *handle));
        due.into_iter().map(|(_, _, token)| token).collect()
    }

    /// Tokens still waiting to fire.
    pub fn pending(&self) -> Vec<TimerToken> {
        self.pending.iter().map(|(_, _, token)| *token).collect()
    }

    /// Delay until the next timer fires.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.pending
            .iter()
            .map(|(_, deadline, _)| deadline.saturating_sub(self.now))
            .min()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration, token: TimerToken) -> TimerHandle {
        self.next_id += 1;
        let handle = TimerHandle(self.next_id);
        self.pending.push((handle, self.now + delay, token));
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.pending.retain(|(pending, _, _)| *pending != handle);
    }
}

/// Scheduler backed by tokio timers.
///
/// Each timer is a task that sleeps and then sends its token on `fired`.
/// Must be used from within a tokio runtime.
#[derive(Debug)]
pub struct TokioScheduler {
    fired: UnboundedSender<TimerToken>,
    next_id: u64,
    tasks: HashMap<TimerHandle, JoinHandle<()>>,
}

impl TokioScheduler {
    pub fn new(fired: UnboundedSender<TimerToken>) -> Self {
        Self {
            fired,
            next_id: 0,
            tasks: HashMap::new(),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration, token: TimerToken) -> TimerHandle {
        self.tasks.retain(|_, task| !task.is_finished());

        self.next_id += 1;
        let handle = TimerHandle(self.next_id);
        let fired = self.fired.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if fired.send(token).is_err() {
                debug!("Timer {:?} fired after the driver stopped", token.action);
            }
        });
        self.tasks.insert(handle, task);
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(task) = self.tasks.remove(&handle) {
            task.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for task in self.tasks.values() {
            task.abort();
        }
    }
}
