use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// One-shot stop flag shared by the long-lived background tasks.
///
/// Waiters re-check the flag after every wakeup; loops that also sleep or
/// tick should poll [`StopSignal::is_stopped`] at their top so a stop
/// landing between the check and the wait costs at most one iteration.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        while !self.stopped.load(Ordering::Acquire) {
            self.notify.notified().await;
        }
    }
}
