use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::telemetry::TARGET_WATCHDOG;

/// Single-shot session deadline. Runs `on_expire` once the deadline elapses
/// unless cancelled first.
#[derive(Debug)]
pub struct Watchdog {
    deadline: Duration,
    timer: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn arm<F>(runtime: &Handle, deadline: Duration, on_expire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let timer = runtime.spawn(async move {
            tokio::time::sleep(deadline).await;
            debug!(target: TARGET_WATCHDOG, deadline = ?deadline, "session deadline elapsed");
            on_expire();
        });
        Self {
            deadline,
            timer: Some(timer),
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.timer
            .as_ref()
            .map(|timer| !timer.is_finished())
            .unwrap_or(false)
    }

    /// Stops the timer. Safe to call any number of times; returns whether
    /// this call disarmed a pending deadline.
    pub fn cancel(&mut self) -> bool {
        match self.timer.take() {
            Some(timer) => {
                let pending = !timer.is_finished();
                timer.abort();
                if pending {
                    debug!(target: TARGET_WATCHDOG, deadline = ?self.deadline, "watchdog cancelled");
                }
                pending
            }
            None => false,
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}
