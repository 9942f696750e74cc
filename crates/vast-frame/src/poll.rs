//! Fixed-interval polling used for frame readiness and size synchronization.

use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, Interval, MissedTickBehavior};

const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("condition not met within {0:?}")]
    TimedOut(Duration),
}

/// Interval whose first tick lands one `period` from now. Ticks missed while
/// the owner was busy are skipped rather than replayed.
pub fn ticker(period: Duration) -> Interval {
    let period = period.max(MIN_PERIOD);
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Checks `ready` now and then every `period` until it returns true, giving
/// up after `ceiling`. Returns how many checks were made. Dropping the future
/// cancels the wait.
pub async fn wait_until<F>(period: Duration, ceiling: Duration, mut ready: F) -> Result<u32, PollError>
where
    F: FnMut() -> bool,
{
    let wait = async {
        let mut attempts = 1;
        if ready() {
            return attempts;
        }
        let mut interval = ticker(period);
        loop {
            interval.tick().await;
            attempts += 1;
            if ready() {
                return attempts;
            }
        }
    };
    tokio::time::timeout(ceiling, wait)
        .await
        .map_err(|_| PollError::TimedOut(ceiling))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test_timeout::tokio_timeout_test(10, paused)]
    async fn returns_immediately_when_already_ready() {
        let started = Instant::now();
        let attempts = wait_until(Duration::from_millis(50), Duration::from_secs(1), || true)
            .await
            .expect("ready");
        assert_eq!(attempts, 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[test_timeout::tokio_timeout_test(10, paused)]
    async fn polls_at_fixed_interval_until_ready() {
        let checks = Arc::new(AtomicU32::new(0));
        let started = Instant::now();
        let counter = checks.clone();
        let attempts = wait_until(Duration::from_millis(50), Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst) >= 3
        })
        .await
        .expect("ready on fourth check");
        assert_eq!(attempts, 4);
        assert_eq!(checks.load(Ordering::SeqCst), 4);
        assert_eq!(started.elapsed(), Duration::from_millis(150));
    }

    #[test_timeout::tokio_timeout_test(10, paused)]
    async fn gives_up_at_ceiling() {
        let started = Instant::now();
        let err = wait_until(Duration::from_millis(50), Duration::from_millis(400), || false)
            .await
            .expect_err("never ready");
        assert_eq!(err, PollError::TimedOut(Duration::from_millis(400)));
        assert_eq!(started.elapsed(), Duration::from_millis(400));
    }

    #[test_timeout::tokio_timeout_test(10, paused)]
    async fn ticker_skips_the_immediate_tick() {
        let started = Instant::now();
        let mut interval = ticker(Duration::from_millis(250));
        interval.tick().await;
        assert_eq!(started.elapsed(), Duration::from_millis(250));
        interval.tick().await;
        assert_eq!(started.elapsed(), Duration::from_millis(500));
    }
}
