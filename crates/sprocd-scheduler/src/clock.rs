use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};

/// Source of wall-clock timestamps and delays for the engine.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current local time, used for event timestamps.
    fn now(&self) -> DateTime<Local>;

    /// Suspend the calling task for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Real time backed by the tokio timer.
///
/// Tests drive it deterministically with `tokio::time::pause()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            // Zero-timeout lineages must still let sibling tasks run.
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(duration).await;
        }
    }
}
