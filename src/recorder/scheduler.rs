//! Polling timer for frame emission
//!
//! The timer only decides *when* to look at the clock; which frames get
//! emitted is computed by the engine from wall time.

use std::time::Duration;

use tokio::time::{interval, Interval, MissedTickBehavior};

#[derive(Debug, Default)]
pub struct FrameScheduler {
    timer: Option<Interval>,
    period: Option<Duration>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the running timer; `None` stops it
    ///
    /// Must be called from within a tokio runtime.
    pub fn restart(&mut self, period: Option<Duration>) {
        self.timer = period.map(|period| {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            timer
        });
        self.period = period;
    }

    pub fn stop(&mut self) {
        self.restart(None);
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    /// Wait for the next tick; never completes while stopped
    pub async fn tick(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_at_period() {
        let mut scheduler = FrameScheduler::new();
        scheduler.restart(Some(Duration::from_millis(20)));
        assert!(scheduler.is_running());

        let start = tokio::time::Instant::now();
        scheduler.tick().await;
        scheduler.tick().await;
        scheduler.tick().await;
        assert_eq!(start.elapsed(), Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_never_ticks() {
        let mut scheduler = FrameScheduler::new();
        scheduler.stop();
        let result = tokio::time::timeout(Duration::from_secs(5), scheduler.tick()).await;
        assert!(result.is_err());
        assert_eq!(scheduler.period(), None);
    }
}
