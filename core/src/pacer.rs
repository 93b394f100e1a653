use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Paces probe launches to a queries-per-second budget.
pub struct Pacer {
    ticker: Interval,
}

impl Pacer {
    pub fn new(qps: u32) -> Self {
        let mut ticker = interval(Duration::from_millis((1000u32 / qps.max(1)) as u64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Pacer { ticker }
    }

    /// Waits until the next launch slot. The first call returns immediately.
    pub async fn pace(&mut self) {
        self.ticker.tick().await;
    }
}
