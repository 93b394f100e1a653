use time::OffsetDateTime;

pub(crate) const HISTORY_CAPACITY: usize = 50;
pub(crate) const LATENCY_WINDOW: usize = 10;
pub(crate) const ERROR_WINDOW: usize = 20;

/// One observed probe outcome reported by the caller.
#[derive(Debug, Clone)]
pub struct RequestSample {
    pub recorded_at: OffsetDateTime,
    pub response_time_ms: u64,
    pub success: bool,
}

/// Bounded window over the most recent probe outcomes. Holds at most
/// [`HISTORY_CAPACITY`] samples; once full, the oldest is overwritten in
/// place instead of reallocating.
#[derive(Debug)]
pub struct RequestHistory {
    samples: Vec<RequestSample>,
    head: usize,
}

impl RequestHistory {
    pub fn new() -> Self {
        RequestHistory { samples: Vec::with_capacity(HISTORY_CAPACITY), head: 0 }
    }

    pub fn push(&mut self, sample: RequestSample) {
        if self.samples.len() < HISTORY_CAPACITY {
            self.samples.push(sample);
        } else {
            self.samples[self.head] = sample;
            self.head = (self.head + 1) % HISTORY_CAPACITY;
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Oldest-first walk over the last `window` retained samples.
    fn recent(&self, window: usize) -> impl Iterator<Item = &RequestSample> {
        let len = self.samples.len();
        let take = window.min(len);
        ((len - take)..len).map(move |logical| {
            let idx =
                if len < HISTORY_CAPACITY { logical } else { (self.head + logical) % HISTORY_CAPACITY };
            &self.samples[idx]
        })
    }

    /// Mean response time over the last `window` samples, or `None` while empty.
    pub fn latency_avg_ms(&self, window: usize) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let take = window.min(self.samples.len());
        let sum: u64 = self.recent(window).map(|s| s.response_time_ms).sum();
        Some(sum as f64 / take as f64)
    }

    /// Failure fraction over the last `window` samples, 0.0 while empty.
    pub fn error_rate(&self, window: usize) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let take = window.min(self.samples.len());
        let failures = self.recent(window).filter(|s| !s.success).count();
        failures as f64 / take as f64
    }
}

impl Default for RequestHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(response_time_ms: u64, success: bool) -> RequestSample {
        RequestSample { recorded_at: OffsetDateTime::UNIX_EPOCH, response_time_ms, success }
    }

    #[test]
    fn capacity_never_exceeded() {
        let mut h = RequestHistory::new();
        for i in 0..120 {
            h.push(sample(i, true));
            assert!(h.len() <= HISTORY_CAPACITY);
        }
        assert_eq!(h.len(), HISTORY_CAPACITY);
    }

    #[test]
    fn oldest_evicted_first() {
        let mut h = RequestHistory::new();
        for i in 0..(HISTORY_CAPACITY as u64 + 1) {
            h.push(sample(i, true));
        }
        // sample 0 is gone; the window now starts at 1
        let first = h.recent(HISTORY_CAPACITY).next().unwrap().response_time_ms;
        assert_eq!(first, 1);
        let last = h.recent(1).next().unwrap().response_time_ms;
        assert_eq!(last, HISTORY_CAPACITY as u64);
    }

    #[test]
    fn latency_avg_uses_requested_window() {
        let mut h = RequestHistory::new();
        for _ in 0..20 {
            h.push(sample(1000, true));
        }
        for _ in 0..10 {
            h.push(sample(100, true));
        }
        assert_eq!(h.latency_avg_ms(10), Some(100.0));
        assert_eq!(h.latency_avg_ms(30), Some(700.0));
    }

    #[test]
    fn error_rate_over_shorter_history() {
        let mut h = RequestHistory::new();
        h.push(sample(100, true));
        h.push(sample(100, false));
        assert_eq!(h.error_rate(ERROR_WINDOW), 0.5);
        assert_eq!(h.error_rate(1), 1.0);
    }

    #[test]
    fn empty_history_yields_neutral_stats() {
        let h = RequestHistory::new();
        assert_eq!(h.latency_avg_ms(LATENCY_WINDOW), None);
        assert_eq!(h.error_rate(ERROR_WINDOW), 0.0);
        assert!(h.is_empty());
    }
}
