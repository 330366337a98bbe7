//! Cycle-time accumulator for the registry's timer loops.

/// Mean/min/max over a fixed sample window, in microseconds.
#[derive(Debug, Clone, Copy)]
pub struct TimeSummary {
    pub samples: u64,
    pub mean_us: i64,
    pub min_us: i64,
    pub max_us: i64,
}

/// Accumulates samples and yields a [`TimeSummary`] once per window.
#[derive(Debug)]
pub struct TimeAccumulator {
    window: u64,
    count: u64,
    sum: i64,
    min: i64,
    max: i64,
}

impl TimeAccumulator {
    pub fn new(window: u64) -> Self {
        TimeAccumulator {
            window: window.max(1),
            count: 0,
            sum: 0,
            min: i64::MAX,
            max: i64::MIN,
        }
    }

    /// Record one sample. Returns the window summary (and resets) when the
    /// window fills.
    pub fn record(&mut self, sample_us: i64) -> Option<TimeSummary> {
        self.count += 1;
        self.sum += sample_us;
        self.min = self.min.min(sample_us);
        self.max = self.max.max(sample_us);
        if self.count < self.window {
            return None;
        }
        let summary = TimeSummary {
            samples: self.count,
            mean_us: self.sum / self.count as i64,
            min_us: self.min,
            max_us: self.max,
        };
        *self = TimeAccumulator::new(self.window);
        Some(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_fires_once_per_window() {
        let mut acc = TimeAccumulator::new(3);
        assert!(acc.record(10).is_none());
        assert!(acc.record(20).is_none());
        let summary = acc.record(60).unwrap();
        assert_eq!(summary.samples, 3);
        assert_eq!(summary.mean_us, 30);
        assert_eq!(summary.min_us, 10);
        assert_eq!(summary.max_us, 60);

        // Window resets afterwards.
        assert!(acc.record(1).is_none());
    }

    #[test]
    fn zero_window_is_clamped() {
        let mut acc = TimeAccumulator::new(0);
        assert!(acc.record(5).is_some());
    }
}
