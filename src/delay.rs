//! One-way delay estimation from round-trip samples. See [`DelayEstimator`].

use web_time::Duration;

/// Smooths round-trip samples into a one-way delay estimate, clamped to a
/// configured range.
///
/// Round-trip samples arrive as `now - group_stamp` when a pong names a group
/// this endpoint previously closed; half of that is taken as the one-way
/// delay. The smoothing uses the RFC 6298 exponential moving average with
/// weight 1/8.
#[derive(Debug, Clone)]
pub struct DelayEstimator {
    min_delay: Duration,
    max_delay: Duration,
    smoothed: Option<Duration>,
}

impl DelayEstimator {
    /// Creates a new estimator, clamping future samples to `[min_delay, max_delay]`.
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
            smoothed: None,
        }
    }

    /// Folds in a fresh round-trip sample.
    pub fn update(&mut self, rtt: Duration) {
        let one_way = rtt / 2;
        let one_way = one_way.clamp(self.min_delay, self.max_delay);
        self.smoothed = Some(match self.smoothed {
            None => one_way,
            Some(prev) => {
                // prev * 7/8 + one_way * 1/8, matching the same weighting a
                // standard RTT EMA uses
                let prev_nanos = u64::try_from(prev.as_nanos()).unwrap_or(u64::MAX);
                let sample_nanos = u64::try_from(one_way.as_nanos()).unwrap_or(u64::MAX);
                let smoothed_nanos = (prev_nanos * 7 + sample_nanos) / 8;
                Duration::from_nanos(smoothed_nanos)
            }
        });
    }

    /// The current smoothed one-way delay estimate, clamped to
    /// `[min_delay, max_delay]`. Returns `min_delay` if no sample has ever
    /// been folded in.
    #[must_use]
    pub fn get(&self) -> Duration {
        self.smoothed
            .unwrap_or(self.min_delay)
            .clamp(self.min_delay, self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_is_half_rtt() {
        let mut est = DelayEstimator::new(Duration::from_millis(1), Duration::from_secs(1));
        est.update(Duration::from_millis(100));
        assert_eq!(est.get(), Duration::from_millis(50));
    }

    #[test]
    fn smooths_towards_new_samples() {
        let mut est = DelayEstimator::new(Duration::from_millis(1), Duration::from_secs(1));
        est.update(Duration::from_millis(100));
        let first = est.get();
        est.update(Duration::from_millis(200));
        let second = est.get();
        assert!(second > first);
        assert!(second < Duration::from_millis(100));
    }

    #[test]
    fn clamps_to_bounds() {
        // each estimator takes its *first* sample here, which is adopted
        // directly rather than averaged in, so the clamp is exact
        let mut low = DelayEstimator::new(Duration::from_millis(10), Duration::from_millis(20));
        low.update(Duration::from_millis(2));
        assert_eq!(low.get(), Duration::from_millis(10));

        let mut high = DelayEstimator::new(Duration::from_millis(10), Duration::from_millis(20));
        high.update(Duration::from_secs(5));
        assert_eq!(high.get(), Duration::from_millis(20));
    }

    #[test]
    fn defaults_to_min_delay_before_any_sample() {
        let est = DelayEstimator::new(Duration::from_millis(15), Duration::from_millis(50));
        assert_eq!(est.get(), Duration::from_millis(15));
    }
}
