//! Send pacing: a randomized pause between consecutive messages.

use std::time::Duration;

use rand::Rng;

/// Inclusive range the inter-send delay is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    min: Duration,
    max: Duration,
}

impl DelayRange {
    /// Build from operator-entered seconds. Negative or non-finite bounds
    /// count as zero, and a maximum below the minimum collapses to the
    /// minimum.
    pub fn from_secs(min_secs: f64, max_secs: f64) -> Self {
        let min = to_duration(min_secs);
        let max = to_duration(max_secs).max(min);
        Self { min, max }
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draw a delay uniformly from `[min, max]`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        rng.gen_range(self.min..=self.max)
    }
}

fn to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_samples_stay_in_range() {
        let range = DelayRange::from_secs(2.0, 5.0);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..10_000 {
            let delay = range.sample(&mut rng);
            assert!(delay >= Duration::from_secs(2), "{delay:?} below min");
            assert!(delay <= Duration::from_secs(5), "{delay:?} above max");
        }
    }

    #[test]
    fn test_samples_spread_across_range() {
        let range = DelayRange::from_secs(0.0, 1.0);
        let mut rng = StdRng::seed_from_u64(42);
        let samples: Vec<Duration> = (0..1_000).map(|_| range.sample(&mut rng)).collect();

        assert!(samples.iter().any(|d| *d < Duration::from_millis(250)));
        assert!(samples.iter().any(|d| *d > Duration::from_millis(750)));
    }

    #[test]
    fn test_equal_bounds() {
        let range = DelayRange::from_secs(1.5, 1.5);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(range.sample(&mut rng), Duration::from_millis(1500));
    }

    #[test]
    fn test_inverted_range_clamps_to_min() {
        let range = DelayRange::from_secs(3.0, 1.0);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(range.max(), Duration::from_secs(3));
        assert_eq!(range.sample(&mut rng), Duration::from_secs(3));
    }

    #[test]
    fn test_degenerate_inputs_are_zero() {
        let range = DelayRange::from_secs(-1.0, f64::NAN);
        assert_eq!(range.min(), Duration::ZERO);
        assert_eq!(range.max(), Duration::ZERO);

        let range = DelayRange::from_secs(0.0, f64::INFINITY);
        assert_eq!(range.max(), Duration::ZERO);
    }
}
