//! RPM estimation from timed tachometer intervals.

/// Averages `window` consecutive interval samples into one estimate.
///
/// `rpm = 60 · N / (Σ periods · intervals_per_rev)`, emitted every Nth
/// sample.  A lost signal zeroes the estimate at once rather than letting
/// it decay.
#[derive(Debug, Clone)]
pub struct RpmEstimator {
    window: u8,
    intervals_per_rev: f32,
    count: u8,
    sum_secs: f32,
    rpm: f32,
}

impl RpmEstimator {
    pub fn new(window: u8, intervals_per_rev: f32) -> Self {
        Self {
            window: window.max(1),
            intervals_per_rev,
            count: 0,
            sum_secs: 0.0,
            rpm: 0.0,
        }
    }

    /// Last published estimate.
    pub fn rpm(&self) -> f32 {
        self.rpm
    }

    /// Samples accumulated toward the next estimate.
    pub fn pending(&self) -> u8 {
        self.count
    }

    /// Add one interval.  Returns the new estimate when the window fills.
    pub fn push(&mut self, elapsed_us: u32) -> Option<f32> {
        self.sum_secs += elapsed_us as f32 / 1_000_000.0;
        self.count += 1;
        if self.count < self.window {
            return None;
        }
        let denominator = self.sum_secs * self.intervals_per_rev;
        self.rpm = if denominator > 0.0 {
            60.0 * f32::from(self.window) / denominator
        } else {
            0.0
        };
        self.count = 0;
        self.sum_secs = 0.0;
        Some(self.rpm)
    }

    /// Zero the estimate and drop pending samples.
    pub fn reset(&mut self) {
        self.rpm = 0.0;
        self.count = 0;
        self.sum_secs = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() <= b.abs() * 1e-4
    }

    #[test]
    fn identical_samples_give_sixty_over_period() {
        let mut est = RpmEstimator::new(5, 1.0);
        for _ in 0..4 {
            assert_eq!(est.push(20_000), None);
        }
        let rpm = est.push(20_000).unwrap();
        assert!(close(rpm, 60.0 / 0.02), "got {rpm}");
    }

    #[test]
    fn intervals_per_rev_scales_estimate() {
        // Reference board: half-pulse timing, two pulses per revolution.
        let mut est = RpmEstimator::new(5, 4.0);
        for _ in 0..5 {
            est.push(7_500);
        }
        assert!(close(est.rpm(), 2000.0));
    }

    #[test]
    fn estimate_holds_between_windows() {
        let mut est = RpmEstimator::new(3, 1.0);
        for _ in 0..3 {
            est.push(10_000);
        }
        let first = est.rpm();
        est.push(50_000);
        assert_eq!(est.rpm(), first);
        assert_eq!(est.pending(), 1);
    }

    #[test]
    fn reset_zeroes_mid_window() {
        let mut est = RpmEstimator::new(5, 1.0);
        for _ in 0..5 {
            est.push(10_000);
        }
        est.push(10_000);
        est.push(10_000);
        est.reset();
        assert_eq!(est.rpm(), 0.0);
        assert_eq!(est.pending(), 0);
    }

    #[test]
    fn zero_periods_do_not_divide_by_zero() {
        let mut est = RpmEstimator::new(3, 1.0);
        for _ in 0..3 {
            est.push(0);
        }
        assert_eq!(est.rpm(), 0.0);
    }
}
