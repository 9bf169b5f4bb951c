// Fixed-capacity moving average over a scalar stream.
//
// Used to smooth the per-cycle velocity samples derived from wheel
// feedback before they are exposed as the odometry twist, so a single
// noisy encoder reading doesn't show up verbatim downstream.

use std::collections::VecDeque;

/// Rolling arithmetic mean over the last `capacity` samples.
///
/// Strict FIFO: once full, every `accumulate` evicts the oldest sample.
/// A running sum keeps `mean()` O(1).
#[derive(Debug, Clone)]
pub struct RollingMeanAccumulator {
    samples: VecDeque<f64>,
    capacity: usize,
    sum: f64,
}

impl RollingMeanAccumulator {
    /// Create an accumulator holding at most `capacity` samples (min 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0.0,
        }
    }

    /// Push a sample, evicting the oldest one when the window is full.
    pub fn accumulate(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            if let Some(evicted) = self.samples.pop_front() {
                self.sum -= evicted;
            }
        }
        self.samples.push_back(value);
        self.sum += value;
    }

    /// Arithmetic mean of the current window, 0.0 when empty.
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.sum / self.samples.len() as f64
    }

    /// Drop all samples.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.sum = 0.0;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_mean_is_zero() {
        let acc = RollingMeanAccumulator::new(5);
        assert_eq!(acc.mean(), 0.0);
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let mut acc = RollingMeanAccumulator::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            acc.accumulate(v);
        }
        // Window is now [2, 3, 4]
        assert!((acc.mean() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn partial_window_mean() {
        let mut acc = RollingMeanAccumulator::new(10);
        acc.accumulate(1.0);
        acc.accumulate(2.0);
        assert!((acc.mean() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn clear_resets() {
        let mut acc = RollingMeanAccumulator::new(3);
        acc.accumulate(7.0);
        acc.clear();
        assert_eq!(acc.mean(), 0.0);
        acc.accumulate(2.0);
        assert!((acc.mean() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let mut acc = RollingMeanAccumulator::new(0);
        acc.accumulate(1.0);
        acc.accumulate(5.0);
        assert!((acc.mean() - 5.0).abs() < 1e-12);
    }
}
