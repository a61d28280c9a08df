use std::collections::VecDeque;

/// Length-N moving-average smoother with transient reporting.
///
/// Consumers key decisions on `post_transient`: the average is only
/// meaningful once the window has filled, and before that callers fall back
/// to the raw sample. A length of 1 makes the filter a pass-through that is
/// post-transient from the first sample.
#[derive(Debug)]
pub struct MovingAverage {
    window: VecDeque<f64>,
    len: usize,
    accum: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterOutput {
    pub value: f64,
    pub post_transient: bool,
}

impl MovingAverage {
    pub fn new(len: usize) -> Self {
        let len = len.max(1);
        MovingAverage {
            window: VecDeque::with_capacity(len),
            len,
            accum: 0.0,
        }
    }

    pub fn push(&mut self, x: f64) -> FilterOutput {
        self.window.push_back(x);
        self.accum += x;
        if self.window.len() > self.len {
            // accum drift over very long runs is bounded well below the
            // nanosecond scales we average here
            self.accum -= self.window.pop_front().unwrap_or(0.0);
        }
        FilterOutput {
            value: self.accum / self.window.len() as f64,
            post_transient: self.window.len() >= self.len,
        }
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.accum = 0.0;
    }

    pub fn sample_count(&self) -> usize {
        self.window.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_reported_after_len_samples() {
        let mut ma = MovingAverage::new(4);
        for i in 0..3 {
            let out = ma.push(i as f64);
            assert!(!out.post_transient, "sample {} should be in transient", i);
        }
        let out = ma.push(3.0);
        assert!(out.post_transient);
        assert!((out.value - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_sliding_average() {
        let mut ma = MovingAverage::new(3);
        ma.push(1.0);
        ma.push(2.0);
        ma.push(3.0);
        let out = ma.push(4.0); // window is now [2, 3, 4]
        assert!((out.value - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_length_one_is_passthrough() {
        let mut ma = MovingAverage::new(1);
        let out = ma.push(42.5);
        assert!(out.post_transient);
        assert_eq!(out.value, 42.5);
    }

    #[test]
    fn test_zero_length_clamped_to_one() {
        let mut ma = MovingAverage::new(0);
        assert!(ma.push(7.0).post_transient);
    }

    #[test]
    fn test_reset_restarts_transient() {
        let mut ma = MovingAverage::new(2);
        ma.push(1.0);
        ma.push(2.0);
        ma.reset();
        assert_eq!(ma.sample_count(), 0);
        assert!(!ma.push(5.0).post_transient);
    }
}
