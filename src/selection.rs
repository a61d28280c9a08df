use log::debug;
use serde::{Deserialize, Serialize};

use crate::offset::RtcError;
use crate::time::NS_PER_SEC;

/// Reduction strategy applied to a full selection window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelStrategy {
    /// Arithmetic mean of the samples; slope from first differences.
    Mean,
    /// Ordinary least squares fit x = B*t + A over the window.
    LeastSquares,
}

/// Scalar result of one window reduction.
///
/// `slope` is dimensionless (ns of offset per ns of master time) for both
/// strategies: the MEAN slope is the mean of first differences normalized
/// by the mean sample spacing, so it shares the least-squares unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectedEstimate {
    pub sec: i64,
    pub ns: f64,
    pub slope: f64,
}

impl SelectedEstimate {
    pub fn total_ns(&self) -> f64 {
        self.sec as f64 * NS_PER_SEC as f64 + self.ns
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowSample {
    /// Unwrapped error in ns, slope contribution already removed.
    x_ns: f64,
    /// Master-side time axis relative to the window's first sample.
    t_ns: f64,
}

/// Buffers per-window offset samples and reduces them to one estimate.
#[derive(Debug)]
pub struct PacketSelector {
    window_len: usize,
    strategy: SelStrategy,
    samples: Vec<WindowSample>,
    t_start_ns: Option<i64>,
    /// Expected per-sample drift (ns per SYNC), pre-subtracted in the
    /// constant-offset stage so the reduction sees a level window.
    presub_slope_ns: f64,
}

impl PacketSelector {
    pub fn new(window_len: usize, strategy: SelStrategy) -> Self {
        PacketSelector {
            window_len: window_len.max(1),
            strategy,
            samples: Vec::with_capacity(window_len.max(1)),
            t_start_ns: None,
            presub_slope_ns: 0.0,
        }
    }

    /// Install a new window length and strategy, dropping buffered samples.
    pub fn reconfigure(&mut self, window_len: usize, strategy: SelStrategy) {
        self.window_len = window_len.max(1);
        self.strategy = strategy;
        self.samples = Vec::with_capacity(self.window_len);
        self.t_start_ns = None;
    }

    pub fn set_presub_slope(&mut self, slope_ns_per_sample: f64) {
        self.presub_slope_ns = slope_ns_per_sample;
    }

    /// Index of the next sample within the current window (0 = window start).
    pub fn in_window_index(&self) -> usize {
        self.samples.len()
    }

    /// Buffer one error sample; returns the reduced estimate when the
    /// window fills.
    pub fn push(&mut self, err: RtcError, master_total_ns: i64) -> Option<SelectedEstimate> {
        let t_start = *self.t_start_ns.get_or_insert(master_total_ns);
        let t_ns = (master_total_ns - t_start) as f64;
        let idx_1_based = (self.samples.len() + 1) as f64;
        let x_ns = err.total_ns() as f64 - self.presub_slope_ns * idx_1_based;
        self.samples.push(WindowSample { x_ns, t_ns });

        if self.samples.len() < self.window_len {
            return None;
        }

        let mut est = match self.strategy {
            SelStrategy::Mean => self.reduce_mean(),
            SelStrategy::LeastSquares => self.reduce_ls(),
        };
        if self.presub_slope_ns != 0.0 {
            // Re-add the drift accumulated over the window so the estimate
            // refers to the instant of the final sample, not the first.
            let drift = self.presub_slope_ns * self.samples.len() as f64;
            est = split(est.total_ns() + drift, est.slope);
        }
        debug!(
            "[Select] window of {} reduced: {:.1}ns slope={:.3e}",
            self.window_len,
            est.total_ns(),
            est.slope
        );
        self.samples.clear();
        self.t_start_ns = None;
        Some(est)
    }

    fn reduce_mean(&self) -> SelectedEstimate {
        let n = self.samples.len();
        let mean = self.samples.iter().map(|s| s.x_ns).sum::<f64>() / n as f64;
        let slope = if n > 1 {
            let dx_mean = self
                .samples
                .windows(2)
                .map(|w| w[1].x_ns - w[0].x_ns)
                .sum::<f64>()
                / (n - 1) as f64;
            let dt_mean = self
                .samples
                .windows(2)
                .map(|w| w[1].t_ns - w[0].t_ns)
                .sum::<f64>()
                / (n - 1) as f64;
            if dt_mean > 0.0 {
                dx_mean / dt_mean
            } else {
                0.0
            }
        } else {
            0.0
        };
        split(mean, slope)
    }

    fn reduce_ls(&self) -> SelectedEstimate {
        let n = self.samples.len() as f64;
        let t_mean = self.samples.iter().map(|s| s.t_ns).sum::<f64>() / n;
        let x_mean = self.samples.iter().map(|s| s.x_ns).sum::<f64>() / n;
        let mut num = 0.0;
        let mut den = 0.0;
        for s in &self.samples {
            let dt = s.t_ns - t_mean;
            num += dt * (s.x_ns - x_mean);
            den += dt * dt;
        }
        let slope = if den > 0.0 { num / den } else { 0.0 };
        let intercept = x_mean - slope * t_mean;
        split(intercept, slope)
    }
}

fn split(total_ns: f64, slope: f64) -> SelectedEstimate {
    let sec = (total_ns / NS_PER_SEC as f64).floor();
    SelectedEstimate {
        sec: sec as i64,
        ns: total_ns - sec * NS_PER_SEC as f64,
        slope,
    }
}
