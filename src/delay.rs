use log::debug;

use crate::filter::MovingAverage;
use crate::time::{wrapped_ns_diff, Timestamp};

/// The four timestamps of one completed peer-delay exchange.
#[derive(Debug, Clone, Copy)]
pub struct PdelayTimestamps {
    /// Slave TX of the request
    pub t1: Timestamp,
    /// Master RX of the request
    pub t2: Timestamp,
    /// Master TX of the response
    pub t3: Timestamp,
    /// Slave RX of the response
    pub t4: Timestamp,
}

/// One-way delay estimator fed by Pdelay_resp receptions.
#[derive(Debug)]
pub struct DelayEstimator {
    filter: MovingAverage,
    last_raw_ns: f64,
    last_est_ns: i64,
    post_transient: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayUpdate {
    pub raw_ns: f64,
    pub est_ns: i64,
    pub post_transient: bool,
}

impl DelayEstimator {
    pub fn new(filter_enabled: bool, filt_len: usize) -> Self {
        let len = if filter_enabled { filt_len } else { 1 };
        DelayEstimator {
            filter: MovingAverage::new(len),
            last_raw_ns: 0.0,
            last_est_ns: 0,
            post_transient: false,
        }
    }

    /// Fold one exchange into the estimate.
    ///
    /// The ns-field subtractions wrap at most once; turnarounds are far
    /// below one second.
    pub fn update(&mut self, ts: &PdelayTimestamps) -> DelayUpdate {
        let d_ms = wrapped_ns_diff(ts.t4.ns, ts.t1.ns);
        let d_sm = wrapped_ns_diff(ts.t3.ns, ts.t2.ns);
        let raw = (d_ms - d_sm) as f64 / 2.0;

        let out = self.filter.push(raw);
        let est = if out.post_transient { out.value } else { raw };

        self.last_raw_ns = raw;
        self.last_est_ns = est.floor() as i64;
        self.post_transient = out.post_transient;

        debug!(
            "[Delay] raw={:.1}ns filtered={}ns post_transient={}",
            raw, self.last_est_ns, self.post_transient
        );

        DelayUpdate {
            raw_ns: raw,
            est_ns: self.last_est_ns,
            post_transient: self.post_transient,
        }
    }

    pub fn raw_ns(&self) -> f64 {
        self.last_raw_ns
    }

    pub fn est_ns(&self) -> i64 {
        self.last_est_ns
    }

    pub fn post_transient(&self) -> bool {
        self.post_transient
    }
}
