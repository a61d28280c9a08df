use anyhow::{bail, Result};
use log::debug;

use crate::time::{TimeOffset, Timestamp, NS_PER_SEC};

/// Model of one hardware real-time clock.
///
/// A physical oscillator at `nominal * (1 + ppb*1e-9)` Hz drives a counter
/// that adds `inc_val_ns` per rising edge. The resulting `sec_cnt`/`ns_cnt`
/// pair is the *syntonized* view (frequency-aligned once the tuner has done
/// its job); the *synchronized* view additionally applies the time-offset
/// register. Timestamps handed to the protocol are floors of the syntonized
/// counters.
#[derive(Debug)]
pub struct Rtc {
    clk_freq: f64,
    clk_period: f64,
    edge_origin_s: f64,
    i_inc: u64,
    sec_cnt: u64,
    ns_cnt: f64,
    inc_val_ns: f64,
    pub time_offset: TimeOffset,
}

impl Rtc {
    pub fn new(
        nominal_clk_hz: f64,
        freq_offset_ppb: f64,
        init_time_sec: u64,
        init_time_ns: f64,
        init_rising_edge_ns: f64,
    ) -> Self {
        let clk_freq = nominal_clk_hz * (1.0 + freq_offset_ppb * 1e-9);
        Rtc {
            clk_freq,
            clk_period: 1.0 / clk_freq,
            edge_origin_s: init_rising_edge_ns * 1e-9,
            i_inc: 0,
            sec_cnt: init_time_sec,
            ns_cnt: init_time_ns,
            inc_val_ns: 1e9 / nominal_clk_hz,
            time_offset: TimeOffset::default(),
        }
    }

    /// Consume all oscillator edges up to simulated time `t_sim` (seconds).
    ///
    /// The edge count is recomputed from `t_sim` so that a change to
    /// `inc_val_ns` only affects edges not yet consumed.
    pub fn accrue(&mut self, t_sim: f64) -> Result<()> {
        let n = ((t_sim - self.edge_origin_s) / self.clk_period).floor();
        let n_incs = if n > 0.0 { n as u64 } else { 0 };
        if n_incs <= self.i_inc {
            return Ok(());
        }
        let new_incs = n_incs - self.i_inc;
        self.i_inc = n_incs;
        self.ns_cnt += new_incs as f64 * self.inc_val_ns;
        if self.ns_cnt.is_nan() {
            bail!("NaN in RTC nanosecond counter at t_sim={}", t_sim);
        }
        while self.ns_cnt >= NS_PER_SEC as f64 {
            self.ns_cnt -= NS_PER_SEC as f64;
            self.sec_cnt += 1;
        }
        Ok(())
    }

    /// Syntonized counters floored to an integer protocol timestamp.
    pub fn timestamp(&self) -> Timestamp {
        Timestamp::new(self.sec_cnt, self.ns_cnt as u32)
    }

    /// Synchronized view: syntonized counters plus the offset register.
    /// Returned as (sec, fractional ns) with sec unwrapped.
    pub fn synchronized(&self) -> (i64, f64) {
        (
            self.sec_cnt as i64 + self.time_offset.sec,
            self.ns_cnt + self.time_offset.ns as f64,
        )
    }

    pub fn set_inc_val(&mut self, inc_val_ns: f64) -> Result<()> {
        if !(inc_val_ns > 0.0) {
            bail!("illegal RTC increment value {}", inc_val_ns);
        }
        debug!(
            "[Rtc] increment {:.9} -> {:.9} ns",
            self.inc_val_ns, inc_val_ns
        );
        self.inc_val_ns = inc_val_ns;
        Ok(())
    }

    pub fn inc_val_ns(&self) -> f64 {
        self.inc_val_ns
    }

    pub fn i_inc(&self) -> u64 {
        self.i_inc
    }

    pub fn clk_freq(&self) -> f64 {
        self.clk_freq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nominal_rtc() -> Rtc {
        // 125 MHz, no frequency offset, counters starting at zero
        Rtc::new(125e6, 0.0, 0, 0.0, 0.0)
    }

    #[test]
    fn test_accrual_counts_edges() {
        let mut rtc = nominal_rtc();
        let period = 1.0 / 125e6;
        rtc.accrue(period * 1000.5).unwrap();
        assert_eq!(rtc.i_inc(), 1000);
        assert!((rtc.ns_cnt - 8000.0).abs() < 1e-6);
    }

    #[test]
    fn test_ns_wraps_into_sec() {
        let mut rtc = nominal_rtc();
        let period = 1.0 / 125e6;
        rtc.accrue(period * 125_000_000.5).unwrap();
        assert_eq!(rtc.sec_cnt, 1);
        assert!(rtc.ns_cnt < NS_PER_SEC as f64);
        assert!(rtc.ns_cnt >= 0.0);
    }

    #[test]
    fn test_i_inc_monotone_and_clamped() {
        let mut rtc = Rtc::new(125e6, 0.0, 0, 0.0, 100.0);
        // Before the first rising edge no increments are consumed.
        rtc.accrue(50e-9).unwrap();
        assert_eq!(rtc.i_inc(), 0);
        rtc.accrue(1e-3).unwrap();
        let after = rtc.i_inc();
        assert!(after > 0);
        // Re-accruing at the same instant changes nothing.
        rtc.accrue(1e-3).unwrap();
        assert_eq!(rtc.i_inc(), after);
    }

    #[test]
    fn test_inc_change_applies_to_future_edges_only() {
        let mut rtc = nominal_rtc();
        let period = 1.0 / 125e6;
        rtc.accrue(period * 100.5).unwrap();
        let before = rtc.ns_cnt;
        rtc.set_inc_val(4.0).unwrap();
        rtc.accrue(period * 200.5).unwrap();
        // 100 further edges at 4 ns each
        assert!((rtc.ns_cnt - before - 400.0).abs() < 1e-6);
    }

    #[test]
    fn test_freq_offset_speeds_up_counter() {
        let mut fast = Rtc::new(125e6, 400.0, 0, 0.0, 0.0);
        let mut exact = nominal_rtc();
        fast.accrue(1.0).unwrap();
        exact.accrue(1.0).unwrap();
        // +400 ppb over one second is ~400 extra ns of counted time
        let d = (fast.sec_cnt as f64 * 1e9 + fast.ns_cnt)
            - (exact.sec_cnt as f64 * 1e9 + exact.ns_cnt);
        assert!((d - 400.0).abs() < 10.0, "drift was {} ns", d);
    }

    #[test]
    fn test_rejects_non_positive_increment() {
        let mut rtc = nominal_rtc();
        assert!(rtc.set_inc_val(0.0).is_err());
        assert!(rtc.set_inc_val(-1.0).is_err());
        assert!(rtc.set_inc_val(f64::NAN).is_err());
    }

    #[test]
    fn test_initial_time_honored() {
        let rtc = Rtc::new(125e6, 0.0, 42, 123.0, 0.0);
        let ts = rtc.timestamp();
        assert_eq!(ts.sec, 42);
        assert_eq!(ts.ns, 123);
    }

    #[test]
    fn test_synchronized_applies_offset_register() {
        let mut rtc = nominal_rtc();
        rtc.accrue(0.5).unwrap();
        rtc.time_offset.overwrite(1, 250);
        let (sec, ns) = rtc.synchronized();
        assert_eq!(sec, rtc.sec_cnt as i64 + 1);
        assert!((ns - (rtc.ns_cnt + 250.0)).abs() < 1e-9);
    }
}
