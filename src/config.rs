use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::selection::SelStrategy;

/// Physical parameters of one simulated RTC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RtcConfig {
    /// Constant oscillator offset from nominal, parts per billion.
    pub freq_offset_ppb: f64,
    pub init_time_sec: u64,
    pub init_time_ns: f64,
    /// Simulated time of the oscillator's first rising edge, ns.
    pub init_rising_edge_ns: f64,
}

impl Default for RtcConfig {
    fn default() -> Self {
        RtcConfig {
            freq_offset_ppb: 0.0,
            init_time_sec: 0,
            init_time_ns: 0.0,
            init_rising_edge_ns: 0.0,
        }
    }
}

/// Packet-selection settings for one synchronization stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StageConfig {
    pub window_len: usize,
    pub strategy: SelStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Fallback step when the event queue is empty, seconds.
    pub t_step_sim: f64,
    /// Nominal oscillator frequency, Hz.
    pub nominal_rtc_clk: f64,
    pub master: RtcConfig,
    pub slave: RtcConfig,
    /// SYNC frames per second.
    pub sync_rate: f64,
    /// Pdelay_req frames per second.
    pub pdelay_req_rate: f64,
    /// Completed selections (or SYNC RXs when selection is disabled) per
    /// increment update.
    pub rtc_inc_est_period: u32,
    /// Debug mode: correct offsets with the true network delay.
    pub perfect_delay_est: bool,
    /// Discard frequency-offset estimates beyond this magnitude, ppb.
    pub foffset_thresh_ppb: f64,
    pub en_fp_inc_val: bool,
    /// Total width of the fixed-point increment register, bits.
    pub n_inc_val_int_bits: u32,
    /// Fractional bits of the fixed-point increment register.
    pub n_inc_val_frc_bits: u32,
    pub filter_rtc_inc: bool,
    pub rtc_inc_filt_len: usize,
    pub filter_delay_est: bool,
    pub delay_est_filt_len: usize,
    pub packet_selection: bool,
    /// Selector settings indexed by stage (DelayEst..ConstToff).
    pub stages: [StageConfig; 4],
    /// Hold the delay estimate fixed across each selection window.
    pub sample_win_delay: bool,
    /// Mean network queueing delay, seconds.
    pub queueing_mean: f64,
    /// Number of exponential stages of the Erlang delay distribution.
    pub erlang_k: u32,
    /// RNG seed; runs are deterministic for a given seed.
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            t_step_sim: 1e-9,
            nominal_rtc_clk: 125e6,
            master: RtcConfig::default(),
            slave: RtcConfig::default(),
            sync_rate: 128.0,
            pdelay_req_rate: 8.0,
            rtc_inc_est_period: 1,
            perfect_delay_est: false,
            foffset_thresh_ppb: 5000.0,
            en_fp_inc_val: false,
            n_inc_val_int_bits: 26,
            n_inc_val_frc_bits: 20,
            filter_rtc_inc: false,
            rtc_inc_filt_len: 4,
            filter_delay_est: true,
            delay_est_filt_len: 8,
            packet_selection: true,
            stages: [
                StageConfig { window_len: 64, strategy: SelStrategy::LeastSquares },
                StageConfig { window_len: 512, strategy: SelStrategy::LeastSquares },
                StageConfig { window_len: 16384, strategy: SelStrategy::LeastSquares },
                StageConfig { window_len: 1024, strategy: SelStrategy::LeastSquares },
            ],
            sample_win_delay: false,
            queueing_mean: 5e-6,
            erlang_k: 2,
            seed: 0,
        }
    }
}

impl SimConfig {
    /// Reject illegal parameters before a run starts.
    pub fn validate(&self) -> Result<()> {
        if !(self.t_step_sim > 0.0) {
            bail!("t_step_sim must be positive, got {}", self.t_step_sim);
        }
        if !(self.nominal_rtc_clk > 0.0) {
            bail!("nominal_rtc_clk must be positive, got {}", self.nominal_rtc_clk);
        }
        if !(self.sync_rate > 0.0) {
            bail!("sync_rate must be positive, got {}", self.sync_rate);
        }
        if !(self.pdelay_req_rate > 0.0) {
            bail!("pdelay_req_rate must be positive, got {}", self.pdelay_req_rate);
        }
        if self.rtc_inc_est_period == 0 {
            bail!("rtc_inc_est_period must be at least 1");
        }
        if self.foffset_thresh_ppb < 0.0 {
            bail!("foffset_thresh_ppb must be non-negative");
        }
        for (i, stage) in self.stages.iter().enumerate() {
            if stage.window_len == 0 {
                bail!("stage {} selection window length must be at least 1", i + 1);
            }
        }
        if self.filter_rtc_inc && self.rtc_inc_filt_len == 0 {
            bail!("rtc_inc_filt_len must be at least 1 when filter_rtc_inc is set");
        }
        if self.filter_delay_est && self.delay_est_filt_len == 0 {
            bail!("delay_est_filt_len must be at least 1 when filter_delay_est is set");
        }
        if self.en_fp_inc_val {
            if self.n_inc_val_int_bits > 63 {
                bail!("fixed-point register wider than 63 bits is not supported");
            }
            if self.n_inc_val_frc_bits >= self.n_inc_val_int_bits {
                bail!(
                    "fixed-point fractional bits ({}) must be below the register width ({})",
                    self.n_inc_val_frc_bits,
                    self.n_inc_val_int_bits
                );
            }
        }
        if self.erlang_k == 0 {
            bail!("erlang_k must be at least 1");
        }
        if self.queueing_mean < 0.0 {
            bail!("queueing_mean must be non-negative");
        }
        Ok(())
    }

    /// SYNC period in nanoseconds.
    pub fn sync_period_ns(&self) -> f64 {
        1e9 / self.sync_rate
    }
}
