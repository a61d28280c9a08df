use anyhow::Result;
use log::info;

use crate::config::{SimConfig, StageConfig};
use crate::delay::{DelayEstimator, PdelayTimestamps};
use crate::fixed_point::Quantizer;
use crate::offset;
use crate::record::SyncStage;
use crate::rtc::Rtc;
use crate::selection::{PacketSelector, SelectedEstimate};
use crate::slope::SlopeCorrector;
use crate::time::Timestamp;
use crate::tuner::IncrementTuner;

/// Four-stage synchronization controller.
///
/// Stage 1 acquires a stable one-way delay and clears step offsets, stage 2
/// syntonizes the increment value, stage 3 measures the residual slope and
/// stage 4 corrects the remaining constant offset while the slope corrector
/// keeps tracking. Timestamps are always taken from the syntonized
/// counters, so each stage must be careful about which quantity it
/// estimates and which register it corrects.
///
/// Transitions are latched into `next_stage` and committed only when the
/// running handler finishes; a handler always observes the stage it
/// started in.
pub struct SyncController {
    stage: SyncStage,
    next_stage: SyncStage,
    stage_cfgs: [StageConfig; 4],
    selector: PacketSelector,
    delay_est: DelayEstimator,
    tuner: IncrementTuner,
    slope: SlopeCorrector,
    packet_selection: bool,
    sample_win_delay: bool,
    perfect_delay: bool,
    rtc_inc_est_period: u32,
    sync_period_ns: f64,
    held_delay_ns: Option<i64>,
    selections: u32,
    last_norm_foffset: f64,
}

impl SyncController {
    pub fn new(cfg: &SimConfig) -> Self {
        let quantizer = if cfg.en_fp_inc_val {
            Some(Quantizer::new(cfg.n_inc_val_int_bits, cfg.n_inc_val_frc_bits))
        } else {
            None
        };
        let inc_filter = if cfg.filter_rtc_inc {
            Some(cfg.rtc_inc_filt_len)
        } else {
            None
        };
        let first = cfg.stages[SyncStage::DelayEst.index()];
        SyncController {
            stage: SyncStage::DelayEst,
            next_stage: SyncStage::DelayEst,
            stage_cfgs: cfg.stages,
            selector: PacketSelector::new(first.window_len, first.strategy),
            delay_est: DelayEstimator::new(cfg.filter_delay_est, cfg.delay_est_filt_len),
            tuner: IncrementTuner::new(
                cfg.nominal_rtc_clk,
                cfg.foffset_thresh_ppb,
                quantizer,
                inc_filter,
            ),
            slope: SlopeCorrector::new(),
            packet_selection: cfg.packet_selection,
            sample_win_delay: cfg.sample_win_delay,
            perfect_delay: cfg.perfect_delay_est,
            rtc_inc_est_period: cfg.rtc_inc_est_period,
            sync_period_ns: cfg.sync_period_ns(),
            held_delay_ns: None,
            selections: 0,
            last_norm_foffset: 0.0,
        }
    }

    /// Pdelay_resp reception: update the delay estimate and leave stage 1
    /// once it stabilizes.
    pub fn on_pdelay_resp(&mut self, ts: &PdelayTimestamps) {
        let upd = self.delay_est.update(ts);
        if upd.post_transient && self.stage == SyncStage::DelayEst {
            self.next_stage = SyncStage::CoarseSynt;
        }
        self.commit_stage();
    }

    /// SYNC reception with the master's t1, the local t2 and the true
    /// network delay of this frame (debug-only perfect-delay mode).
    pub fn on_sync_rx(
        &mut self,
        t1: Timestamp,
        t2: Timestamp,
        true_delay_ns: i64,
        slave: &mut Rtc,
    ) -> Result<()> {
        let delay_ns = self.current_delay(true_delay_ns);
        let sample = offset::estimate(t1, t2, delay_ns);

        let selected = if self.packet_selection {
            self.selector.push(sample.err, sample.master_total_ns)
        } else {
            Some(SelectedEstimate {
                sec: sample.err.sec,
                ns: sample.err.ns as f64,
                slope: 0.0,
            })
        };

        if let Some(est) = selected {
            self.on_selection(est, sample.master_total_ns, slave)?;
        }

        if self.stage == SyncStage::ConstToff {
            self.slope.on_sync(&mut slave.time_offset);
        }

        self.commit_stage();
        Ok(())
    }

    /// Delay value to correct this SYNC with. When window-sampled delay is
    /// enabled, the estimate captured at the window's first sample holds
    /// for the whole window.
    fn current_delay(&mut self, true_delay_ns: i64) -> i64 {
        if self.perfect_delay {
            return true_delay_ns;
        }
        if self.sample_win_delay && self.packet_selection {
            if self.selector.in_window_index() == 0 {
                self.held_delay_ns = Some(self.delay_est.est_ns());
            }
            self.held_delay_ns.unwrap_or_else(|| self.delay_est.est_ns())
        } else {
            self.delay_est.est_ns()
        }
    }

    /// One `toffset_corr_strobe`: route the selected estimate according to
    /// the current stage.
    fn on_selection(
        &mut self,
        est: SelectedEstimate,
        master_total_ns: i64,
        slave: &mut Rtc,
    ) -> Result<()> {
        match self.stage {
            SyncStage::DelayEst => {
                // Clears step offsets, multi-second ones included.
                slave.time_offset.overwrite(est.sec, est.ns.floor() as i64);
            }
            SyncStage::CoarseSynt => {
                self.selections += 1;
                if self.selections >= self.rtc_inc_est_period {
                    self.selections = 0;
                    let outcome = self.tuner.on_strobe(master_total_ns, est.total_ns(), slave)?;
                    if let Some(out) = outcome {
                        self.last_norm_foffset = out.norm_freq_offset;
                        if !out.discarded
                            && out.norm_freq_offset.abs() * 1e9 < out.res_ppb / 2.0
                        {
                            info!(
                                "[Stage] coarse syntonization done at {:.3} ppb",
                                out.norm_freq_offset * 1e9
                            );
                            self.next_stage = SyncStage::FineSynt;
                        }
                    }
                }
            }
            SyncStage::FineSynt => {
                // A single window; its slope becomes the per-SYNC
                // correction for the rest of the run.
                self.slope.set_slope(est.slope * self.sync_period_ns);
                self.next_stage = SyncStage::ConstToff;
            }
            SyncStage::ConstToff => {
                slave.time_offset.overwrite(est.sec, est.ns.floor() as i64);
            }
        }
        Ok(())
    }

    fn commit_stage(&mut self) {
        if self.next_stage == self.stage {
            return;
        }
        info!("[Stage] {:?} -> {:?}", self.stage, self.next_stage);
        self.stage = self.next_stage;
        let sc = self.stage_cfgs[self.stage.index()];
        self.selector.reconfigure(sc.window_len, sc.strategy);
        self.held_delay_ns = None;
        self.selections = 0;
        if self.stage == SyncStage::ConstToff {
            self.selector.set_presub_slope(self.slope.slope_ns_per_sync());
        }
    }

    pub fn stage(&self) -> SyncStage {
        self.stage
    }

    pub fn norm_freq_offset(&self) -> f64 {
        self.last_norm_foffset
    }

    pub fn raw_delay_ns(&self) -> f64 {
        self.delay_est.raw_ns()
    }

    pub fn filtered_delay_ns(&self) -> i64 {
        self.delay_est.est_ns()
    }

    pub fn toffset_slope_ns_per_sync(&self) -> f64 {
        self.slope.slope_ns_per_sync()
    }

    pub fn res_ppb(&self) -> f64 {
        self.tuner.res_ppb()
    }
}
