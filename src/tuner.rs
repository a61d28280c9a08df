use anyhow::Result;
use log::{debug, info, warn};

use crate::filter::MovingAverage;
use crate::fixed_point::Quantizer;
use crate::rtc::Rtc;
use crate::time::NS_PER_SEC;

/// Stage-exit resolution used when fixed-point quantization is disabled
/// and no hardware step size bounds the achievable syntonization.
const FALLBACK_RES_PPB: f64 = 1.0;

/// Converts measured frequency offsets into new RTC increment values
/// during coarse syntonization.
#[derive(Debug)]
pub struct IncrementTuner {
    foffset_thresh_ppb: f64,
    quantizer: Option<Quantizer>,
    res_ppb: f64,
    filter: Option<MovingAverage>,
    prev: Option<StrobeInstant>,
}

#[derive(Debug, Clone, Copy)]
struct StrobeInstant {
    master_total_ns: i64,
    slave_total_ns: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TunerOutcome {
    /// Dimensionless normalized frequency offset (0 when discarded).
    pub norm_freq_offset: f64,
    /// Syntonization resolution of the increment register, in ppb.
    pub res_ppb: f64,
    pub discarded: bool,
}

impl IncrementTuner {
    pub fn new(
        nominal_clk_hz: f64,
        foffset_thresh_ppb: f64,
        quantizer: Option<Quantizer>,
        filter_len: Option<usize>,
    ) -> Self {
        let nominal_period_ns = 1e9 / nominal_clk_hz;
        let res_ppb = match quantizer {
            Some(q) => {
                let closer_freq = 1e9 / (nominal_period_ns + q.lsb());
                ((nominal_clk_hz - closer_freq) / nominal_clk_hz) * 1e9
            }
            None => FALLBACK_RES_PPB,
        };
        info!(
            "[Tuner] increment resolution {:.3} ppb ({})",
            res_ppb,
            if quantizer.is_some() {
                "fixed-point"
            } else {
                "unquantized"
            }
        );
        IncrementTuner {
            foffset_thresh_ppb,
            quantizer,
            res_ppb,
            filter: filter_len.map(MovingAverage::new),
            prev: None,
        }
    }

    pub fn res_ppb(&self) -> f64 {
        self.res_ppb
    }

    /// Process one increment-estimation strobe.
    ///
    /// `selected_err_total_ns` is the window estimate emitted at this
    /// strobe; the slave-side instant is reconstructed as
    /// `master - error` so intervals stay consistent with the *selected*
    /// offset rather than the last raw sample. The first strobe only
    /// records its instant and yields no estimate.
    pub fn on_strobe(
        &mut self,
        master_total_ns: i64,
        selected_err_total_ns: f64,
        slave: &mut Rtc,
    ) -> Result<Option<TunerOutcome>> {
        let instant = StrobeInstant {
            master_total_ns,
            slave_total_ns: master_total_ns as f64 - selected_err_total_ns,
        };
        let prev = match self.prev.replace(instant) {
            Some(p) => p,
            None => return Ok(None),
        };

        let mut master_int = (instant.master_total_ns - prev.master_total_ns) as f64;
        if master_int < 0.0 {
            master_int += NS_PER_SEC as f64;
        }
        let mut slave_int = instant.slave_total_ns - prev.slave_total_ns;
        if slave_int < 0.0 {
            slave_int += NS_PER_SEC as f64;
        }

        let slave_error_ns = slave_int - master_int;
        let norm_freq_offset = slave_error_ns / master_int;

        if norm_freq_offset.abs() * 1e9 > self.foffset_thresh_ppb {
            warn!(
                "[Tuner] discarding frequency offset {:.1} ppb (threshold {} ppb)",
                norm_freq_offset * 1e9,
                self.foffset_thresh_ppb
            );
            return Ok(Some(TunerOutcome {
                norm_freq_offset: 0.0,
                res_ppb: self.res_ppb,
                discarded: true,
            }));
        }

        // Estimated oscillator frequency under the current increment, then
        // the increment that syntonizes the counter to 1 ns per ns.
        let f_new = (1.0 + norm_freq_offset) * (1e9 / slave.inc_val_ns());
        let mut inc_new_ns = 1e9 / f_new;

        if let Some(q) = &self.quantizer {
            let out = q.quantize(inc_new_ns);
            if out.saturated {
                warn!(
                    "[Tuner] increment {:.9} ns saturated to {:.9} ns",
                    inc_new_ns, out.value
                );
            }
            inc_new_ns = out.value;
        }

        let committed = match &mut self.filter {
            Some(f) => {
                let out = f.push(inc_new_ns);
                if out.post_transient {
                    out.value
                } else {
                    inc_new_ns
                }
            }
            None => inc_new_ns,
        };
        slave.set_inc_val(committed)?;

        debug!(
            "[Tuner] norm={:.3} ppb inc={:.9} ns",
            norm_freq_offset * 1e9,
            committed
        );

        Ok(Some(TunerOutcome {
            norm_freq_offset,
            res_ppb: self.res_ppb,
            discarded: false,
        }))
    }
}
