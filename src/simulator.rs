use anyhow::Result;
use log::{info, warn};

use crate::config::SimConfig;
use crate::controller::SyncController;
use crate::delay::PdelayTimestamps;
use crate::events::EventQueue;
use crate::net::{DelayModel, ErlangDelay};
use crate::record::{SyncRecord, SyncStage};
use crate::rtc::Rtc;
use crate::time::Timestamp;

/// In-flight state of the SYNC cycle. `on_way` models the fact that the
/// same frame cannot be in flight twice: set on TX, cleared on RX, checked
/// before every transmission.
#[derive(Debug)]
struct SyncFlow {
    on_way: bool,
    next_tx: f64,
    rx_at: f64,
    t1: Timestamp,
    true_delay_ns: i64,
    period: f64,
}

/// In-flight state of the Pdelay_req/Pdelay_resp cycle, with one guard per
/// message kind.
#[derive(Debug)]
struct PdelayFlow {
    req_on_way: bool,
    resp_on_way: bool,
    next_req_tx: f64,
    req_rx_at: f64,
    resp_rx_at: f64,
    t1: Timestamp,
    t2: Timestamp,
    t3: Timestamp,
    period: f64,
}

/// Event-driven simulation of one master and one slave RTC exchanging PTP
/// frames over a stochastic network. Owns every piece of mutable state;
/// handlers borrow what they need for the duration of one iteration.
pub struct Simulator {
    cfg: SimConfig,
    t_sim: f64,
    master: Rtc,
    slave: Rtc,
    queue: EventQueue,
    sync: SyncFlow,
    pdelay: PdelayFlow,
    delays: Box<dyn DelayModel>,
    ctrl: SyncController,
}

impl Simulator {
    pub fn new(cfg: SimConfig) -> Result<Self> {
        let delays = Box::new(ErlangDelay::new(cfg.queueing_mean, cfg.erlang_k, cfg.seed));
        Self::with_delay_model(cfg, delays)
    }

    /// Build with a caller-supplied delay source (tests, alternate
    /// distributions).
    pub fn with_delay_model(cfg: SimConfig, delays: Box<dyn DelayModel>) -> Result<Self> {
        cfg.validate()?;
        let master = Rtc::new(
            cfg.nominal_rtc_clk,
            cfg.master.freq_offset_ppb,
            cfg.master.init_time_sec,
            cfg.master.init_time_ns,
            cfg.master.init_rising_edge_ns,
        );
        let slave = Rtc::new(
            cfg.nominal_rtc_clk,
            cfg.slave.freq_offset_ppb,
            cfg.slave.init_time_sec,
            cfg.slave.init_time_ns,
            cfg.slave.init_rising_edge_ns,
        );
        let ctrl = SyncController::new(&cfg);
        info!(
            "[Sim] master {:+.1} ppb, slave {:+.1} ppb, sync {}/s, pdelay {}/s",
            cfg.master.freq_offset_ppb,
            cfg.slave.freq_offset_ppb,
            cfg.sync_rate,
            cfg.pdelay_req_rate
        );
        Ok(Simulator {
            sync: SyncFlow {
                on_way: false,
                next_tx: 0.0,
                rx_at: 0.0,
                t1: Timestamp::default(),
                true_delay_ns: 0,
                period: 1.0 / cfg.sync_rate,
            },
            pdelay: PdelayFlow {
                req_on_way: false,
                resp_on_way: false,
                next_req_tx: 0.0,
                req_rx_at: 0.0,
                resp_rx_at: 0.0,
                t1: Timestamp::default(),
                t2: Timestamp::default(),
                t3: Timestamp::default(),
                period: 1.0 / cfg.pdelay_req_rate,
            },
            cfg,
            t_sim: 0.0,
            master,
            slave,
            queue: EventQueue::new(),
            delays,
            ctrl,
        })
    }

    /// One driver iteration: accrue the RTCs, transmit and receive
    /// whatever is due, then jump to the next scheduled time. Returns the
    /// output record when a SYNC was received.
    pub fn step(&mut self) -> Result<Option<SyncRecord>> {
        self.master.accrue(self.t_sim)?;
        self.slave.accrue(self.t_sim)?;

        let mut record = None;

        // SYNC TX from the master. TX runs before RX so a zero-delay frame
        // is captured at its true arrival instant.
        if !self.sync.on_way && self.t_sim >= self.sync.next_tx {
            let d = self.delays.sample();
            self.sync.t1 = self.master.timestamp();
            self.sync.true_delay_ns = (d * 1e9).floor() as i64;
            self.sync.rx_at = self.t_sim + d;
            self.sync.on_way = true;
            self.queue.add(self.sync.rx_at);
            self.sync.next_tx += self.sync.period;
            self.queue.add(self.sync.next_tx);
        }

        // SYNC RX at the slave
        if self.sync.on_way && self.t_sim >= self.sync.rx_at {
            self.sync.on_way = false;
            let t2 = self.slave.timestamp();
            self.ctrl
                .on_sync_rx(self.sync.t1, t2, self.sync.true_delay_ns, &mut self.slave)?;
            record = Some(self.make_record());
        }

        // Pdelay_req TX from the slave
        if !self.pdelay.req_on_way && self.t_sim >= self.pdelay.next_req_tx {
            let d = self.delays.sample();
            self.pdelay.t1 = self.slave.timestamp();
            self.pdelay.req_rx_at = self.t_sim + d;
            self.pdelay.req_on_way = true;
            self.queue.add(self.pdelay.req_rx_at);
            self.pdelay.next_req_tx += self.pdelay.period;
            self.queue.add(self.pdelay.next_req_tx);
        }

        // Pdelay_req RX at the master; the response leaves immediately,
        // guard permitting. t2 and t3 are back-to-back counter reads.
        if self.pdelay.req_on_way && self.t_sim >= self.pdelay.req_rx_at && !self.pdelay.resp_on_way
        {
            self.pdelay.req_on_way = false;
            self.pdelay.t2 = self.master.timestamp();
            self.pdelay.t3 = self.master.timestamp();
            let d = self.delays.sample();
            self.pdelay.resp_rx_at = self.t_sim + d;
            self.pdelay.resp_on_way = true;
            self.queue.add(self.pdelay.resp_rx_at);
        }

        // Pdelay_resp RX at the slave
        if self.pdelay.resp_on_way && self.t_sim >= self.pdelay.resp_rx_at {
            self.pdelay.resp_on_way = false;
            let t4 = self.slave.timestamp();
            let ts = PdelayTimestamps {
                t1: self.pdelay.t1,
                t2: self.pdelay.t2,
                t3: self.pdelay.t3,
                t4,
            };
            self.ctrl.on_pdelay_resp(&ts);
        }

        self.advance();
        Ok(record)
    }

    /// Run until `duration_secs` of simulated time, collecting one record
    /// per SYNC reception.
    pub fn run_secs(&mut self, duration_secs: f64) -> Result<Vec<SyncRecord>> {
        let mut records = Vec::new();
        while self.t_sim < duration_secs {
            if let Some(rec) = self.step()? {
                records.push(rec);
            }
        }
        Ok(records)
    }

    fn advance(&mut self) {
        loop {
            match self.queue.poll() {
                Some(t) if t > self.t_sim => {
                    self.t_sim = t;
                    return;
                }
                Some(_) => continue, // stale entry, already handled
                None => {
                    warn!(
                        "[Sim] event queue empty at t={:.9}s, advancing by fixed step",
                        self.t_sim
                    );
                    self.t_sim += self.cfg.t_step_sim;
                    return;
                }
            }
        }
    }

    fn make_record(&self) -> SyncRecord {
        let (m_sec, m_ns) = self.master.synchronized();
        let (s_sec, s_ns) = self.slave.synchronized();
        SyncRecord {
            t_sim: self.t_sim,
            ns_error: (m_sec - s_sec) as f64 * 1e9 + (m_ns - s_ns),
            norm_freq_offset: self.ctrl.norm_freq_offset(),
            raw_delay_ns: self.ctrl.raw_delay_ns(),
            filtered_delay_ns: self.ctrl.filtered_delay_ns(),
            stage: self.ctrl.stage(),
        }
    }

    pub fn t_sim(&self) -> f64 {
        self.t_sim
    }

    pub fn stage(&self) -> SyncStage {
        self.ctrl.stage()
    }

    pub fn slave_inc_val_ns(&self) -> f64 {
        self.slave.inc_val_ns()
    }

    pub fn toffset_slope_ns_per_sync(&self) -> f64 {
        self.ctrl.toffset_slope_ns_per_sync()
    }

    pub fn res_ppb(&self) -> f64 {
        self.ctrl.res_ppb()
    }
}
