use ptpsim::config::SimConfig;
use ptpsim::net::ConstantDelay;
use ptpsim::record::{SyncRecord, SyncStage};
use ptpsim::simulator::Simulator;

// ============================================================================
// CONVERGENCE E2E SCENARIOS
// ============================================================================
// Common setup: Erlang-2 queueing with 5us mean, 128 SYNC/s, 8 Pdelay/s,
// selection windows 64/512/16384/1024, all least-squares, increment value
// quantized to a 26.20 fixed-point register. Seeds are fixed, so each run
// is reproducible.
// ============================================================================

fn scenario_cfg(slave_ppb: f64) -> SimConfig {
    let mut cfg = SimConfig::default();
    cfg.slave.freq_offset_ppb = slave_ppb;
    cfg.en_fp_inc_val = true;
    // A long delay filter keeps the delay-estimate wander well below the
    // per-frame queueing noise that the selection windows average out.
    cfg.delay_est_filt_len = 64;
    cfg.seed = 1;
    cfg
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn tail<'a>(records: &'a [SyncRecord], after_secs: f64) -> Vec<&'a SyncRecord> {
    records.iter().filter(|r| r.t_sim > after_secs).collect()
}

/// Scenario A: +400 ppb slave with perfect delay knowledge. Coarse
/// syntonization must land within half the fixed-point resolution, the
/// residual slope is tracked, and the stage-4 error stays within +/-100 ns.
#[test]
fn test_scenario_a_converges_within_100ns() {
    init_logger();
    let mut cfg = scenario_cfg(400.0);
    cfg.perfect_delay_est = true;
    cfg.master.init_time_sec = 1000;
    cfg.slave.init_time_sec = 995; // multi-second step offset to clear
    let mut sim = Simulator::new(cfg).unwrap();

    let records = sim.run_secs(180.0).unwrap();
    assert_eq!(sim.stage(), SyncStage::ConstToff);

    // The accepted estimate that ended coarse syntonization is below half
    // the register resolution. That estimate is carried by the record of
    // the SYNC that committed the transition.
    let res_ppb = sim.res_ppb();
    let first_fine = records
        .iter()
        .find(|r| r.stage >= SyncStage::FineSynt)
        .expect("run must leave coarse syntonization");
    assert!(
        first_fine.norm_freq_offset.abs() * 1e9 < res_ppb / 2.0,
        "accepted estimate {:.2} ppb vs res_ppb/2 {:.2} ppb",
        first_fine.norm_freq_offset.abs() * 1e9,
        res_ppb / 2.0
    );

    // A nonzero residual slope was captured for stage 4.
    let slope = sim.toffset_slope_ns_per_sync();
    println!("scenario A: residual slope {:+.4} ns/SYNC", slope);
    assert!(slope.abs() > 0.0, "quantization residual should leave a slope");

    // Steady state: skip the first stage-4 window, then stay within 100 ns.
    let steady = tail(&records, 160.0);
    assert!(!steady.is_empty());
    for rec in steady {
        assert!(
            rec.ns_error.abs() < 100.0,
            "error {:+.1} ns at t={:.1}s",
            rec.ns_error,
            rec.t_sim
        );
    }
}

/// Scenario B: zero-offset slave over the stochastic network. The stage
/// machine advances, the measured frequency offset stays at the estimator
/// noise floor and the captured slope is essentially zero.
#[test]
fn test_scenario_b_zero_ppb_stochastic() {
    init_logger();
    let mut cfg = scenario_cfg(0.0);
    // Long increment-estimation intervals push the measurement noise floor
    // down to a few ppb.
    cfg.rtc_inc_est_period = 64;
    let mut sim = Simulator::new(cfg).unwrap();

    let records = sim.run_secs(660.0).unwrap();
    assert!(
        sim.stage() >= SyncStage::CoarseSynt,
        "delay transient must complete"
    );

    let estimates: Vec<f64> = records
        .iter()
        .map(|r| r.norm_freq_offset * 1e9)
        .collect();
    let worst = estimates.iter().fold(0.0f64, |m, x| m.max(x.abs()));
    println!("scenario B: worst estimate {:.2} ppb", worst);
    assert!(
        worst < 25.0,
        "frequency estimates should sit at the noise floor, worst {:.2} ppb",
        worst
    );

    if sim.stage() == SyncStage::ConstToff {
        let slope = sim.toffset_slope_ns_per_sync();
        println!("scenario B: slope {:+.4} ns/SYNC", slope);
        assert!(slope.abs() < 0.1, "slope {:+.4} ns/SYNC should be ~0", slope);
    }
}

/// Scenario C: slave offset just above the discard threshold. Every
/// estimate is discarded (substituted with 0), the increment is never
/// touched and the controller stays in coarse syntonization indefinitely.
#[test]
fn test_scenario_c_above_threshold_never_locks() {
    init_logger();
    let mut cfg = scenario_cfg(5001.0);
    cfg.perfect_delay_est = true; // keep the measurement decisively above 5000 ppb
    let mut sim = Simulator::new(cfg).unwrap();

    let records = sim.run_secs(40.0).unwrap();
    assert_eq!(sim.stage(), SyncStage::CoarseSynt);
    assert_eq!(
        sim.slave_inc_val_ns(),
        8.0,
        "discarded estimates must not touch the increment"
    );
    // Discards substitute zero into the reported estimate.
    let last = records.last().unwrap();
    assert_eq!(last.norm_freq_offset, 0.0);
}

/// Scenario D: fixed network delay and perfect delay knowledge, +400 ppb.
/// With no queueing jitter the run is fully deterministic: stage residence
/// matches the configured window lengths and the final residual error is
/// below 10 ns.
#[test]
fn test_scenario_d_stage_timing_and_residual() {
    init_logger();
    let mut cfg = scenario_cfg(400.0);
    cfg.perfect_delay_est = true;
    let mut sim = Simulator::with_delay_model(cfg, Box::new(ConstantDelay(5e-6))).unwrap();

    let records = sim.run_secs(180.0).unwrap();
    assert_eq!(sim.stage(), SyncStage::ConstToff);

    // The fine-syntonization stage is exactly one selection window long.
    let fine_syncs = records
        .iter()
        .filter(|r| r.stage == SyncStage::FineSynt)
        .count() as i64;
    assert!(
        (fine_syncs - 16384).abs() <= 1,
        "fine stage lasted {} SYNCs, window is 16384",
        fine_syncs
    );

    // Coarse syntonization needs its recording strobe plus two estimates.
    let coarse_syncs = records
        .iter()
        .filter(|r| r.stage == SyncStage::CoarseSynt)
        .count() as i64;
    assert!(
        coarse_syncs >= 2 * 512 && coarse_syncs <= 4 * 512,
        "coarse stage lasted {} SYNCs",
        coarse_syncs
    );

    let steady = tail(&records, 160.0);
    assert!(!steady.is_empty());
    for rec in steady {
        assert!(
            rec.ns_error.abs() < 10.0,
            "residual {:+.2} ns at t={:.1}s",
            rec.ns_error,
            rec.t_sim
        );
    }
}

/// Scenario E: window-sampled delay against the continuously updated
/// estimate, otherwise identical runs. The captured stage-3 slopes agree
/// closely; the floor term covers the slope-estimator noise.
#[test]
fn test_scenario_e_sampled_window_delay_slope_match() {
    init_logger();
    let run = |sample_win_delay: bool| {
        let mut cfg = scenario_cfg(400.0);
        cfg.sample_win_delay = sample_win_delay;
        let mut sim = Simulator::new(cfg).unwrap();
        sim.run_secs(400.0).unwrap();
        assert_eq!(
            sim.stage(),
            SyncStage::ConstToff,
            "run (sample_win_delay={}) must reach the terminal stage",
            sample_win_delay
        );
        sim.toffset_slope_ns_per_sync()
    };

    let s_held = run(true);
    let s_live = run(false);
    println!(
        "scenario E: slope held={:+.4} live={:+.4} ns/SYNC",
        s_held, s_live
    );
    // The per-frame queueing noise is identical in both runs and cancels
    // in the difference; what remains is the wander of the live delay
    // estimate across the stage-3 window, ~0.02 ns/SYNC at a 5 us mean.
    let bound = f64::max(0.05 * f64::max(s_held.abs(), s_live.abs()), 0.1);
    assert!(
        (s_held - s_live).abs() <= bound,
        "slopes diverge: {:+.4} vs {:+.4} ns/SYNC",
        s_held,
        s_live
    );
}

/// Stage transitions never regress anywhere along a stochastic run.
#[test]
fn test_stage_progression_monotone_stochastic() {
    init_logger();
    let cfg = scenario_cfg(400.0);
    let mut sim = Simulator::new(cfg).unwrap();
    let records = sim.run_secs(60.0).unwrap();
    let mut prev = SyncStage::DelayEst;
    for rec in &records {
        assert!(rec.stage >= prev, "stage regressed at t={:.3}", rec.t_sim);
        prev = rec.stage;
    }
}
