use anyhow::Result;
use clap::Parser;
use log::info;

use ptpsim::config::SimConfig;
use ptpsim::simulator::Simulator;

#[derive(Parser, Debug)]
#[command(author, version, about = "PTP slave clock convergence simulator", long_about = None)]
struct Args {
    /// Slave oscillator offset from nominal, ppb
    #[arg(long, default_value_t = 400.0)]
    slave_ppb: f64,

    /// Simulated duration, seconds
    #[arg(long, default_value_t = 200.0)]
    duration: f64,

    /// Mean network queueing delay, microseconds
    #[arg(long, default_value_t = 5.0)]
    mean_delay_us: f64,

    /// Correct offsets with the true per-frame delay (debug)
    #[arg(long, default_value_t = false)]
    perfect_delay: bool,

    /// Quantize the RTC increment to a 26.20 fixed-point register
    #[arg(long, default_value_t = false)]
    fixed_point: bool,

    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let args = Args::parse();

    let mut cfg = SimConfig::default();
    cfg.slave.freq_offset_ppb = args.slave_ppb;
    cfg.queueing_mean = args.mean_delay_us * 1e-6;
    cfg.perfect_delay_est = args.perfect_delay;
    cfg.en_fp_inc_val = args.fixed_point;
    cfg.seed = args.seed;

    let mut sim = Simulator::new(cfg)?;

    let mut next_report = 1.0;
    let mut last = None;
    while sim.t_sim() < args.duration {
        if let Some(rec) = sim.step()? {
            if rec.t_sim >= next_report {
                info!(
                    "t={:8.3}s stage={:?} err={:+10.1}ns foffset={:+8.3}ppb delay={}ns",
                    rec.t_sim,
                    rec.stage,
                    rec.ns_error,
                    rec.norm_freq_offset * 1e9,
                    rec.filtered_delay_ns
                );
                next_report = rec.t_sim.floor() + 1.0;
            }
            last = Some(rec);
        }
    }

    if let Some(rec) = last {
        info!(
            "final: stage={:?} err={:+.1}ns inc={:.9}ns slope={:+.6}ns/SYNC",
            rec.stage,
            rec.ns_error,
            sim.slave_inc_val_ns(),
            sim.toffset_slope_ns_per_sync()
        );
    }

    Ok(())
}
