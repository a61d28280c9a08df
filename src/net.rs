use rand::SeedableRng;
use rand_distr::{Distribution, Exp};
use rand_xoshiro::Xoshiro256PlusPlus;

/// Source of per-frame network delays, in seconds.
///
/// The simulation is deterministic for a given seed; every frame draws
/// exactly one sample regardless of which estimator options are enabled.
#[cfg_attr(test, mockall::automock)]
pub trait DelayModel {
    fn sample(&mut self) -> f64;
}

/// Erlang-K queueing delay: the sum of K i.i.d. exponential stages with
/// rate K/mean, so the sum has the configured mean.
pub struct ErlangDelay {
    stages: u32,
    exp: Option<Exp<f64>>,
    rng: Xoshiro256PlusPlus,
}

impl ErlangDelay {
    pub fn new(mean_secs: f64, stages: u32, seed: u64) -> Self {
        debug_assert!(stages > 0 && mean_secs >= 0.0);
        let exp = if mean_secs > 0.0 {
            // Exp::new only fails for a non-positive rate
            Exp::new(stages as f64 / mean_secs).ok()
        } else {
            None
        };
        ErlangDelay {
            stages,
            exp,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }
}

impl DelayModel for ErlangDelay {
    fn sample(&mut self) -> f64 {
        match self.exp {
            Some(exp) => (0..self.stages).map(|_| exp.sample(&mut self.rng)).sum(),
            None => 0.0,
        }
    }
}

/// Fixed delay, used for deterministic convergence checks.
pub struct ConstantDelay(pub f64);

impl DelayModel for ConstantDelay {
    fn sample(&mut self) -> f64 {
        self.0
    }
}
