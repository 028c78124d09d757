//! Per-observation admission sampling

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Decide whether an observation is admitted at `rate` percent (0-100)
pub fn should_admit<R: Rng>(rate: u8, rng: &mut R) -> bool {
    match rate {
        0 => false,
        r if r >= 100 => true,
        r => rng.random::<f64>() < f64::from(r) / 100.0,
    }
}

/// Sampler with its own random source and a count of rejections
#[derive(Debug)]
pub struct Sampler {
    rate: u8,
    rng: StdRng,
    rejected: u64,
}

impl Sampler {
    pub fn new(rate: u8) -> Self {
        Self::with_rng(rate, StdRng::from_os_rng())
    }

    /// Sampler with a caller-provided random source (deterministic tests)
    pub fn with_rng(rate: u8, rng: StdRng) -> Self {
        Self {
            rate: rate.min(100),
            rng,
            rejected: 0,
        }
    }

    /// Draw once; rejected observations are only counted, never stored
    pub fn admit(&mut self) -> bool {
        let admitted = should_admit(self.rate, &mut self.rng);
        if !admitted {
            self.rejected += 1;
        }
        admitted
    }

    pub fn rate(&self) -> u8 {
        self.rate
    }

    /// Number of observations dropped so far
    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}
