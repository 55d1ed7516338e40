//! Posterior samplers for the Beta-Bernoulli conversion model
//!
//! Randomness is injected through [`PosteriorSampler`] so selection can be
//! replayed from a seed. Nothing here reads global random state.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Beta, Distribution};

/// Source of conversion-probability draws
pub trait PosteriorSampler {
    /// Draw from Beta(alpha, beta). Both parameters are positive.
    fn sample_beta(&mut self, alpha: f64, beta: f64) -> f64;
}

/// Thompson sampler backed by any `rand` generator
pub struct RngSampler<R: Rng> {
    rng: R,
}

impl<R: Rng> RngSampler<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RngSampler<StdRng> {
    /// Deterministic sampler for reproducible allocation
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> PosteriorSampler for RngSampler<R> {
    fn sample_beta(&mut self, alpha: f64, beta: f64) -> f64 {
        match Beta::new(alpha, beta) {
            Ok(dist) => dist.sample(&mut self.rng),
            // Unreachable for smoothed counters; fall back to the mean
            Err(_) => posterior_mean(alpha, beta),
        }
    }
}

/// Greedy sampler returning the posterior mean. Used for evaluation runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct PosteriorMean;

impl PosteriorSampler for PosteriorMean {
    fn sample_beta(&mut self, alpha: f64, beta: f64) -> f64 {
        posterior_mean(alpha, beta)
    }
}

fn posterior_mean(alpha: f64, beta: f64) -> f64 {
    let total = alpha + beta;
    if total > 0.0 {
        alpha / total
    } else {
        0.0
    }
}
