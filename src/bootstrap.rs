//! Pseudo-trials through an algorithm inspired by the hierarchical bootstrap.
//!
//! Units recorded in distinct sessions are associated into pseudo-populations by pairing their
//! trials. Three steps deal with the imbalance of trial counts across units:
//!
//! 1. The number of pseudo-trials balances units with extreme counts: few trials are discarded from
//!    data-rich units and few are duplicated from data-poor ones, above a minimal floor.
//! 2. For each unit independently, every trial is used as many times as possible before any is
//!    used once more.
//! 3. Each unit's picks are shuffled, so that pseudo-trials pair trials randomly across units.

use crate::error::{ResampleError, Result};
use log::debug;
use rand::seq::{index, SliceRandom};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Trial indices selected for each unit. Shape: `(n_units, n_pseudo)`; row `i` indexes the trials
/// of unit `i` only.
pub type PseudoTrials = Vec<Vec<usize>>;

/// Generates a fixed number of pseudo-trials from per-unit trial counts.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Bootstrapper {
    pub n_pseudo: usize,
}

impl Bootstrapper {
    pub fn new(n_pseudo: usize) -> Result<Bootstrapper> {
        if n_pseudo == 0 {
            return Err(ResampleError::config("n_pseudo must be positive"));
        }
        Ok(Bootstrapper { n_pseudo })
    }

    /// Number of pseudo-trials to generate from the statistics of the counts:
    /// `max(floor(alpha * (min + max)), n_pseudo_min)`.
    ///
    /// `alpha = 0.5` targets the midpoint of the smallest and largest counts, `alpha = 0` the
    /// smallest one.
    pub fn determine_pseudo_trial_number(counts: &[usize], n_pseudo_min: usize, alpha: f64) -> Result<usize> {
        if n_pseudo_min == 0 {
            return Err(ResampleError::config("n_pseudo_min must be positive"));
        }
        if !alpha.is_finite() || alpha < 0.0 {
            return Err(ResampleError::config(format!("Invalid alpha={}. Must be finite and >= 0.", alpha)));
        }
        let (n_min, n_max) = match (counts.iter().min(), counts.iter().max()) {
            (Some(&n_min), Some(&n_max)) => (n_min, n_max),
            _ => return Err(ResampleError::validation("Empty counts")),
        };
        let n_pseudo = (alpha * (n_min + n_max) as f64).floor() as usize;
        Ok(n_pseudo.max(n_pseudo_min))
    }

    /// Pick trials of one unit among its `n` trials (see [`pick_trials`]).
    pub fn pick_trials(&self, n: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
        pick_trials(n, self.n_pseudo, rng)
    }

    /// Pick trials for every unit, then combine them across units.
    pub fn bootstrap(&self, counts: &[usize], rng: &mut ChaCha8Rng) -> Result<PseudoTrials> {
        validate_counts(counts)?;
        let mut trials: PseudoTrials = counts.iter().map(|&n| self.pick_trials(n, rng)).collect();
        combine_trials(&mut trials, rng);
        debug!("Bootstrapped {} pseudo-trials for {} units", self.n_pseudo, counts.len());
        Ok(trials)
    }
}

/// Check that counts are usable for bootstrapping: non-empty and all positive.
pub fn validate_counts(counts: &[usize]) -> Result<()> {
    if counts.is_empty() {
        return Err(ResampleError::validation("Empty counts"));
    }
    if let Some(unit) = counts.iter().position(|&n| n == 0) {
        return Err(ResampleError::validation(format!("Unit {} has no trial available", unit)));
    }
    Ok(())
}

/// Pick `n_pseudo` trial indices in `[0, n)` for one unit.
///
/// - `n >= n_pseudo`: distinct trials, drawn without replacement.
/// - `n < n_pseudo`: every trial `n_pseudo / n` times, plus `n_pseudo % n` distinct trials drawn
///   without replacement once more.
///
/// Requires `n > 0`.
pub fn pick_trials(n: usize, n_pseudo: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
    if n >= n_pseudo {
        index::sample(rng, n, n_pseudo).into_vec()
    } else {
        let q = n_pseudo / n;
        let r = n_pseudo % n;
        let mut trials: Vec<usize> = (0..n).flat_map(|t| std::iter::repeat(t).take(q)).collect();
        trials.extend(index::sample(rng, n, r).into_iter());
        trials
    }
}

/// Shuffle the trials of each unit independently, so that each column pairs random trials.
pub fn combine_trials(trials: &mut PseudoTrials, rng: &mut ChaCha8Rng) {
    for trials_unit in trials.iter_mut() {
        trials_unit.shuffle(rng);
    }
}

/// Full hierarchical bootstrap: size the pseudo-population, then pick and combine trials.
pub fn pseudo_trials(counts: &[usize], n_pseudo_min: usize, alpha: f64, rng: &mut ChaCha8Rng) -> Result<PseudoTrials> {
    validate_counts(counts)?;
    let n_pseudo = Bootstrapper::determine_pseudo_trial_number(counts, n_pseudo_min, alpha)?;
    Bootstrapper::new(n_pseudo)?.bootstrap(counts, rng)
}
