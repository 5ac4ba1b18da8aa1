use crate::bootstrap::Bootstrapper;
use crate::conditions::Condition;
use crate::cv::FoldAssigner;
use crate::error::{ResampleError, Result};
use crate::strata::TrialFeatures;
use serde::{Deserialize, Serialize};

/// Number of trials available for each unit of a population. Shape: `(n_units,)`.
pub type Counts = Vec<usize>;

/// Minimum number of trials per fold and condition for a unit to be kept.
pub const N_TRIALS_MIN: usize = 5;

/// Default variability factor used to size the pseudo-population of a condition.
pub const BOOTSTRAP_THRES_PERC: f64 = 0.3;

/// Count the trials available in each unit for one experimental condition.
pub struct TrialsCounter;

impl TrialsCounter {
    /// One count per unit, in the order of `features_by_unit`.
    pub fn count(features_by_unit: &[TrialFeatures], condition: &Condition) -> Result<Counts> {
        features_by_unit.iter().map(|features| condition.count(features)).collect()
    }
}

/// Determine the number of pseudo-trials to form in one condition, for one fold.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SampleSizer {
    pub k: usize,
    pub n_min: usize,
    pub thres_perc: f64,
}

impl Default for SampleSizer {
    fn default() -> Self {
        SampleSizer { k: 1, n_min: N_TRIALS_MIN, thres_perc: BOOTSTRAP_THRES_PERC }
    }
}

impl SampleSizer {
    pub fn new(k: usize, n_min: usize, thres_perc: f64) -> SampleSizer {
        SampleSizer { k, n_min, thres_perc }
    }

    pub fn process(&self, counts: &[usize]) -> Result<usize> {
        Self::eval_sample_size(counts, self.k, self.n_min, self.thres_perc)
    }

    /// Sample size of a condition: the per-fold guaranteed minima `count / k` of each unit are fed
    /// to [`Bootstrapper::determine_pseudo_trial_number`] with `n_min` as the floor and
    /// `thres_perc` as the variability factor.
    pub fn eval_sample_size(counts: &[usize], k: usize, n_min: usize, thres_perc: f64) -> Result<usize> {
        if k == 0 {
            return Err(ResampleError::config("Number of folds k must be positive"));
        }
        let counts_in_fold: Counts = counts.iter().map(|&n| FoldAssigner::eval_min_count(k, n)).collect();
        Bootstrapper::determine_pseudo_trial_number(&counts_in_fold, n_min, thres_perc)
    }

    /// Number of units which, once their trials are divided in `k` folds, cannot provide
    /// `sample_size` trials per fold. Removing them is left to the caller.
    pub fn count_excluded_units(counts: &[usize], k: usize, sample_size: usize) -> usize {
        let counts_in_fold: Counts = counts.iter().map(|&n| FoldAssigner::eval_min_count(k.max(1), n)).collect();
        counts.len() - Excluder::exclude_from_counts(&counts_in_fold, sample_size).len()
    }
}

/// Utilities to exclude elements from a set.
pub struct Excluder;

impl Excluder {
    /// Indices of the elements whose count reaches `n_min`.
    pub fn exclude_from_counts(counts: &[usize], n_min: usize) -> Vec<usize> {
        counts
            .iter()
            .enumerate()
            .filter(|&(_, &n)| n >= n_min)
            .map(|(i, _)| i)
            .collect()
    }

    /// Candidates which are not intruders, in the order of the candidates.
    pub fn exclude_by_difference<T: PartialEq + Clone>(candidates: &[T], intruders: &[T]) -> Vec<T> {
        candidates.iter().filter(|c| !intruders.contains(*c)).cloned().collect()
    }
}
