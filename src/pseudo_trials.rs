use crate::bootstrap::{Bootstrapper, PseudoTrials};
use crate::conditions::Condition;
use crate::cv::UnitFolds;
use crate::error::{ResampleError, Result};
use crate::strata::TrialFeatures;
use log::debug;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Pseudo-trials of one ensemble, as absolute trial indices of each unit.
///
/// `indices[u][f][j]` is the trial of unit `u` used in pseudo-trial `j` of fold `f`. Along the last
/// axis, conditions are concatenated in the order they were given to the builder.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PseudoPopulation {
    pub indices: Vec<Vec<Vec<usize>>>,
}

impl PseudoPopulation {
    /// `(n_units, n_folds, n_pseudo)`
    pub fn shape(&self) -> (usize, usize, usize) {
        let n_units = self.indices.len();
        let n_folds = self.indices.first().map_or(0, |u| u.len());
        let n_pseudo = self.indices.first().and_then(|u| u.first()).map_or(0, |f| f.len());
        (n_units, n_folds, n_pseudo)
    }

    /// Pseudo-trials of one fold. Shape: `(n_units, n_pseudo)`.
    pub fn fold(&self, fold: usize) -> PseudoTrials {
        self.indices.iter().map(|unit| unit[fold].clone()).collect()
    }
}

/// Replace each relative index (position in a subset of trials) by the matching absolute index.
pub fn relative_to_absolute(idx_absolute: &[usize], idx_relative: &[usize]) -> Result<Vec<usize>> {
    idx_relative
        .iter()
        .map(|&r| {
            idx_absolute.get(r).copied().ok_or_else(|| {
                ResampleError::validation(format!(
                    "Relative index {} out of range for a subset of {} trials",
                    r,
                    idx_absolute.len()
                ))
            })
        })
        .collect()
}

/// Concatenate the pseudo-trials of several conditions (same units) along the trial axis.
pub fn gather_conditions(pseudo_trials: Vec<PseudoTrials>, n_pseudo_tot: Option<usize>) -> Result<PseudoTrials> {
    let n_units = pseudo_trials.first().map_or(0, |p| p.len());
    if pseudo_trials.iter().any(|p| p.len() != n_units) {
        return Err(ResampleError::validation("Mismatch in number of units across conditions"));
    }
    let mut gathered: PseudoTrials = vec![Vec::new(); n_units];
    for part in pseudo_trials {
        for (row, trials) in gathered.iter_mut().zip(part) {
            row.extend(trials);
        }
    }
    if let Some(expected) = n_pseudo_tot {
        let actual = gathered.first().map_or(0, |row| row.len());
        if actual != expected {
            return Err(ResampleError::validation(format!(
                "Mismatch in number of pseudo-trials across conditions. Actual: {} != Expected: {}",
                actual, expected
            )));
        }
    }
    Ok(gathered)
}

/// Check that all the ensembles share the same `(n_units, n_folds, n_pseudo)` shape.
pub fn gather_ensembles(pseudo_populations: Vec<PseudoPopulation>) -> Result<Vec<PseudoPopulation>> {
    if let Some(first) = pseudo_populations.first() {
        let shape = first.shape();
        if let Some(odd) = pseudo_populations.iter().find(|p| p.shape() != shape) {
            return Err(ResampleError::validation(format!(
                "Mismatch in shapes across ensembles: {:?} != {:?}",
                odd.shape(),
                shape
            )));
        }
    }
    Ok(pseudo_populations)
}

/// Build the pseudo-trials of one ensemble of units.
///
/// Trials are assigned to folds by unit beforehand, and combined within each fold only, so that no
/// trial is shared between the train and test sets. Each `(condition, fold)` stratum contributes
/// the number of pseudo-trials set for its condition.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PseudoTrialsBuilder {
    pub n_folds: usize,
    pub counts_by_condition: Vec<(Condition, usize)>,
}

impl PseudoTrialsBuilder {
    pub fn new(n_folds: usize, counts_by_condition: Vec<(Condition, usize)>) -> Result<PseudoTrialsBuilder> {
        if n_folds == 0 {
            return Err(ResampleError::config("Number of folds must be positive"));
        }
        if let Some((condition, _)) = counts_by_condition.iter().find(|(_, n)| *n == 0) {
            return Err(ResampleError::config(format!("No pseudo-trial requested for condition {}", condition)));
        }
        Ok(PseudoTrialsBuilder { n_folds, counts_by_condition })
    }

    /// Total number of pseudo-trials per fold, across conditions.
    pub fn n_pseudo_tot(&self) -> usize {
        self.counts_by_condition.iter().map(|(_, n)| n).sum()
    }

    pub fn build(
        &self,
        features_by_unit: &[&TrialFeatures],
        folds_by_unit: &[&UnitFolds],
        rng: &mut ChaCha8Rng,
    ) -> Result<PseudoPopulation> {
        if features_by_unit.len() != folds_by_unit.len() {
            return Err(ResampleError::validation(format!(
                "{} feature sets for {} fold assignments",
                features_by_unit.len(),
                folds_by_unit.len()
            )));
        }
        for (u, (features, folds)) in features_by_unit.iter().zip(folds_by_unit.iter()).enumerate() {
            if features.n_trials() != folds.len() {
                return Err(ResampleError::validation(format!(
                    "Unit {}: {} trials but {} fold labels",
                    u,
                    features.n_trials(),
                    folds.len()
                )));
            }
        }

        let n_units = features_by_unit.len();
        let mut indices = vec![Vec::with_capacity(self.n_folds); n_units];
        let idx_by_condition = self
            .counts_by_condition
            .iter()
            .map(|(condition, _)| {
                features_by_unit
                    .iter()
                    .map(|features| condition.match_idx(features))
                    .collect::<Result<Vec<Vec<usize>>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        for fold in 0..self.n_folds {
            let mut pseudo_trials_by_cond = Vec::with_capacity(self.counts_by_condition.len());
            for ((condition, n_pseudo), idx_in_cond) in self.counts_by_condition.iter().zip(idx_by_condition.iter()) {
                let idx_absolute: Vec<Vec<usize>> = idx_in_cond
                    .iter()
                    .zip(folds_by_unit.iter())
                    .map(|(idx, folds)| idx.iter().copied().filter(|&i| folds[i] == Some(fold)).collect())
                    .collect();
                let pseudo_trials = Self::build_for_stratum(&idx_absolute, *n_pseudo, rng).map_err(|e| {
                    ResampleError::validation(format!("Stratum {} fold {}: {}", condition, fold, e))
                })?;
                pseudo_trials_by_cond.push(pseudo_trials);
            }
            let pseudo_trials_in_fold = gather_conditions(pseudo_trials_by_cond, Some(self.n_pseudo_tot()))?;
            for (unit, trials) in indices.iter_mut().zip(pseudo_trials_in_fold) {
                unit.push(trials);
            }
            debug!("Fold {}: {} pseudo-trials built for {} units", fold, self.n_pseudo_tot(), n_units);
        }
        Ok(PseudoPopulation { indices })
    }

    /// Pseudo-trials of one stratum (condition x fold), from the absolute indices of the trials of
    /// each unit in this stratum. Shape: `(n_units, n_pseudo)`.
    pub fn build_for_stratum(idx_absolute: &[Vec<usize>], n_pseudo: usize, rng: &mut ChaCha8Rng) -> Result<PseudoTrials> {
        let counts: Vec<usize> = idx_absolute.iter().map(|idx| idx.len()).collect();
        let idx_relative = Bootstrapper::new(n_pseudo)?.bootstrap(&counts, rng)?;
        idx_absolute
            .iter()
            .zip(idx_relative.iter())
            .map(|(abs, rel)| relative_to_absolute(abs, rel))
            .collect()
    }
}
