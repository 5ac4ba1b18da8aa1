use crate::error::{ResampleError, Result};
use log::debug;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Indices of the units forming each ensemble. Shape: `(n_ensembles, ensemble_size)`.
pub type Ensembles = Vec<Vec<usize>>;

/// Assign units (neurons) to ensembles of fixed size, so that several pseudo-populations of equal
/// size can be built from one population and every unit is used at least once.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EnsembleAssigner {
    pub ensemble_size: usize,
    pub n_ensembles_max: Option<usize>,
}

impl EnsembleAssigner {
    pub fn new(ensemble_size: usize, n_ensembles_max: Option<usize>) -> Result<EnsembleAssigner> {
        if ensemble_size == 0 {
            return Err(ResampleError::config("ensemble_size must be positive"));
        }
        if n_ensembles_max == Some(0) {
            return Err(ResampleError::config("n_ensembles_max must be positive when provided"));
        }
        Ok(EnsembleAssigner { ensemble_size, n_ensembles_max })
    }

    /// `ceil(n_units / ensemble_size)`, capped at `n_ensembles_max`.
    pub fn n_ensembles(&self, n_units: usize) -> usize {
        let n_ensembles = (n_units + self.ensemble_size - 1) / self.ensemble_size;
        match self.n_ensembles_max {
            Some(max) if n_ensembles > max => max,
            _ => n_ensembles,
        }
    }

    /// Shuffle the units, then cut them in consecutive ensembles.
    ///
    /// When `n_units` is not a multiple of `ensemble_size`, the last ensemble is completed with the
    /// first units of the shuffled sequence (which belong to the first ensemble), so that all the
    /// ensembles but the last are pairwise disjoint.
    pub fn assign(&self, n_units: usize, rng: &mut ChaCha8Rng) -> Result<Ensembles> {
        if n_units < self.ensemble_size {
            return Err(ResampleError::validation(format!(
                "n_units: {} < ensemble_size: {}",
                n_units, self.ensemble_size
            )));
        }

        let mut units: Vec<usize> = (0..n_units).collect();
        units.shuffle(rng);

        let mut ensembles: Ensembles = units.chunks(self.ensemble_size).map(|c| c.to_vec()).collect();
        if let Some(last) = ensembles.last_mut() {
            let n_missing = self.ensemble_size - last.len();
            last.extend_from_slice(&units[..n_missing]);
            if n_missing > 0 {
                debug!("Last ensemble completed with {} units reused from the first one", n_missing);
            }
        }
        ensembles.truncate(self.n_ensembles(n_units));
        Ok(ensembles)
    }
}

/// Replace the unit indices of each ensemble by the unit identifiers.
pub fn units_in_ensembles<U: Clone>(units: &[U], ensembles: &Ensembles) -> Result<Vec<Vec<U>>> {
    ensembles
        .iter()
        .map(|ensemble| {
            ensemble
                .iter()
                .map(|&i| {
                    units.get(i).cloned().ok_or_else(|| {
                        ResampleError::validation(format!("Unit index {} out of range for {} units", i, units.len()))
                    })
                })
                .collect::<Result<Vec<U>>>()
        })
        .collect()
}
