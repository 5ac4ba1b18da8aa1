use crate::conditions::Condition;
use crate::error::{ResampleError, Result};
use crate::strata::TrialFeatures;
use crate::utils;
use log::{debug, warn};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fold label of each sample, in `[0, k)`.
pub type Folds = Vec<usize>;

/// Fold label of each trial of one unit; `None` for trials outside every condition of interest.
pub type UnitFolds = Vec<Option<usize>>;

/// This class assigns samples (trials) to the `k` folds of a cross-validation, e.g. split each
/// stratum in k groups of balanced sizes after shuffling.
///
/// Splitting into train/test sets is left to [`train_test`], so that the samples of each set can be
/// accessed directly from the labels.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FoldAssigner {
    pub k: usize,
}

impl FoldAssigner {
    pub fn new(k: usize) -> Result<FoldAssigner> {
        if k == 0 {
            return Err(ResampleError::config("Number of folds k must be positive"));
        }
        Ok(FoldAssigner { k })
    }

    /// Assign a fold to each sample, independently within each stratum.
    ///
    /// Without `strata`, all samples form a single stratum. Within a stratum the samples are
    /// shuffled then cut in `k` contiguous groups whose sizes differ by at most 1.
    pub fn assign(&self, n_samples: usize, strata: Option<&[usize]>, rng: &mut ChaCha8Rng) -> Result<Folds> {
        if let Some(strata) = strata {
            if strata.len() != n_samples {
                return Err(ResampleError::validation(format!(
                    "Strata length {} does not match n_samples {}",
                    strata.len(),
                    n_samples
                )));
            }
        }
        if n_samples < self.k {
            return Err(ResampleError::config(format!("n_samples: {} < k: {}", n_samples, self.k)));
        }

        let mut by_stratum: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        match strata {
            Some(strata) => {
                for (i, s) in strata.iter().enumerate() {
                    by_stratum.entry(*s).or_default().push(i);
                }
            }
            None => {
                by_stratum.insert(0, (0..n_samples).collect());
            }
        }

        let mut folds = vec![0; n_samples];
        for (stratum, indices) in by_stratum {
            if indices.len() < self.k {
                warn!(
                    "Stratum {} holds {} samples for {} folds: some folds will miss it",
                    stratum,
                    indices.len(),
                    self.k
                );
            }
            let groups = utils::split_into_balanced_random_chunks(indices, self.k, rng);
            for (fold, group) in groups.into_iter().enumerate() {
                for i in group {
                    folds[i] = fold;
                }
            }
        }
        Ok(folds)
    }

    /// Assign folds to the trials of one unit, stratified by experimental condition.
    ///
    /// Conditions are processed in the given order, which fixes the consumption of the generator.
    /// Conditions must not overlap.
    pub fn assign_by_condition(
        &self,
        features: &TrialFeatures,
        conditions: &[Condition],
        rng: &mut ChaCha8Rng,
    ) -> Result<UnitFolds> {
        let mut folds: UnitFolds = vec![None; features.n_trials()];
        for condition in conditions {
            let idx = condition.match_idx(features)?;
            let folds_in_cond = self.assign(idx.len(), None, rng)?;
            for (i, fold) in idx.into_iter().zip(folds_in_cond) {
                if folds[i].is_some() {
                    return Err(ResampleError::validation(format!(
                        "Trial {} belongs to several conditions (last: {})",
                        i, condition
                    )));
                }
                folds[i] = Some(fold);
            }
            debug!("Folds assigned for condition {}", condition);
        }
        Ok(folds)
    }

    /// Guaranteed minimum number of samples in any fold for a stratum of `n` samples.
    pub fn eval_min_count(k: usize, n: usize) -> usize {
        n / k
    }
}

/// Convert fold labels (one per sample) into fold members (sample indices of each fold).
pub fn labels_to_members(labels: &[usize]) -> Vec<Vec<usize>> {
    let n_folds = labels.iter().max().map_or(0, |m| m + 1);
    let mut members = vec![Vec::new(); n_folds];
    for (i, &fold) in labels.iter().enumerate() {
        members[fold].push(i);
    }
    members
}

/// Convert fold members back into fold labels. Every sample in `0..n` must appear exactly once.
pub fn members_to_labels(members: &[Vec<usize>]) -> Result<Folds> {
    let n_samples: usize = members.iter().map(|m| m.len()).sum();
    let mut labels: Vec<Option<usize>> = vec![None; n_samples];
    for (fold, indices) in members.iter().enumerate() {
        for &i in indices {
            if i >= n_samples {
                return Err(ResampleError::validation(format!(
                    "Sample {} out of range for {} samples",
                    i, n_samples
                )));
            }
            if labels[i].is_some() {
                return Err(ResampleError::validation(format!("Sample {} belongs to several folds", i)));
            }
            labels[i] = Some(fold);
        }
    }
    Ok(labels.into_iter().flatten().collect())
}

/// Indices of the training samples (all folds but `fold`) and of the test samples (`fold`).
pub fn train_test(labels: &[usize], fold: usize) -> (Vec<usize>, Vec<usize>) {
    (0..labels.len()).partition(|&i| labels[i] != fold)
}

// unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn fold_counts(folds: &[usize], members: &[usize], k: usize) -> Vec<usize> {
        let mut counts = vec![0; k];
        for &i in members {
            counts[folds[i]] += 1;
        }
        counts
    }

    #[test]
    fn test_new_rejects_zero_folds() {
        assert!(matches!(FoldAssigner::new(0), Err(ResampleError::Config(_))));
    }

    #[test]
    fn test_assign_stratified_equal_strata() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let assigner = FoldAssigner::new(3).unwrap();
        let strata = vec![0, 0, 0, 1, 1, 1, 2, 2, 2];
        let folds = assigner.assign(9, Some(&strata), &mut rng).unwrap();
        for s in 0..3 {
            let members: Vec<usize> = (0..9).filter(|&i| strata[i] == s).collect();
            assert_eq!(fold_counts(&folds, &members, 3), vec![1, 1, 1]);
        }
        assert_eq!(fold_counts(&folds, &(0..9).collect::<Vec<_>>(), 3), vec![3, 3, 3]);
    }

    #[test]
    fn test_assign_unstratified_balanced() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let folds = FoldAssigner::new(3).unwrap().assign(10, None, &mut rng).unwrap();
        assert_eq!(folds.len(), 10);
        let mut counts = fold_counts(&folds, &(0..10).collect::<Vec<_>>(), 3);
        counts.sort();
        assert_eq!(counts, vec![3, 3, 4]);
    }

    #[test]
    fn test_assign_uneven_strata_balanced_within_each() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let strata = vec![0, 1, 0, 1, 0, 0, 1, 0, 0, 2, 2];
        let folds = FoldAssigner::new(2).unwrap().assign(strata.len(), Some(&strata), &mut rng).unwrap();
        for s in 0..3 {
            let members: Vec<usize> = (0..strata.len()).filter(|&i| strata[i] == s).collect();
            let counts = fold_counts(&folds, &members, 2);
            let max = *counts.iter().max().unwrap();
            let min = *counts.iter().min().unwrap();
            assert!(max - min <= 1, "stratum {} unbalanced: {:?}", s, counts);
        }
    }

    #[test]
    fn test_assign_small_stratum_leaves_folds_empty() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let strata = vec![0, 0, 0, 0, 1];
        let folds = FoldAssigner::new(3).unwrap().assign(5, Some(&strata), &mut rng).unwrap();
        assert_eq!(folds[4], 0);
    }

    #[test]
    fn test_assign_reproducibility() {
        let assigner = FoldAssigner::new(4).unwrap();
        let a = assigner.assign(20, None, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
        let b = assigner.assign(20, None, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_assign_fails_when_more_folds_than_samples() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let err = FoldAssigner::new(5).unwrap().assign(3, None, &mut rng).unwrap_err();
        assert_eq!(err, ResampleError::Config("n_samples: 3 < k: 5".to_string()));
    }

    #[test]
    fn test_assign_fails_with_mismatched_strata() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let result = FoldAssigner::new(2).unwrap().assign(4, Some(&[0, 1, 0]), &mut rng);
        assert!(matches!(result, Err(ResampleError::Validation(_))));
    }

    #[test]
    fn test_eval_min_count() {
        assert_eq!(FoldAssigner::eval_min_count(3, 10), 3);
        assert_eq!(FoldAssigner::eval_min_count(3, 2), 0);
        assert_eq!(FoldAssigner::eval_min_count(1, 7), 7);
    }

    #[test]
    fn test_labels_members_round_trip() {
        let labels = vec![2, 0, 1, 0, 2, 1, 1];
        let members = labels_to_members(&labels);
        assert_eq!(members, vec![vec![1, 3], vec![2, 5, 6], vec![0, 4]]);
        assert_eq!(members_to_labels(&members).unwrap(), labels);
    }

    #[test]
    fn test_members_to_labels_rejects_duplicates_and_gaps() {
        assert!(members_to_labels(&[vec![0, 1], vec![1]]).is_err());
        assert!(members_to_labels(&[vec![0, 3], vec![1]]).is_err());
        assert_eq!(members_to_labels(&[]).unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn test_train_test_split() {
        let labels = vec![0, 1, 2, 0, 1, 2];
        let (train, test) = train_test(&labels, 1);
        assert_eq!(train, vec![0, 2, 3, 5]);
        assert_eq!(test, vec![1, 4]);
    }

    #[test]
    fn test_assign_by_condition() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let features = TrialFeatures::new()
            .with("task", vec!["PTD", "CLK", "PTD", "CLK", "PTD", "CLK", "PTD", "OFF"])
            .unwrap();
        let conditions = vec![Condition::new().with("task", "PTD"), Condition::new().with("task", "CLK")];
        let folds = FoldAssigner::new(2).unwrap().assign_by_condition(&features, &conditions, &mut rng).unwrap();

        assert_eq!(folds[7], None);
        let ptd: Vec<usize> = [0, 2, 4, 6].iter().map(|&i| folds[i].unwrap()).collect();
        assert_eq!(ptd.iter().filter(|&&f| f == 0).count(), 2);
        let clk: Vec<usize> = [1, 3, 5].iter().map(|&i| folds[i].unwrap()).collect();
        assert!(clk.iter().filter(|&&f| f == 0).count() >= 1);
        assert!(clk.iter().filter(|&&f| f == 1).count() >= 1);
    }

    #[test]
    fn test_assign_by_condition_rejects_overlap() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let features = TrialFeatures::new().with("stim", vec![1i64, 1, 2, 2]).unwrap();
        let conditions = vec![Condition::new(), Condition::new().with("stim", 1)];
        let result = FoldAssigner::new(2).unwrap().assign_by_condition(&features, &conditions, &mut rng);
        assert!(matches!(result, Err(ResampleError::Validation(_))));
    }
}
