use crate::error::{ResampleError, Result};
use crate::strata::{FeatureValue, TrialFeatures};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Experimental condition, used as an opaque key to group trials.
///
/// Each factor maps to the set of accepted values: a trial belongs to the condition when, for every
/// factor, its value is one of the accepted ones.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Condition {
    factors: BTreeMap<String, Vec<FeatureValue>>,
}

impl Condition {
    pub fn new() -> Condition {
        Condition::default()
    }

    /// Extend the condition with an equality test on one factor (replaces a previous test on it).
    pub fn with<S: Into<String>, V: Into<FeatureValue>>(mut self, factor: S, value: V) -> Condition {
        self.factors.insert(factor.into(), vec![value.into()]);
        self
    }

    /// Extend the condition with a membership test on one factor.
    pub fn with_any<S: Into<String>, V: Into<FeatureValue>>(mut self, factor: S, values: Vec<V>) -> Condition {
        let mut values: Vec<FeatureValue> = values.into_iter().map(|v| v.into()).collect();
        values.sort();
        values.dedup();
        self.factors.insert(factor.into(), values);
        self
    }

    pub fn factors(&self) -> &BTreeMap<String, Vec<FeatureValue>> {
        &self.factors
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Absolute indices of the trials of one unit which belong to the condition, in trial order.
    pub fn match_idx(&self, features: &TrialFeatures) -> Result<Vec<usize>> {
        let columns = self
            .factors
            .iter()
            .map(|(name, accepted)| {
                features
                    .factor(name)
                    .map(|column| (column, accepted))
                    .ok_or_else(|| ResampleError::validation(format!("Unknown factor '{}' in condition {}", name, self)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((0..features.n_trials())
            .filter(|&i| {
                columns
                    .iter()
                    .all(|(column, accepted)| column.get(i).map_or(false, |v| accepted.contains(v)))
            })
            .collect())
    }

    /// Number of trials of one unit which belong to the condition.
    pub fn count(&self, features: &TrialFeatures) -> Result<usize> {
        Ok(self.match_idx(features)?.len())
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .factors
            .iter()
            .map(|(name, values)| {
                let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                if values.len() == 1 {
                    format!("{}={}", name, values[0])
                } else {
                    format!("{}∈{{{}}}", name, values.join(","))
                }
            })
            .collect();
        write!(f, "[{}]", parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_features() -> TrialFeatures {
        TrialFeatures::new()
            .with("task", vec!["PTD", "PTD", "CLK", "PTD", "CLK"])
            .unwrap()
            .with("stim", vec![1i64, 2, 1, 1, 2])
            .unwrap()
    }

    #[test]
    fn test_match_idx_equality() {
        let features = unit_features();
        let cond = Condition::new().with("task", "PTD").with("stim", 1);
        assert_eq!(cond.match_idx(&features).unwrap(), vec![0, 3]);
        assert_eq!(cond.count(&features).unwrap(), 2);
    }

    #[test]
    fn test_match_idx_membership() {
        let features = unit_features();
        let cond = Condition::new().with_any("stim", vec![1, 2]).with("task", "CLK");
        assert_eq!(cond.match_idx(&features).unwrap(), vec![2, 4]);
    }

    #[test]
    fn test_empty_condition_matches_everything() {
        let features = unit_features();
        assert_eq!(Condition::new().count(&features).unwrap(), 5);
    }

    #[test]
    fn test_unknown_factor_fails() {
        let features = unit_features();
        let err = Condition::new().with("ctx", "P").match_idx(&features).unwrap_err();
        assert!(matches!(err, ResampleError::Validation(_)));
        assert!(err.to_string().contains("Unknown factor 'ctx'"));
    }

    #[test]
    fn test_with_replaces_previous_test() {
        let cond = Condition::new().with("task", "PTD").with("task", "CLK");
        assert_eq!(cond, Condition::new().with("task", "CLK"));
    }

    #[test]
    fn test_conditions_usable_as_keys() {
        use std::collections::HashMap;
        let mut counts = HashMap::new();
        counts.insert(Condition::new().with("task", "PTD"), 3usize);
        assert_eq!(counts.get(&Condition::new().with("task", "PTD")), Some(&3));
        assert_eq!(counts.get(&Condition::new().with("task", "CLK")), None);
    }

    #[test]
    fn test_display() {
        let cond = Condition::new().with("task", "PTD").with_any("stim", vec![2, 1]);
        assert_eq!(cond.to_string(), "[stim∈{1,2} task=PTD]");
    }
}
