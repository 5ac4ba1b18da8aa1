use crate::error::{ResampleError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Stratum label of each sample, in `[0, n_strata)`.
pub type Strata = Vec<usize>;

/// A scalar feature value attached to one trial (task, context, stimulus, fold...).
///
/// Values of one kind are totally ordered: integers and texts by their natural order, floats by
/// value (NaN is rejected upstream, `-0.0 == 0.0`). Values of different kinds are ordered by kind.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeatureKind {
    Int,
    Float,
    Text,
}

impl FeatureValue {
    pub fn kind(&self) -> FeatureKind {
        match self {
            FeatureValue::Int(_) => FeatureKind::Int,
            FeatureValue::Float(_) => FeatureKind::Float,
            FeatureValue::Text(_) => FeatureKind::Text,
        }
    }

    fn is_nan(&self) -> bool {
        matches!(self, FeatureValue::Float(x) if x.is_nan())
    }
}

impl Ord for FeatureValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (FeatureValue::Int(a), FeatureValue::Int(b)) => a.cmp(b),
            (FeatureValue::Float(a), FeatureValue::Float(b)) => {
                if a == b {
                    Ordering::Equal
                } else {
                    a.total_cmp(b)
                }
            }
            (FeatureValue::Text(a), FeatureValue::Text(b)) => a.cmp(b),
            (a, b) => a.kind().cmp(&b.kind()),
        }
    }
}

impl PartialOrd for FeatureValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for FeatureValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FeatureValue {}

impl Hash for FeatureValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        match self {
            FeatureValue::Int(v) => v.hash(state),
            // 0.0 and -0.0 compare equal, so they must hash equal
            FeatureValue::Float(v) => (if *v == 0.0 { 0.0f64 } else { *v }).to_bits().hash(state),
            FeatureValue::Text(v) => v.hash(state),
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Int(v) => write!(f, "{}", v),
            FeatureValue::Float(v) => write!(f, "{}", v),
            FeatureValue::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        FeatureValue::Int(v)
    }
}

impl From<i32> for FeatureValue {
    fn from(v: i32) -> Self {
        FeatureValue::Int(v as i64)
    }
}

impl From<usize> for FeatureValue {
    fn from(v: usize) -> Self {
        FeatureValue::Int(v as i64)
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Float(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Text(v.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        FeatureValue::Text(v)
    }
}

/// One feature observed on every sample of a collection. Samples are identified by position.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureArray {
    values: Vec<FeatureValue>,
}

impl FeatureArray {
    pub fn new(values: Vec<FeatureValue>) -> FeatureArray {
        FeatureArray { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&FeatureValue> {
        self.values.get(i)
    }

    pub fn values(&self) -> &[FeatureValue] {
        &self.values
    }

    /// Kind shared by all the values, `None` for an empty array.
    pub fn kind(&self) -> Option<FeatureKind> {
        self.values.first().map(|v| v.kind())
    }

    /// Check that the array holds a single kind of value and no NaN.
    pub fn validate(&self) -> Result<()> {
        if let Some(kind) = self.kind() {
            if let Some(odd) = self.values.iter().find(|v| v.kind() != kind) {
                return Err(ResampleError::validation(format!(
                    "Unsupported feature array mixing {:?} and {:?} values",
                    kind,
                    odd.kind()
                )));
            }
        }
        if let Some(i) = self.values.iter().position(|v| v.is_nan()) {
            return Err(ResampleError::validation(format!(
                "Unsupported NaN feature value at sample {}",
                i
            )));
        }
        Ok(())
    }
}

impl From<Vec<i64>> for FeatureArray {
    fn from(v: Vec<i64>) -> Self {
        FeatureArray::new(v.into_iter().map(FeatureValue::Int).collect())
    }
}

impl From<Vec<f64>> for FeatureArray {
    fn from(v: Vec<f64>) -> Self {
        FeatureArray::new(v.into_iter().map(FeatureValue::Float).collect())
    }
}

impl From<Vec<&str>> for FeatureArray {
    fn from(v: Vec<&str>) -> Self {
        FeatureArray::new(v.into_iter().map(FeatureValue::from).collect())
    }
}

impl From<Vec<String>> for FeatureArray {
    fn from(v: Vec<String>) -> Self {
        FeatureArray::new(v.into_iter().map(FeatureValue::Text).collect())
    }
}

impl From<Vec<FeatureValue>> for FeatureArray {
    fn from(v: Vec<FeatureValue>) -> Self {
        FeatureArray::new(v)
    }
}

/// Validate a set of features before stratification: non-empty, homogeneous and of equal lengths.
pub fn validate_features(features: &[FeatureArray]) -> Result<()> {
    if features.is_empty() {
        return Err(ResampleError::validation("No feature provided for stratification"));
    }
    for feature in features {
        feature.validate()?;
    }
    let lengths: Vec<usize> = features.iter().map(|f| f.len()).collect();
    if lengths.iter().any(|&n| n != lengths[0]) {
        return Err(ResampleError::validation(format!(
            "Unequal number of samples across features: {:?}",
            lengths
        )));
    }
    Ok(())
}

/// Divide samples in strata based on the combinations of their feature values.
///
/// Two samples share a label iff their feature tuples are equal. Labels follow the sorted order of
/// the distinct tuples (not the order of first appearance), so that `[2, 1, 2]` yields `[1, 0, 1]`.
pub fn stratify(features: &[FeatureArray]) -> Result<Strata> {
    validate_features(features)?;
    let n_samples = features[0].len();

    let rows: Vec<Vec<&FeatureValue>> = (0..n_samples)
        .map(|i| features.iter().map(|f| &f.values[i]).collect())
        .collect();

    let mut combinations: BTreeMap<&[&FeatureValue], usize> = BTreeMap::new();
    for row in &rows {
        combinations.entry(row.as_slice()).or_insert(0);
    }
    for (label, value) in combinations.values_mut().enumerate() {
        *value = label;
    }

    Ok(rows.iter().map(|row| combinations[row.as_slice()]).collect())
}

/// Number of distinct labels in a strata vector produced by [`stratify`].
pub fn n_strata(strata: &[usize]) -> usize {
    strata.iter().max().map_or(0, |m| m + 1)
}

/// Named features of all the trials recorded for one unit.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct TrialFeatures {
    factors: BTreeMap<String, FeatureArray>,
    n_trials: usize,
}

impl TrialFeatures {
    pub fn new() -> TrialFeatures {
        TrialFeatures::default()
    }

    /// Add a factor column. All columns must have the same number of trials.
    pub fn insert<S: Into<String>>(&mut self, name: S, values: FeatureArray) -> Result<()> {
        let name = name.into();
        values.validate()?;
        if !self.factors.is_empty() && values.len() != self.n_trials {
            return Err(ResampleError::validation(format!(
                "Factor '{}' has {} trials, expected {}",
                name,
                values.len(),
                self.n_trials
            )));
        }
        self.n_trials = values.len();
        self.factors.insert(name, values);
        Ok(())
    }

    pub fn with<S: Into<String>, A: Into<FeatureArray>>(mut self, name: S, values: A) -> Result<TrialFeatures> {
        self.insert(name, values.into())?;
        Ok(self)
    }

    pub fn n_trials(&self) -> usize {
        self.n_trials
    }

    pub fn factor(&self, name: &str) -> Option<&FeatureArray> {
        self.factors.get(name)
    }

    pub fn factor_names(&self) -> Vec<&str> {
        self.factors.keys().map(|k| k.as_str()).collect()
    }

    /// Stratify the trials by the given factors.
    pub fn stratify_by(&self, names: &[&str]) -> Result<Strata> {
        let features = names
            .iter()
            .map(|name| {
                self.factor(name).cloned().ok_or_else(|| {
                    ResampleError::validation(format!("Unknown factor '{}'", name))
                })
            })
            .collect::<Result<Vec<FeatureArray>>>()?;
        stratify(&features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stratify_mixed_feature_kinds() {
        let features = vec![
            FeatureArray::from(vec![1i64, 1, 2]),
            FeatureArray::from(vec![0.1, 0.1, 0.2]),
            FeatureArray::from(vec!["A", "A", "B"]),
        ];
        assert_eq!(stratify(&features).unwrap(), vec![0, 0, 1]);
    }

    #[test]
    fn test_stratify_labels_follow_sorted_order() {
        let features = vec![FeatureArray::from(vec![2i64, 1, 2, 0])];
        assert_eq!(stratify(&features).unwrap(), vec![2, 1, 2, 0]);

        let features = vec![FeatureArray::from(vec!["b", "a", "c", "a"])];
        assert_eq!(stratify(&features).unwrap(), vec![1, 0, 2, 0]);
    }

    #[test]
    fn test_stratify_combinations() {
        let features = vec![
            FeatureArray::from(vec!["PTD", "PTD", "CLK", "CLK", "PTD"]),
            FeatureArray::from(vec![1i64, 2, 1, 1, 1]),
        ];
        // sorted tuples: (CLK,1) (PTD,1) (PTD,2)
        assert_eq!(stratify(&features).unwrap(), vec![1, 2, 0, 0, 1]);
    }

    #[test]
    fn test_stratify_same_label_iff_same_features() {
        let a = FeatureArray::from(vec![0i64, 1, 0, 1, 0, 1, 2]);
        let b = FeatureArray::from(vec!["x", "x", "y", "y", "x", "x", "x"]);
        let features = vec![a.clone(), b.clone()];
        let strata = stratify(&features).unwrap();
        for i in 0..strata.len() {
            for j in 0..strata.len() {
                let same = a.get(i) == a.get(j) && b.get(i) == b.get(j);
                assert_eq!(strata[i] == strata[j], same, "samples {} and {}", i, j);
            }
        }
        assert_eq!(n_strata(&strata), 5);
    }

    #[test]
    fn test_stratify_is_deterministic() {
        let features = vec![
            FeatureArray::from(vec![3.5, -1.0, 3.5, 0.0]),
            FeatureArray::from(vec!["a", "b", "a", "b"]),
        ];
        assert_eq!(stratify(&features).unwrap(), stratify(&features).unwrap());
    }

    #[test]
    fn test_stratify_negative_zero_equals_zero() {
        let features = vec![FeatureArray::from(vec![0.0, -0.0, 1.0])];
        assert_eq!(stratify(&features).unwrap(), vec![0, 0, 1]);
    }

    #[test]
    fn test_stratify_rejects_unequal_lengths() {
        let features = vec![FeatureArray::from(vec![1i64, 2]), FeatureArray::from(vec![1i64, 2, 3])];
        let err = stratify(&features).unwrap_err();
        assert!(matches!(err, ResampleError::Validation(_)));
        assert!(err.to_string().contains("Unequal number of samples"));
    }

    #[test]
    fn test_stratify_rejects_mixed_array() {
        let features = vec![FeatureArray::new(vec![FeatureValue::Int(1), FeatureValue::from("a")])];
        assert!(matches!(stratify(&features), Err(ResampleError::Validation(_))));
    }

    #[test]
    fn test_stratify_rejects_nan() {
        let features = vec![FeatureArray::from(vec![1.0, f64::NAN])];
        assert!(matches!(stratify(&features), Err(ResampleError::Validation(_))));
    }

    #[test]
    fn test_stratify_rejects_empty_feature_list() {
        assert!(matches!(stratify(&[]), Err(ResampleError::Validation(_))));
    }

    #[test]
    fn test_stratify_empty_samples() {
        let features = vec![FeatureArray::from(Vec::<i64>::new())];
        assert_eq!(stratify(&features).unwrap(), Vec::<usize>::new());
        assert_eq!(n_strata(&[]), 0);
    }

    #[test]
    fn test_trial_features_rejects_length_mismatch() {
        let features = TrialFeatures::new().with("task", vec!["PTD", "CLK"]).unwrap();
        assert_eq!(features.n_trials(), 2);
        let err = features.with("stim", vec![1i64, 2, 3]).unwrap_err();
        assert!(err.to_string().contains("Factor 'stim' has 3 trials, expected 2"));
    }

    #[test]
    fn test_trial_features_stratify_by() {
        let features = TrialFeatures::new()
            .with("task", vec!["PTD", "CLK", "PTD"])
            .unwrap()
            .with("stim", vec![1i64, 1, 2])
            .unwrap();
        assert_eq!(features.stratify_by(&["task"]).unwrap(), vec![1, 0, 1]);
        assert_eq!(features.stratify_by(&["task", "stim"]).unwrap(), vec![1, 0, 2]);
        assert!(features.stratify_by(&["ctx"]).is_err());
        assert_eq!(features.factor_names(), vec!["stim", "task"]);
    }

    #[test]
    fn test_feature_value_untagged_deserialization() {
        let values: Vec<FeatureValue> = serde_yaml::from_str("[1, 0.5, PTD]").unwrap();
        assert_eq!(values, vec![FeatureValue::Int(1), FeatureValue::Float(0.5), FeatureValue::from("PTD")]);
    }
}
