use crate::conditions::Condition;
use crate::counts::{BOOTSTRAP_THRES_PERC, N_TRIALS_MIN};
use crate::error::{ResampleError, Result};
use crate::strata::FeatureValue;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fs::File;
use std::io::BufReader;

// Field definitions and associated default values

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Param {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub data: Data,
    #[serde(default)]
    pub cv: CV,
    #[serde(default)]
    pub ensembles: Ensembles,
    #[serde(default)]
    pub bootstrap: Bootstrap,
    #[serde(default)]
    pub conditions: Vec<BTreeMap<String, ConditionValues>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct General {
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "one_default")]
    pub thread_number: usize,
    #[serde(default = "empty_string")]
    pub log_base: String,
    #[serde(default = "log_suffix_default")]
    pub log_suffix: String,
    #[serde(default = "log_level_default")]
    pub log_level: String,
    #[serde(default = "true_default")]
    pub display_colorful: bool,
    #[serde(default = "empty_string")]
    pub save_exp: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Data {
    #[serde(default = "empty_string")]
    pub trials: String,
    #[serde(default = "unit_column_default")]
    pub unit_column: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CV {
    #[serde(default = "k_default")]
    pub k: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Ensembles {
    /// 0 means one ensemble holding all the retained units
    #[serde(default = "zero_default")]
    pub ensemble_size: usize,
    /// 0 means no cap
    #[serde(default = "zero_default")]
    pub n_ensembles_max: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Bootstrap {
    #[serde(default = "n_min_default")]
    pub n_min: usize,
    #[serde(default = "thres_perc_default")]
    pub thres_perc: f64,
}

/// Accepted value(s) of one factor in a condition: `task: PTD` or `stim: [1, 2]`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ConditionValues {
    One(FeatureValue),
    Many(Vec<FeatureValue>),
}

fn one_default() -> usize {
    1
}
fn zero_default() -> usize {
    0
}
fn true_default() -> bool {
    true
}
fn empty_string() -> String {
    "".to_string()
}
fn log_suffix_default() -> String {
    "log".to_string()
}
fn log_level_default() -> String {
    "info".to_string()
}
fn unit_column_default() -> String {
    "unit".to_string()
}
fn k_default() -> usize {
    3
}
fn n_min_default() -> usize {
    N_TRIALS_MIN
}
fn thres_perc_default() -> f64 {
    BOOTSTRAP_THRES_PERC
}

// Default section definitions

impl Default for General {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Data {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for CV {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Ensembles {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Bootstrap {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Param {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Param {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conditions of interest, in the order of the parameter file.
    pub fn conditions(&self) -> Vec<Condition> {
        self.conditions
            .iter()
            .map(|factors| {
                factors.iter().fold(Condition::new(), |condition, (factor, values)| match values {
                    ConditionValues::One(value) => condition.with(factor.clone(), value.clone()),
                    ConditionValues::Many(values) => condition.with_any(factor.clone(), values.clone()),
                })
            })
            .collect()
    }

    /// `None` when no cap is set.
    pub fn n_ensembles_max(&self) -> Option<usize> {
        match self.ensembles.n_ensembles_max {
            0 => None,
            n => Some(n),
        }
    }
}

pub fn get(param_file: String) -> std::result::Result<Param, Box<dyn Error>> {
    let param_file_reader = File::open(param_file)?;
    let param_reader = BufReader::new(param_file_reader);

    let mut config: Param = serde_yaml::from_reader(param_reader)?;

    validate(&mut config)?;

    Ok(config)
}

pub fn validate(param: &mut Param) -> Result<()> {
    if !param.general.log_base.is_empty() {
        param.general.display_colorful = false;
    }

    if param.general.seed.is_none() {
        return Err(ResampleError::config(
            "general.seed is required: set it explicitly for reproducible resamplings",
        ));
    }

    if param.general.thread_number == 0 {
        return Err(ResampleError::config("general.thread_number must be positive"));
    }

    if param.cv.k == 0 {
        return Err(ResampleError::config("cv.k must be positive"));
    }

    if param.bootstrap.n_min == 0 {
        return Err(ResampleError::config("bootstrap.n_min must be positive"));
    }

    let thres_perc = param.bootstrap.thres_perc;
    if !thres_perc.is_finite() || thres_perc < 0.0 {
        return Err(ResampleError::config(format!(
            "Invalid bootstrap.thres_perc={}. Must be finite and >= 0.",
            thres_perc
        )));
    }
    if thres_perc > 1.0 {
        warn!(
            "bootstrap.thres_perc={} > 1: the pseudo-populations will exceed the largest trial count",
            thres_perc
        );
    }

    if param.conditions.is_empty() {
        return Err(ResampleError::config("At least one condition is required"));
    }
    if param.conditions().iter().any(|c| c.is_empty()) && param.conditions.len() > 1 {
        return Err(ResampleError::config(
            "An empty condition matches every trial and cannot be combined with other conditions",
        ));
    }

    Ok(())
}
