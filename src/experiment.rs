use crate::conditions::Condition;
use crate::counts::Counts;
use crate::cv::UnitFolds;
use crate::param::Param;
use crate::pseudo_trials::PseudoPopulation;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sample size retained for one condition.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConditionSize {
    pub condition: Condition,
    /// Trials available in each unit of the population
    pub counts: Counts,
    /// Pseudo-trials formed per fold
    pub sample_size: usize,
    /// Units which cannot provide `sample_size` trials in every fold
    pub n_excluded: usize,
}

/// Complete resampling of a population into pseudo-populations
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Resampling {
    /// Resampling ID, i.e., output stem and timestamp
    pub id: String,
    pub timestamp: String,
    /// Pseudopop version and git hash used
    pub pseudopop_version: String,
    pub parameters: Param,

    /// Identifiers of all the units of the population, in loading order
    pub units: Vec<String>,
    pub sizes: Vec<ConditionSize>,
    /// Units short of trials in at least one condition
    pub excluded_units: Vec<String>,

    /// Unit identifiers of each ensemble
    pub ensembles: Vec<Vec<String>>,
    /// Fold label of each trial, for every retained unit
    pub folds_by_unit: BTreeMap<String, UnitFolds>,
    /// One pseudo-population per ensemble, units in ensemble order
    pub pseudo_trials: Vec<PseudoPopulation>,

    /// Execution time in seconds
    pub execution_time: f64,
}

impl Resampling {
    /// Pseudo-trials formed per fold, across conditions.
    pub fn n_pseudo_tot(&self) -> usize {
        self.sizes.iter().map(|s| s.sample_size).sum()
    }

    pub fn display_results(&self) -> String {
        let mut text = String::new();
        text.push_str(&format!("\n=============== Resampling {} ===============\n\n", self.id));
        text.push_str(&format!("Pseudopop version: v{}\n", self.pseudopop_version));
        text.push_str(&format!("Timestamp: {}\n", self.timestamp));
        text.push_str(&format!("Execution time: {:.2}s\n", self.execution_time));
        text.push_str(&format!("Parameters: \x1b[2;97m{:?}\x1b[0m\n\n", &self.parameters));

        text.push_str(&format!(
            "Units: {} loaded, \x1b[1;91m{}\x1b[0m excluded\n",
            self.units.len(),
            self.excluded_units.len()
        ));
        for size in &self.sizes {
            text.push_str(&format!(
                "  {} -> \x1b[1;92m{}\x1b[0m pseudo-trials per fold ({} units short)\n",
                size.condition, size.sample_size, size.n_excluded
            ));
        }
        text.push_str(&format!(
            "Ensembles: {} x {} units, {} folds, {} pseudo-trials per fold\n",
            self.ensembles.len(),
            self.ensembles.first().map_or(0, |e| e.len()),
            self.parameters.cv.k,
            self.n_pseudo_tot()
        ));
        text
    }

    /// Saves the resampling in a suitable format based on file extension.
    pub fn save_auto<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();

        match ext.as_str() {
            "json" => self.save_json(path),
            "yaml" | "yml" => self.save_yaml(path),
            _ => {
                warn!("Unknown format. Saving resampling in json.");
                self.save_json(path.with_extension("json"))
            }
        }
    }

    fn save_json<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn save_yaml<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Loads the resampling from a file, automatically detecting the format based on file extension.
    pub fn load_auto<P: AsRef<std::path::Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();

        match ext.as_str() {
            "json" => Self::load_json(path),
            "yaml" | "yml" => Self::load_yaml(path),
            _ => Self::load_with_fallback(path),
        }
    }

    fn load_json<P: AsRef<std::path::Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let resampling: Resampling = serde_json::from_str(&content)?;
        Ok(resampling)
    }

    fn load_yaml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let resampling: Resampling = serde_yaml::from_str(&content)?;
        Ok(resampling)
    }

    /// Tries JSON, then YAML.
    fn load_with_fallback<P: AsRef<std::path::Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();

        if let Ok(resampling) = Self::load_json(path) {
            return Ok(resampling);
        }

        if let Ok(resampling) = Self::load_yaml(path) {
            return Ok(resampling);
        }

        Err("Unable to load the resampling".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_resampling() -> Resampling {
        let mut parameters = Param::default();
        parameters.general.seed = Some(42);
        parameters.cv.k = 2;
        let condition = Condition::new().with("task", "PTD").with_any("stim", vec![0.5, 1.0]);
        let mut folds_by_unit = BTreeMap::new();
        folds_by_unit.insert("n1".to_string(), vec![Some(0), Some(1), None, Some(1), Some(0)]);
        folds_by_unit.insert("n2".to_string(), vec![Some(1), Some(0), Some(0), Some(1)]);

        Resampling {
            id: "test_2025-01-01_00-00-00".to_string(),
            timestamp: "2025-01-01_00-00-00".to_string(),
            pseudopop_version: "0.3.0#test".to_string(),
            parameters,
            units: vec!["n1".to_string(), "n2".to_string(), "n3".to_string()],
            sizes: vec![ConditionSize { condition, counts: vec![4, 4, 1], sample_size: 2, n_excluded: 1 }],
            excluded_units: vec!["n3".to_string()],
            ensembles: vec![vec!["n2".to_string(), "n1".to_string()]],
            folds_by_unit,
            pseudo_trials: vec![PseudoPopulation {
                indices: vec![vec![vec![1, 2], vec![0, 3]], vec![vec![0, 4], vec![3, 1]]],
            }],
            execution_time: 0.25,
        }
    }

    #[test]
    fn test_json_roundtrip() {
        let original = create_test_resampling();
        let file_path = "test_resampling_json_roundtrip.json";
        original.save_auto(file_path).unwrap();
        let loaded = Resampling::load_auto(file_path).unwrap();
        std::fs::remove_file(file_path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let original = create_test_resampling();
        let file_path = "test_resampling_yaml_roundtrip.yaml";
        original.save_auto(file_path).unwrap();
        let loaded = Resampling::load_auto(file_path).unwrap();
        std::fs::remove_file(file_path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_unknown_extension_falls_back_to_json() {
        let original = create_test_resampling();
        original.save_auto("test_resampling_unknown_ext.out").unwrap();
        let loaded = Resampling::load_auto("test_resampling_unknown_ext.json").unwrap();
        std::fs::remove_file("test_resampling_unknown_ext.json").unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(Resampling::load_auto("test_resampling_missing.json").is_err());
        assert!(Resampling::load_auto("test_resampling_missing").is_err());
    }

    #[test]
    fn test_display_results() {
        let text = create_test_resampling().display_results();
        assert!(text.contains("Resampling test_2025-01-01_00-00-00"));
        assert!(text.contains("Ensembles: 1 x 2 units, 2 folds, 2 pseudo-trials per fold"));
    }
}
