pub mod bootstrap;
pub mod conditions;
pub mod counts;
pub mod cv;
pub mod data;
pub mod ensembles;
pub mod error;
pub mod experiment;
pub mod param;
pub mod pseudo_trials;
pub mod strata;
pub mod utils;

use crate::counts::{Excluder, SampleSizer, TrialsCounter};
use crate::cv::{FoldAssigner, UnitFolds};
use crate::data::UnitRecord;
use crate::ensembles::{units_in_ensembles, EnsembleAssigner};
use crate::error::{ResampleError, Result};
use crate::experiment::{ConditionSize, Resampling};
use crate::pseudo_trials::{gather_ensembles, PseudoTrialsBuilder};
use crate::strata::TrialFeatures;
use chrono::Local;
use log::{debug, warn};
use param::Param;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::collections::BTreeMap;
use std::error::Error;

/// Load the trial table named in the parameters, then resample it.
pub fn run(param: &Param) -> std::result::Result<Resampling, Box<dyn Error>> {
    let units = data::load_trials(&param.data.trials, &param.data.unit_column)?;
    Ok(run_on_units(&units, param)?)
}

/// Resample a population into pseudo-populations, one per ensemble of units.
///
/// 1. Count the trials of each unit in each condition and size each condition.
/// 2. Exclude the units which cannot provide the sample size in every fold of every condition.
/// 3. Assign the retained units to ensembles.
/// 4. Assign the trials of each retained unit to folds, stratified by condition.
/// 5. Build the pseudo-trials of each ensemble, in parallel, each from its own seed.
///
/// The result only depends on `general.seed`, not on `general.thread_number`.
pub fn run_on_units(units: &[UnitRecord], param: &Param) -> Result<Resampling> {
    let start = std::time::Instant::now();
    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();

    let seed = param
        .general
        .seed
        .ok_or_else(|| ResampleError::config("general.seed is required"))?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let conditions = param.conditions();
    if conditions.is_empty() {
        return Err(ResampleError::config("At least one condition is required"));
    }
    if units.is_empty() {
        return Err(ResampleError::validation("Empty population"));
    }
    let k = param.cv.k;
    let features: Vec<TrialFeatures> = units.iter().map(|u| u.features.clone()).collect();
    cinfo!(param.general.display_colorful, "\x1b[2;97m{} units, {} conditions, {} folds\x1b[0m", units.len(), conditions.len(), k);

    // Sample size per condition
    let sizer = SampleSizer::new(k, param.bootstrap.n_min, param.bootstrap.thres_perc);
    let mut sizes = Vec::with_capacity(conditions.len());
    let mut excluded: Vec<usize> = Vec::new();
    for condition in &conditions {
        let counts = TrialsCounter::count(&features, condition)?;
        let sample_size = sizer.process(&counts)?;
        let n_excluded = SampleSizer::count_excluded_units(&counts, k, sample_size);
        if n_excluded > 0 {
            warn!(
                "Condition {}: {} units out of {} lack {} trials per fold and are excluded",
                condition,
                n_excluded,
                units.len(),
                sample_size
            );
        }
        let counts_in_fold: Vec<usize> = counts.iter().map(|&n| FoldAssigner::eval_min_count(k, n)).collect();
        let retained = Excluder::exclude_from_counts(&counts_in_fold, sample_size);
        let all: Vec<usize> = (0..units.len()).collect();
        for u in Excluder::exclude_by_difference(&all, &retained) {
            if !excluded.contains(&u) {
                excluded.push(u);
            }
        }
        cinfo!(param.general.display_colorful, "Condition {}: \x1b[1;92m{}\x1b[0m pseudo-trials per fold", condition, sample_size);
        sizes.push(ConditionSize { condition: condition.clone(), counts, sample_size, n_excluded });
    }
    excluded.sort();
    let retained = Excluder::exclude_by_difference(&(0..units.len()).collect::<Vec<usize>>(), &excluded);
    if retained.is_empty() {
        return Err(ResampleError::validation("No unit has enough trials in every condition"));
    }

    // Ensembles over the retained units
    let ensemble_size = match param.ensembles.ensemble_size {
        0 => retained.len(),
        n => n,
    };
    let assigner = EnsembleAssigner::new(ensemble_size, param.n_ensembles_max())?;
    let ensembles = units_in_ensembles(&retained, &assigner.assign(retained.len(), &mut rng)?)?;
    cinfo!(param.general.display_colorful, "{} ensembles of {} units", ensembles.len(), ensemble_size);

    // Folds, per unit, in population order
    let fold_assigner = FoldAssigner::new(k)?;
    let mut folds_by_unit: BTreeMap<usize, UnitFolds> = BTreeMap::new();
    for &u in &retained {
        let folds = fold_assigner.assign_by_condition(&features[u], &conditions, &mut rng)?;
        folds_by_unit.insert(u, folds);
    }

    // Pseudo-trials, one generator per ensemble
    let builder = PseudoTrialsBuilder::new(
        k,
        sizes.iter().map(|s| (s.condition.clone(), s.sample_size)).collect(),
    )?;
    let seeds = utils::derive_seeds(ensembles.len(), &mut rng);
    let pool = ThreadPoolBuilder::new()
        .num_threads(param.general.thread_number)
        .build()
        .map_err(|e| ResampleError::config(format!("Failed to build thread pool: {}", e)))?;
    let pseudo_trials = pool.install(|| {
        ensembles
            .par_iter()
            .zip(seeds.par_iter())
            .enumerate()
            .map(|(i, (ensemble, seed))| {
                let mut ensemble_rng = ChaCha8Rng::seed_from_u64(*seed);
                let ensemble_features: Vec<&TrialFeatures> = ensemble.iter().map(|&u| &features[u]).collect();
                let ensemble_folds: Vec<&UnitFolds> = ensemble.iter().map(|u| &folds_by_unit[u]).collect();
                let pseudo = builder.build(&ensemble_features, &ensemble_folds, &mut ensemble_rng)?;
                debug!("Ensemble {} built", i);
                Ok(pseudo)
            })
            .collect::<Result<Vec<_>>>()
    })?;
    let pseudo_trials = gather_ensembles(pseudo_trials)?;

    let ids: Vec<String> = units.iter().map(|u| u.id.clone()).collect();
    let pseudopop_version = format!(
        "{}#{}",
        env!("CARGO_PKG_VERSION"),
        option_env!("PSEUDOPOP_GIT_SHA").unwrap_or("unknown")
    );
    let stem = param.general.save_exp.split('.').next().unwrap_or("");
    let id = if stem.is_empty() { timestamp.clone() } else { format!("{}_{}", stem, timestamp) };

    Ok(Resampling {
        id,
        timestamp,
        pseudopop_version,
        parameters: param.clone(),
        sizes,
        excluded_units: excluded.iter().map(|&u| ids[u].clone()).collect(),
        ensembles: units_in_ensembles(&ids, &ensembles)?,
        folds_by_unit: folds_by_unit.into_iter().map(|(u, folds)| (ids[u].clone(), folds)).collect(),
        units: ids,
        pseudo_trials,
        execution_time: start.elapsed().as_secs_f64(),
    })
}
