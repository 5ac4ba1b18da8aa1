use crate::strata::{FeatureArray, FeatureKind, FeatureValue, TrialFeatures};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::io::Read;

/// Trials of one recorded unit (neuron), with the task variables of each trial.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub id: String,
    pub features: TrialFeatures,
}

impl UnitRecord {
    pub fn new<S: Into<String>>(id: S, features: TrialFeatures) -> UnitRecord {
        UnitRecord { id: id.into(), features }
    }
}

impl fmt::Display for UnitRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} trials, factors: {})", self.id, self.features.n_trials(), self.features.factor_names().join(", "))
    }
}

/// Load a tab-separated trial table: one row per trial, a unit column and one column per factor.
pub fn load_trials(path: &str, unit_column: &str) -> Result<Vec<UnitRecord>, Box<dyn Error>> {
    info!("Loading file {}...", path);
    let reader = csv::ReaderBuilder::new().delimiter(b'\t').has_headers(true).from_path(path)?;
    let units = parse_trials(reader, unit_column)?;
    info!("{} units loaded from {}", units.len(), path);
    Ok(units)
}

/// Same as [`load_trials`], from any reader.
pub fn read_trials<R: Read>(rdr: R, unit_column: &str) -> Result<Vec<UnitRecord>, Box<dyn Error>> {
    let reader = csv::ReaderBuilder::new().delimiter(b'\t').has_headers(true).from_reader(rdr);
    parse_trials(reader, unit_column)
}

fn parse_trials<R: Read>(mut reader: csv::Reader<R>, unit_column: &str) -> Result<Vec<UnitRecord>, Box<dyn Error>> {
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let unit_pos = headers
        .iter()
        .position(|h| h == unit_column)
        .ok_or_else(|| format!("Unit column '{}' not found in header {:?}", unit_column, headers))?;
    let factor_names: Vec<&String> = headers.iter().enumerate().filter(|&(i, _)| i != unit_pos).map(|(_, h)| h).collect();

    // Cells are kept as text until every row is read, so that a column gets one kind for all units
    let mut order: Vec<String> = Vec::new();
    let mut rows_by_unit: HashMap<String, Vec<Vec<String>>> = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let unit = record.get(unit_pos).ok_or("Row without unit identifier")?.to_string();
        let cells: Vec<String> =
            record.iter().enumerate().filter(|&(i, _)| i != unit_pos).map(|(_, c)| c.to_string()).collect();
        rows_by_unit
            .entry(unit.clone())
            .or_insert_with(|| {
                order.push(unit);
                Vec::new()
            })
            .push(cells);
    }

    let kinds: Vec<FeatureKind> = (0..factor_names.len())
        .map(|j| column_kind(rows_by_unit.values().flatten().map(|row| row[j].as_str())))
        .collect();
    debug!("Factor kinds: {:?}", factor_names.iter().zip(kinds.iter()).collect::<Vec<_>>());

    let mut units = Vec::with_capacity(order.len());
    for id in order {
        let rows = &rows_by_unit[&id];
        let mut features = TrialFeatures::new();
        for (j, (name, kind)) in factor_names.iter().zip(kinds.iter()).enumerate() {
            let values = rows.iter().map(|row| parse_cell(&row[j], *kind)).collect::<Result<Vec<_>, _>>()?;
            features.insert(name.as_str(), FeatureArray::new(values))?;
        }
        units.push(UnitRecord::new(id, features));
    }
    Ok(units)
}

/// `Int` if every cell parses as an integer, else `Float` if every cell parses as a number, else `Text`.
fn column_kind<'a, I: Iterator<Item = &'a str> + Clone>(cells: I) -> FeatureKind {
    if cells.clone().all(|c| c.trim().parse::<i64>().is_ok()) {
        FeatureKind::Int
    } else if cells.clone().all(|c| c.trim().parse::<f64>().is_ok()) {
        FeatureKind::Float
    } else {
        FeatureKind::Text
    }
}

fn parse_cell(cell: &str, kind: FeatureKind) -> Result<FeatureValue, Box<dyn Error>> {
    Ok(match kind {
        FeatureKind::Int => FeatureValue::Int(cell.trim().parse()?),
        FeatureKind::Float => FeatureValue::Float(cell.trim().parse()?),
        FeatureKind::Text => FeatureValue::Text(cell.to_string()),
    })
}
