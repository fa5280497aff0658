//! Code for reading the parameter table from `parameters.toml`.
use super::{input_err_msg, is_sorted_and_unique, read_toml};
use crate::id::IDCollection;
use crate::parameter::{Param, ParameterTable};
use crate::sets::{Coord, Dim, IndexSets, Scenario, Step};
use anyhow::{Context, Result, ensure};
use itertools::{Itertools, iproduct};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

const PARAMETERS_FILE_NAME: &str = "parameters.toml";

/// A scenario or year selection: either a single index or a selection string
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
enum Selection {
    Single(u32),
    Text(String),
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
struct ParameterRecord {
    name: String,
    scenario: Option<Selection>,
    year: Option<Selection>,
    step: Option<u32>,
    renewable: Option<String>,
    generator: Option<String>,
    value: Option<f64>,
    values: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ParametersFile {
    #[serde(default)]
    parameter: Vec<ParameterRecord>,
}

/// Parse a selection string into the matching indices of `valid`.
///
/// The string can be "all" (case-insensitive), a semicolon-separated list (e.g. "2025;2027") or a
/// range of the form `start..end`, where either limit may be omitted to mean the first or last
/// valid index.
///
/// # Panics
///
/// If `valid` is unsorted or non-unique.
fn parse_selection(label: &str, s: &str, valid: &[u32]) -> Result<Vec<u32>> {
    assert!(is_sorted_and_unique(valid), "`valid` must be sorted and unique");

    let s = s.trim();
    ensure!(!s.is_empty(), "No {label}s provided");
    if s.eq_ignore_ascii_case("all") {
        return Ok(valid.to_vec());
    }

    let selected: Vec<u32> = if let Some((left, right)) = s.split_once("..") {
        ensure!(
            !s.contains(';') && !right.contains(".."),
            "Invalid {label} range: {s}"
        );
        let parse_limit = |limit: &str, default: u32| -> Result<u32> {
            let limit = limit.trim();
            if limit.is_empty() {
                Ok(default)
            } else {
                limit
                    .parse()
                    .with_context(|| format!("Invalid {label} in range: {limit}"))
            }
        };
        let start = parse_limit(left, valid[0])?;
        let end = parse_limit(right, *valid.last().expect("`valid` cannot be empty"))?;
        ensure!(end >= start, "Invalid {label} range: {s}");

        valid
            .iter()
            .copied()
            .filter(|index| (start..=end).contains(index))
            .collect()
    } else {
        s.split(';')
            .map(|item| {
                item.trim()
                    .parse()
                    .ok()
                    .filter(|index| valid.contains(index))
                    .with_context(|| format!("Invalid {label}: {}", item.trim()))
            })
            .try_collect()?
    };

    ensure!(!selected.is_empty(), "No valid {label}s found in {s}");
    ensure!(
        is_sorted_and_unique(&selected),
        "{label}s must be in order and unique"
    );

    Ok(selected)
}

/// Resolve an optional selection to the indices it covers
fn resolve_selection(
    label: &str,
    selection: Option<&Selection>,
    valid: &[u32],
) -> Result<Vec<Option<u32>>> {
    Ok(match selection {
        None => vec![None],
        Some(Selection::Single(index)) => {
            ensure!(valid.contains(index), "Invalid {label}: {index}");
            vec![Some(*index)]
        }
        Some(Selection::Text(s)) => parse_selection(label, s, valid)?
            .into_iter()
            .map(Some)
            .collect(),
    })
}

/// Expand one record into table entries
fn add_record(table: &mut ParameterTable, record: &ParameterRecord, sets: &IndexSets) -> Result<()> {
    let param = Param::from_str(&record.name)
        .ok()
        .with_context(|| format!("Unknown parameter name {}", record.name))?;

    let scenario_indices = sets.scenarios.iter().map(|s| s.0).collect_vec();
    let scenarios = resolve_selection("scenario", record.scenario.as_ref(), &scenario_indices)?;
    let years = resolve_selection("year", record.year.as_ref(), &sets.years)?;
    let step = record
        .step
        .map(|step| {
            ensure!(sets.steps.contains(&Step(step)), "Invalid step: {step}");
            Ok(Step(step))
        })
        .transpose()?;
    let renewable = record
        .renewable
        .as_deref()
        .map(|id| sets.renewables.get_id(id).cloned())
        .transpose()?;
    let generator = record
        .generator
        .as_deref()
        .map(|id| sets.generators.get_id(id).cloned())
        .transpose()?;

    // Values by period, or a single value with no period
    let per_period = param.dims().contains(&Dim::Period);
    let values: Vec<(Option<u32>, f64)> = match (record.value, &record.values) {
        (Some(value), None) if per_period => sets.periods.iter().map(|p| (Some(*p), value)).collect(),
        (Some(value), None) => vec![(None, value)],
        (None, Some(values)) => {
            ensure!(per_period, "{param} is not indexed by period; use `value`");
            ensure!(
                values.len() == sets.periods.len(),
                "{param} has {} values but the project has {} periods",
                values.len(),
                sets.periods.len()
            );
            sets.periods.iter().copied().map(Some).zip(values.iter().copied()).collect()
        }
        _ => anyhow::bail!("Exactly one of `value` or `values` must be given for {param}"),
    };

    for (scenario, year, (period, value)) in iproduct!(scenarios, years, values) {
        let coord = Coord {
            scenario: scenario.map(Scenario),
            year,
            step,
            period,
            renewable: renewable.clone(),
            generator: generator.clone(),
        };
        table.insert(param, coord, value)?;
    }

    Ok(())
}

/// Read the parameter table from the specified directory.
///
/// # Arguments
///
/// * `project_dir` - Folder containing project files
/// * `sets` - The project's index sets, used to validate coordinates
///
/// # Returns
///
/// A [`ParameterTable`] or an error.
pub fn read_parameters(project_dir: &Path, sets: &IndexSets) -> Result<ParameterTable> {
    let file_path = project_dir.join(PARAMETERS_FILE_NAME);
    let file: ParametersFile = read_toml(&file_path)?;
    read_parameters_from_records(&file.parameter, sets).with_context(|| input_err_msg(&file_path))
}

fn read_parameters_from_records(
    records: &[ParameterRecord],
    sets: &IndexSets,
) -> Result<ParameterTable> {
    let mut table = ParameterTable::default();
    for (index, record) in records.iter().enumerate() {
        add_record(&mut table, record, sets)
            .with_context(|| format!("Invalid parameter entry #{} ({})", index + 1, record.name))?;
    }

    Ok(table)
}
