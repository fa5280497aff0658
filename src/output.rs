//! Writing solved models to the output folder.
use crate::id::{GeneratorID, RenewableID};
use crate::sets::Coord;
use crate::solver::Solution;
use anyhow::{Context, Result, ensure};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the file containing the value of every variable
const VARIABLES_FILE_NAME: &str = "variables.csv";

/// Name of the file summarising the solved model
const SUMMARY_FILE_NAME: &str = "summary.toml";

/// Get the default output directory for the project at `project_dir`.
///
/// The folder is a subfolder of `results_root` with the same name as the project folder.
pub fn get_output_dir(project_dir: &Path, results_root: PathBuf) -> Result<PathBuf> {
    // Canonicalise in case the user has specified "."
    let project_dir = project_dir
        .canonicalize()
        .context("Could not resolve path to project")?;

    let project_name = project_dir
        .file_name()
        .context("Project cannot be in root folder")?
        .to_str()
        .context("Invalid chars in project dir name")?;

    Ok([results_root, project_name.into()].iter().collect())
}

/// Create a new output directory for the project, optionally overwriting existing data.
///
/// # Arguments
///
/// * `output_dir` - The output directory to create/overwrite
/// * `allow_overwrite` - Whether to delete and recreate the folder if it is non-empty
///
/// # Returns
///
/// True if the output dir contained existing data that was deleted, false if not, or an error.
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    let overwrite = if let Ok(mut it) = fs::read_dir(output_dir) {
        if it.next().is_none() {
            return Ok(false);
        }

        ensure!(
            allow_overwrite,
            "Output folder already exists and is not empty. \
            Please delete the folder or pass the --overwrite command-line option."
        );

        fs::remove_dir_all(output_dir)?;
        true
    } else {
        false
    };

    fs::create_dir_all(output_dir)?;

    Ok(overwrite)
}

/// A row of `variables.csv`
#[derive(Serialize, Debug, PartialEq)]
struct VariableRow<'a> {
    variable: &'a str,
    scenario: Option<u32>,
    year: Option<u32>,
    step: Option<u32>,
    period: Option<u32>,
    renewable: Option<&'a RenewableID>,
    generator: Option<&'a GeneratorID>,
    value: f64,
}

impl<'a> VariableRow<'a> {
    fn new(variable: &'a str, coord: &'a Coord, value: f64) -> Self {
        Self {
            variable,
            scenario: coord.scenario.map(|s| s.0),
            year: coord.year,
            step: coord.step.map(|s| s.0),
            period: coord.period,
            renewable: coord.renewable.as_ref(),
            generator: coord.generator.as_ref(),
            value,
        }
    }
}

/// Summary of a solved model
#[derive(Serialize, Debug, PartialEq)]
struct Summary<'a> {
    project: &'a str,
    objective_value: f64,
    num_variables: usize,
    num_constraints: usize,
    max_constraint_violation: f64,
}

/// Write the solved value of every variable, one row per coordinate, to `variables.csv`
pub fn write_variables(output_path: &Path, solution: &Solution) -> Result<()> {
    let file_path = output_path.join(VARIABLES_FILE_NAME);
    let mut writer = csv::Writer::from_path(&file_path)
        .with_context(|| format!("Could not create {}", file_path.display()))?;
    for (name, coord, value) in solution.iter_variables() {
        writer.serialize(VariableRow::new(name, coord, value))?;
    }
    writer.flush()?;

    Ok(())
}

/// Write `summary.toml`
pub fn write_summary(
    output_path: &Path,
    project_name: &str,
    solution: &Solution,
    num_constraints: usize,
) -> Result<()> {
    let summary = Summary {
        project: project_name,
        objective_value: solution.objective_value(),
        num_variables: solution.values().len(),
        num_constraints,
        max_constraint_violation: solution.max_violation(),
    };
    let file_path = output_path.join(SUMMARY_FILE_NAME);
    fs::write(&file_path, toml::to_string(&summary)?)
        .with_context(|| format!("Could not write {}", file_path.display()))?;

    Ok(())
}
