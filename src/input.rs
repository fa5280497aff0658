//! Common routines for handling input data.
use crate::project::{Project, ProjectConfig};
use crate::sets::IndexSets;
use anyhow::{Context, Result};
use indexmap::IndexSet;
use log::debug;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

pub mod parameter;
use parameter::read_parameters;

/// Parse a TOML file at the specified path.
///
/// # Arguments
///
/// * `file_path` - Path to the TOML file
///
/// # Returns
///
/// * The deserialised TOML data or an error if the file could not be read or parsed.
pub fn read_toml<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let toml_str = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
    let toml_data = toml::from_str(&toml_str).with_context(|| input_err_msg(file_path))?;
    Ok(toml_data)
}

/// Format an error message to include the file path
pub fn input_err_msg<P: AsRef<Path>>(file_path: P) -> String {
    format!("Error reading {}", file_path.as_ref().display())
}

/// Check whether an iterator contains values that are sorted and unique
pub fn is_sorted_and_unique<T, I>(iter: I) -> bool
where
    T: PartialOrd + Clone,
    I: IntoIterator<Item = T>,
{
    iter.into_iter()
        .collect::<Vec<_>>()
        .windows(2)
        .all(|w| w[0] < w[1])
}

/// Build the index sets described by a project file
pub fn build_index_sets(config: &ProjectConfig) -> Result<IndexSets> {
    let info = &config.project;
    let renewables: IndexSet<_> = config.renewable_ids().cloned().collect();
    let generators: IndexSet<_> = config.generator_ids().cloned().collect();

    IndexSets::new(
        info.scenarios,
        info.start_year,
        info.years,
        info.step_duration,
        info.periods,
        renewables,
        generators,
    )
}

/// Read a project from the specified directory.
///
/// # Arguments
///
/// * `project_dir` - Folder containing `project.toml` and `parameters.toml`
///
/// # Returns
///
/// The loaded [`Project`] or an error.
pub fn load_project<P: AsRef<Path>>(project_dir: P) -> Result<Project> {
    let project_dir = project_dir.as_ref();
    let config = ProjectConfig::from_path(project_dir)?;
    let sets = build_index_sets(&config)?;
    let parameters = read_parameters(project_dir, &sets)?;
    debug!(
        "Read {} parameter values for project {}",
        parameters.len(),
        config.project.name
    );

    Ok(Project {
        config,
        sets,
        parameters,
    })
}
