//! Read and validate project options from `project.toml`.
//!
//! The file describes which technologies a microgrid has, how they are connected and which
//! optional model features are enabled. Numeric inputs live in `parameters.toml` instead.
use crate::id::{GeneratorID, RenewableID};
use crate::input::{input_err_msg, read_toml};
use anyhow::{Context, Result, ensure};
use itertools::Itertools;
use log::warn;
use serde::Deserialize;
use std::path::Path;

const PROJECT_FILE_NAME: &str = "project.toml";

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_param_default!(default_scenarios, u32, 1);
define_param_default!(default_step_duration, u32, 1);
define_param_default!(default_safety_margin, f64, 1.1);

/// Project options as defined in the `project.toml` file
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// The horizon and project-wide targets
    pub project: ProjectInfo,
    /// Which optional technologies are present
    #[serde(default)]
    pub technologies: Technologies,
    /// Formulation options
    #[serde(default)]
    pub advanced: AdvancedOptions,
    /// Renewable sources
    pub renewables: Vec<RenewableConfig>,
    /// Generator types
    #[serde(default)]
    pub generators: Vec<GeneratorConfig>,
}

/// The `[project]` table
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProjectInfo {
    /// Human-readable name of the project
    pub name: String,
    /// Number of scenarios
    #[serde(default = "default_scenarios")]
    pub scenarios: u32,
    /// First year of the horizon
    pub start_year: u32,
    /// Number of years in the horizon
    pub years: u32,
    /// Number of years in each investment step
    #[serde(default = "default_step_duration")]
    pub step_duration: u32,
    /// Number of periods in each year
    pub periods: u32,
    /// Fraction of demand which may go unmet. Zero disables lost load.
    #[serde(default)]
    pub lost_load_fraction: f64,
    /// Cost per unit of unmet demand
    #[serde(default)]
    pub lost_load_specific_cost: f64,
    /// Minimum share of renewable energy. Zero disables the target.
    #[serde(default)]
    pub renewable_penetration: f64,
    /// Land available for renewables. Zero means unlimited.
    #[serde(default)]
    pub land_availability: f64,
}

/// The `[technologies]` table
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Technologies {
    /// Whether the microgrid has a battery bank
    pub battery: bool,
    /// Whether the microgrid has generators
    pub generator: bool,
    /// Whether the microgrid is connected to the national grid
    pub grid_connection: bool,
}

/// The `[advanced]` table
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AdvancedOptions {
    /// Size technologies in whole units of nominal capacity
    pub unit_commitment: bool,
    /// Add binary variables preventing simultaneous flows in both directions
    pub milp_formulation: bool,
    /// Account for existing conversion devices and their remaining lifetime
    pub brownfield: bool,
    /// Track CO2 emissions and add them to the objective
    pub multiobjective_optimization: bool,
    /// Cost attached to each unit of emitted CO2 when emissions are tracked
    pub emission_cost_weight: f64,
    /// Whether energy can be sold to the grid
    pub grid_connection_type: GridConnectionType,
    /// Allow generators to run below full load
    pub partial_load: bool,
    /// How big-M constants are chosen
    pub big_m: BigMPolicy,
}

/// How the microgrid trades with the grid
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GridConnectionType {
    /// Energy can only be bought
    #[default]
    PurchaseOnly,
    /// Energy can be bought and sold
    PurchaseSell,
}

/// How a renewable source is connected to the AC bus
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResConnection {
    /// The source has its own inverter
    #[default]
    OwnInverter,
    /// The source is DC-coupled to the battery and shares its inverter
    SharedBatteryInverter,
}

/// How big-M constants for flow exclusivity are chosen
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum BigMPolicy {
    /// Derive M from the largest physically achievable flow, times a safety margin
    CapacityDerived {
        /// Multiplier applied to the physical maximum
        #[serde(default = "default_safety_margin")]
        safety_margin: f64,
    },
    /// Use the same constant everywhere
    Fixed {
        /// The constant
        value: f64,
    },
}

impl Default for BigMPolicy {
    fn default() -> Self {
        Self::CapacityDerived {
            safety_margin: default_safety_margin(),
        }
    }
}

/// A `[[renewables]]` entry
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RenewableConfig {
    /// Unique ID of the source
    pub id: RenewableID,
    /// How the source reaches the AC bus
    #[serde(default)]
    pub connection: ResConnection,
}

/// A `[[generators]]` entry
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Unique ID of the generator type
    pub id: GeneratorID,
}

/// Check that a parameter is a proportion in [0, 1)
fn check_proportion(name: &str, value: f64) -> Result<()> {
    ensure!(
        (0.0..1.0).contains(&value),
        "{name} must be at least zero and less than one"
    );

    Ok(())
}

/// Check that a parameter is finite and not negative
fn check_non_negative(name: &str, value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && value >= 0.0,
        "{name} must be a finite number greater than or equal to zero"
    );

    Ok(())
}

/// Check that the IDs are unique
fn check_unique_ids<'a>(kind: &str, ids: impl IntoIterator<Item = &'a str>) -> Result<()> {
    let duplicates = ids.into_iter().duplicates().collect_vec();
    ensure!(
        duplicates.is_empty(),
        "Duplicate {kind} IDs: {}",
        duplicates.join(", ")
    );

    Ok(())
}

/// Check that DC-coupled sources have a battery to couple to
fn check_renewable_connections(renewables: &[RenewableConfig], has_battery: bool) -> Result<()> {
    for renewable in renewables {
        ensure!(
            has_battery || renewable.connection == ResConnection::OwnInverter,
            "Renewable source {} shares the battery inverter, but the project has no battery",
            renewable.id
        );
    }

    Ok(())
}

/// Check that partial load operation has what it needs
fn check_partial_load(advanced: &AdvancedOptions, has_generator: bool) -> Result<()> {
    if advanced.partial_load {
        ensure!(
            has_generator,
            "partial_load requires the project to have generators"
        );
        ensure!(
            advanced.unit_commitment,
            "partial_load requires unit_commitment to be enabled"
        );
    }

    Ok(())
}

/// Check that the big-M policy is usable
fn check_big_m(policy: BigMPolicy) -> Result<()> {
    match policy {
        BigMPolicy::CapacityDerived { safety_margin } => ensure!(
            safety_margin.is_finite() && safety_margin >= 1.0,
            "big_m safety_margin must be a finite number of at least one"
        ),
        BigMPolicy::Fixed { value } => ensure!(
            value.is_finite() && value > 0.0,
            "big_m value must be a finite number greater than zero"
        ),
    }

    Ok(())
}

impl ProjectConfig {
    /// Read the project file from the specified directory.
    ///
    /// # Arguments
    ///
    /// * `project_dir` - Folder containing project files
    ///
    /// # Returns
    ///
    /// The file contents as a [`ProjectConfig`] or an error if the file is invalid
    pub fn from_path<P: AsRef<Path>>(project_dir: P) -> Result<ProjectConfig> {
        let file_path = project_dir.as_ref().join(PROJECT_FILE_NAME);
        let config: ProjectConfig = read_toml(&file_path)?;
        config
            .validate()
            .with_context(|| input_err_msg(file_path))?;

        Ok(config)
    }

    /// Validate options after reading in file
    fn validate(&self) -> Result<()> {
        let project = &self.project;
        check_proportion("lost_load_fraction", project.lost_load_fraction)?;
        check_proportion("renewable_penetration", project.renewable_penetration)?;
        check_non_negative("lost_load_specific_cost", project.lost_load_specific_cost)?;
        check_non_negative("land_availability", project.land_availability)?;
        check_non_negative("emission_cost_weight", self.advanced.emission_cost_weight)?;

        ensure!(
            !self.renewables.is_empty(),
            "At least one renewable source must be defined"
        );
        check_unique_ids("renewable", self.renewables.iter().map(|r| r.id.as_str()))?;
        check_unique_ids("generator", self.generators.iter().map(|g| g.id.as_str()))?;
        check_renewable_connections(&self.renewables, self.technologies.battery)?;

        if self.technologies.generator {
            ensure!(
                !self.generators.is_empty(),
                "Generators are enabled but no generator types are defined"
            );
        } else if !self.generators.is_empty() {
            warn!("Generator types are defined but generators are disabled; they will be ignored");
        }

        check_partial_load(&self.advanced, self.technologies.generator)?;
        check_big_m(self.advanced.big_m)?;

        if self.advanced.emission_cost_weight > 0.0 && !self.advanced.multiobjective_optimization {
            warn!("emission_cost_weight has no effect unless multiobjective_optimization is enabled");
        }

        Ok(())
    }

    /// IDs of the renewable sources in declaration order
    pub fn renewable_ids(&self) -> impl Iterator<Item = &RenewableID> {
        self.renewables.iter().map(|r| &r.id)
    }

    /// IDs of the active generator types in declaration order
    pub fn generator_ids(&self) -> impl Iterator<Item = &GeneratorID> {
        self.generators
            .iter()
            .filter(|_| self.technologies.generator)
            .map(|g| &g.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, project_config};
    use rstest::rstest;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[rstest]
    #[case(0.0, true)]
    #[case(0.5, true)]
    #[case(1.0, false)]
    #[case(-0.1, false)]
    #[case(f64::NAN, false)]
    fn check_proportion_works(#[case] value: f64, #[case] valid: bool) {
        assert_eq!(check_proportion("x", value).is_ok(), valid);
    }

    #[rstest]
    #[case(BigMPolicy::default(), true)]
    #[case(BigMPolicy::CapacityDerived { safety_margin: 0.9 }, false)]
    #[case(BigMPolicy::Fixed { value: 1e9 }, true)]
    #[case(BigMPolicy::Fixed { value: 0.0 }, false)]
    #[case(BigMPolicy::Fixed { value: f64::INFINITY }, false)]
    fn check_big_m_works(#[case] policy: BigMPolicy, #[case] valid: bool) {
        assert_eq!(check_big_m(policy).is_ok(), valid);
    }

    #[test]
    fn check_unique_ids_works() {
        check_unique_ids("renewable", ["PV", "Wind"]).unwrap();
        assert_error!(
            check_unique_ids("renewable", ["PV", "Wind", "PV"]),
            "Duplicate renewable IDs: PV"
        );
    }

    #[rstest]
    fn shared_inverter_needs_battery(mut project_config: ProjectConfig) {
        project_config.technologies.battery = false;
        project_config.renewables[0].connection = ResConnection::SharedBatteryInverter;
        assert_error!(
            project_config.validate(),
            "Renewable source PV shares the battery inverter, but the project has no battery"
        );
    }

    #[rstest]
    fn partial_load_needs_unit_commitment(mut project_config: ProjectConfig) {
        project_config.technologies.generator = true;
        project_config.generators = vec![GeneratorConfig { id: "Diesel".into() }];
        project_config.advanced.partial_load = true;
        assert_error!(
            project_config.validate(),
            "partial_load requires unit_commitment to be enabled"
        );

        project_config.advanced.unit_commitment = true;
        project_config.validate().unwrap();
    }

    #[test]
    fn project_config_from_path() {
        let dir = tempdir().unwrap();
        {
            let mut file = File::create(dir.path().join(PROJECT_FILE_NAME)).unwrap();
            write!(
                file,
                r#"
[project]
name = "Test"
start_year = 2025
years = 10
step_duration = 5
periods = 24
lost_load_fraction = 0.05

[technologies]
battery = true

[advanced]
grid_connection_type = "purchase_sell"
big_m = {{ policy = "fixed", value = 1e6 }}

[[renewables]]
id = "PV"
connection = "shared_battery_inverter"
"#
            )
            .unwrap();
        }

        let config = ProjectConfig::from_path(dir.path()).unwrap();
        assert_eq!(config.project.scenarios, 1);
        assert_eq!(config.project.step_duration, 5);
        assert_eq!(
            config.advanced.grid_connection_type,
            GridConnectionType::PurchaseSell
        );
        assert_eq!(config.advanced.big_m, BigMPolicy::Fixed { value: 1e6 });
        assert_eq!(
            config.renewables[0].connection,
            ResConnection::SharedBatteryInverter
        );
        assert_eq!(config.generator_ids().count(), 0);
    }
}
