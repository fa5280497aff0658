//! A microgrid project: options, index sets and parameters.
use crate::parameter::ParameterTable;
use crate::sets::IndexSets;

pub mod config;
pub use config::{
    AdvancedOptions, BigMPolicy, GeneratorConfig, GridConnectionType, ProjectConfig,
    ProjectInfo, RenewableConfig, ResConnection, Technologies,
};

/// Everything needed to build a model for one project
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    /// Options from `project.toml`
    pub config: ProjectConfig,
    /// The index space
    pub sets: IndexSets,
    /// Values from `parameters.toml`
    pub parameters: ParameterTable,
}
