//! Formulation of the capacity-expansion and dispatch problem.
//!
//! A build runs in a fixed order: resolve the [`Topology`], declare every variable in the
//! [`VariableRegistry`], run each constraint builder (each returns a [`ConstraintBatch`] which is
//! merged into the [`Problem`]) and finally assemble the objective.
use crate::parameter::{Param, ParameterTable};
use crate::problem::{Constraint, ConstraintBatch, Problem};
use crate::project::Project;
use crate::sets::{Coord, IndexSets, Key};
use crate::topology::Topology;
use log::{debug, info};
use std::error::Error;
use std::fmt;

mod big_m;
mod capacity;
mod dispatch;
mod emissions;
mod energy_balance;
mod existing;
mod lost_load;
mod objective;
mod penetration;
mod transformation;
pub mod variables;
pub use variables::VariableRegistry;

/// An error raised while building a model.
///
/// All of these abort the build before anything reaches the solver.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
    /// A parameter needed by an enabled feature has no value at the coordinate
    MissingParameter {
        /// The parameter
        param: Param,
        /// Where it was looked up
        coord: Coord,
    },
    /// A parameter has a value which cannot be used
    InvalidParameter {
        /// The parameter
        param: Param,
        /// Where it was looked up
        coord: Coord,
        /// What is wrong with it
        reason: &'static str,
    },
    /// A builder referenced a variable which was not declared
    MissingVariable {
        /// The variable family
        name: &'static str,
        /// The requested coordinate
        coord: Coord,
    },
    /// Two variable families share a name
    DuplicateVariable(&'static str),
    /// Two constraint blocks share a name
    DuplicateConstraint(String),
    /// The declared variables don't match the resolved topology
    TopologyMismatch(String),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::MissingParameter { param, coord } => {
                write!(f, "Missing value for parameter {param} at ({coord})")
            }
            BuildError::InvalidParameter {
                param,
                coord,
                reason,
            } => write!(f, "Invalid value for parameter {param} at ({coord}): {reason}"),
            BuildError::MissingVariable { name, coord } => {
                write!(f, "Variable \"{name}\" is not declared at ({coord})")
            }
            BuildError::DuplicateVariable(name) => {
                write!(f, "Variable \"{name}\" is declared more than once")
            }
            BuildError::DuplicateConstraint(name) => {
                write!(f, "Constraint \"{name}\" is declared more than once")
            }
            BuildError::TopologyMismatch(message) => write!(f, "Topology mismatch: {message}"),
        }
    }
}

impl Error for BuildError {}

/// Everything a constraint builder may read
pub struct BuildContext<'a> {
    /// The index space
    pub sets: &'a IndexSets,
    /// Parameter values
    pub params: &'a ParameterTable,
    /// The resolved configuration
    pub topology: &'a Topology,
    /// The declared variables
    pub vars: &'a VariableRegistry,
}

/// A fully built model, ready to be solved
#[derive(Debug)]
pub struct MicrogridModel {
    /// The configuration the model was built for
    pub topology: Topology,
    /// Handles to every declared variable
    pub variables: VariableRegistry,
    /// The assembled problem
    pub problem: Problem,
}

/// Build one constraint row per key, stopping at the first error
fn build_rows<K: Key>(
    keys: impl IntoIterator<Item = K>,
    mut row: impl FnMut(&K) -> Result<Constraint, BuildError>,
) -> Result<Vec<(Coord, Constraint)>, BuildError> {
    keys.into_iter()
        .map(|key| Ok((key.coord(), row(&key)?)))
        .collect()
}

type Builder = fn(&BuildContext) -> Result<ConstraintBatch, BuildError>;

/// The constraint builders, in the order they run
const BUILDERS: [(&str, Builder); 8] = [
    ("energy balance", energy_balance::build),
    ("transformation sizing", transformation::build),
    ("renewable penetration", penetration::build),
    ("lost load", lost_load::build),
    ("capacity", capacity::build),
    ("dispatch", dispatch::build),
    ("emissions", emissions::build),
    ("flow exclusivity", dispatch::build_single_flow),
];

/// Build the optimisation model for a project.
///
/// # Arguments
///
/// * `project` - The loaded project
///
/// # Returns
///
/// The built [`MicrogridModel`] or the first error encountered.
pub fn build_model(project: &Project) -> Result<MicrogridModel, BuildError> {
    let topology = Topology::resolve(&project.config);
    let mut problem = Problem::default();
    let variables = VariableRegistry::declare(&mut problem, &project.sets, &topology)?;
    debug!(
        "Declared {} variables in {} families",
        problem.num_columns(),
        problem.families().count()
    );

    let ctx = BuildContext {
        sets: &project.sets,
        params: &project.parameters,
        topology: &topology,
        vars: &variables,
    };
    for (label, builder) in BUILDERS {
        let batch = builder(&ctx)?;
        debug!("Adding {} {label} constraint blocks", batch.len());
        problem.merge(batch)?;
    }
    problem.set_objective(objective::build(&ctx)?);

    info!(
        "Built model for {} with {} columns and {} rows",
        project.config.project.name,
        problem.num_columns(),
        problem.num_rows()
    );

    Ok(MicrogridModel {
        topology,
        variables,
        problem,
    })
}
