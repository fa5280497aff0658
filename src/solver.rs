//! Hand an assembled [`Problem`] to a solver and read back the solution.
use crate::log::is_logging_disabled;
use crate::problem::{LinExpr, Problem, VarId};
use crate::sets::Coord;
use highs::{HighsModelStatus, HighsStatus, RowProblem, Sense};
use indexmap::IndexMap;
use log::{debug, info};
use std::error::Error;
use std::fmt;

/// A solver outcome that is not a usable solution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    /// No assignment satisfies every constraint
    Infeasible,
    /// The objective can decrease without limit
    Unbounded,
    /// The solver could not tell infeasible and unbounded problems apart
    InfeasibleOrUnbounded,
    /// The time limit was reached before an optimal solution was proven
    TimedOut,
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            TerminalStatus::Infeasible => "the model is infeasible",
            TerminalStatus::Unbounded => "the model is unbounded",
            TerminalStatus::InfeasibleOrUnbounded => "the model is infeasible or unbounded",
            TerminalStatus::TimedOut => "the solver reached its time limit",
        };
        write!(f, "{msg}")
    }
}

/// Defines the possible errors that can occur when running the solver
#[derive(Debug, Clone)]
pub enum SolveError {
    /// The solver finished without an optimal solution
    Terminal(TerminalStatus),
    /// The backend rejected the model or stopped for an unexpected reason.
    ///
    /// Users should not be able to trigger this error.
    Backend(String),
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveError::Terminal(status) => write!(f, "No solution found: {status}"),
            SolveError::Backend(msg) => write!(f, "Solver error: {msg}"),
        }
    }
}

impl Error for SolveError {}

/// The solution of a problem
#[derive(Debug)]
pub struct Solution<'a> {
    problem: &'a Problem,
    values: Vec<f64>,
    objective_value: f64,
}

impl<'a> Solution<'a> {
    /// Create a solution from one value per column
    pub fn new(problem: &'a Problem, values: Vec<f64>) -> Self {
        assert_eq!(
            values.len(),
            problem.num_columns(),
            "Solution must have one value per column"
        );
        let objective_value = problem.objective().evaluate(&values);

        Self {
            problem,
            values,
            objective_value,
        }
    }

    /// The value of the objective
    pub fn objective_value(&self) -> f64 {
        self.objective_value
    }

    /// The value of a column
    pub fn value(&self, var: VarId) -> f64 {
        self.values[var.index()]
    }

    /// The values of every column, in column order
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Evaluate a linear expression
    pub fn evaluate(&self, expr: &LinExpr) -> f64 {
        expr.evaluate(&self.values)
    }

    /// The solved values of a variable family, by coordinate, or `None` if no such family exists
    pub fn variable(&self, name: &str) -> Option<IndexMap<Coord, f64>> {
        let family = self.problem.family(name)?;
        Some(
            family
                .columns
                .iter()
                .map(|(coord, var)| (coord.clone(), self.value(*var)))
                .collect(),
        )
    }

    /// Iterate over every variable family and its solved values
    pub fn iter_variables(&self) -> impl Iterator<Item = (&'static str, &Coord, f64)> {
        self.problem.families().flat_map(move |(name, family)| {
            family
                .columns
                .iter()
                .map(move |(coord, var)| (name, coord, self.value(*var)))
        })
    }

    /// The largest violation of any constraint or bound by this solution
    pub fn max_violation(&self) -> f64 {
        self.problem.max_violation(&self.values)
    }
}

/// Something that can solve a [`Problem`]
pub trait SolverBackend {
    /// Solve the problem, minimising its objective
    fn solve<'a>(&self, problem: &'a Problem) -> Result<Solution<'a>, SolveError>;
}

/// Options for the HiGHS solver
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HighsBackend {
    /// Maximum time to spend solving, in seconds
    pub time_limit: Option<f64>,
    /// Relative gap at which a MILP is considered solved
    pub mip_relative_gap: Option<f64>,
    /// Whether HiGHS prints its own output to the console
    pub output: bool,
}

impl HighsBackend {
    /// Convert a problem into HiGHS's representation
    fn to_highs(problem: &Problem) -> RowProblem {
        let mut costs = vec![0.0; problem.num_columns()];
        for (var, coeff) in problem.objective().simplified_terms() {
            costs[var.index()] = coeff;
        }

        let mut highs_problem = RowProblem::default();
        let columns: Vec<_> = problem
            .domains()
            .iter()
            .zip(costs)
            .map(|(domain, cost)| {
                if domain.is_integer() {
                    highs_problem.add_integer_column(cost, domain.bounds())
                } else {
                    highs_problem.add_column(cost, domain.bounds())
                }
            })
            .collect();

        for block in problem.constraints() {
            for (_, constraint) in block.rows() {
                let terms = constraint
                    .lhs()
                    .simplified_terms()
                    .into_iter()
                    .map(|(var, coeff)| (columns[var.index()], coeff));
                highs_problem.add_row(constraint.bounds(), terms);
            }
        }

        highs_problem
    }
}

impl SolverBackend for HighsBackend {
    fn solve<'a>(&self, problem: &'a Problem) -> Result<Solution<'a>, SolveError> {
        info!(
            "Solving problem with {} columns and {} rows",
            problem.num_columns(),
            problem.num_rows()
        );

        let mut model = Self::to_highs(problem).optimise(Sense::Minimise);
        if self.output && !is_logging_disabled() {
            model.set_option("log_to_console", true);
            model.set_option("output_flag", true);
        } else {
            model.set_option("output_flag", false);
        }
        if let Some(time_limit) = self.time_limit {
            model.set_option("time_limit", time_limit);
        }
        if let Some(gap) = self.mip_relative_gap {
            model.set_option("mip_rel_gap", gap);
        }

        let solved = model.try_solve().map_err(|status: HighsStatus| {
            SolveError::Backend(format!("Incoherent model: {status:?}"))
        })?;
        let terminal = match solved.status() {
            HighsModelStatus::Optimal => None,
            HighsModelStatus::Infeasible => Some(TerminalStatus::Infeasible),
            HighsModelStatus::Unbounded => Some(TerminalStatus::Unbounded),
            HighsModelStatus::UnboundedOrInfeasible => {
                Some(TerminalStatus::InfeasibleOrUnbounded)
            }
            HighsModelStatus::ReachedTimeLimit => Some(TerminalStatus::TimedOut),
            status => {
                return Err(SolveError::Backend(format!(
                    "Could not find optimal result: {status:?}"
                )));
            }
        };
        if let Some(status) = terminal {
            return Err(SolveError::Terminal(status));
        }

        let values = solved.get_solution().columns().to_vec();
        let solution = Solution::new(problem, values);
        debug!(
            "Objective value: {}; largest constraint violation: {:e}",
            solution.objective_value(),
            solution.max_violation()
        );

        Ok(solution)
    }
}
