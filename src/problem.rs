//! The model accumulator: variables, constraints and the objective of one model build.
//!
//! Variables are declared in named families, each with a single domain and one column per
//! coordinate. Constraints arrive as [`ConstraintBatch`]es from the builders and are merged under
//! unique names. The accumulated problem is solver-agnostic; see [`crate::solver`] for the
//! translation to a concrete backend.
use crate::formulation::BuildError;
use crate::sets::{Coord, Key};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::ops::RangeInclusive;

pub mod constraint;
pub mod expression;
pub use constraint::{Constraint, ConstraintBatch, ConstraintBlock, Relation};
pub use expression::LinExpr;

/// A column of the problem.
///
/// Note that this type does **not** include the value of the variable; it just refers to a
/// particular column of the problem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    /// The column index
    pub fn index(self) -> usize {
        self.0
    }
}

/// The set of values a variable may take
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum Domain {
    /// Continuous, non-negative
    NonNegative,
    /// Continuous, unbounded
    Free,
    /// Integer, non-negative
    NonNegativeInteger,
    /// Zero or one
    Binary,
}

impl Domain {
    /// The bounds implied by the domain
    pub fn bounds(self) -> RangeInclusive<f64> {
        match self {
            Domain::NonNegative | Domain::NonNegativeInteger => 0.0..=f64::INFINITY,
            Domain::Free => f64::NEG_INFINITY..=f64::INFINITY,
            Domain::Binary => 0.0..=1.0,
        }
    }

    /// Whether values are restricted to integers
    pub fn is_integer(self) -> bool {
        matches!(self, Domain::NonNegativeInteger | Domain::Binary)
    }
}

/// A typed handle to a declared family of variables
#[derive(Clone, Debug, PartialEq)]
pub struct VarArray<K: Key> {
    name: &'static str,
    vars: IndexMap<K, VarId>,
}

impl<K: Key> VarArray<K> {
    /// The variable at `key`.
    ///
    /// Asking for a key outside the declared coordinates is a schema error.
    pub fn get(&self, key: &K) -> Result<VarId, BuildError> {
        self.vars
            .get(key)
            .copied()
            .ok_or_else(|| BuildError::MissingVariable {
                name: self.name,
                coord: key.coord(),
            })
    }

    /// Iterate over keys and variables in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&K, VarId)> {
        self.vars.iter().map(|(key, var)| (key, *var))
    }

    /// Number of variables in the family
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the family is empty
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Metadata for a declared family of variables
#[derive(Clone, Debug, PartialEq)]
pub struct VariableFamily {
    /// The family's domain
    pub domain: Domain,
    /// Columns by coordinate
    pub columns: IndexMap<Coord, VarId>,
}

/// The optimisation problem being assembled
#[derive(Debug, Default)]
pub struct Problem {
    domains: Vec<Domain>,
    families: IndexMap<&'static str, VariableFamily>,
    constraints: IndexMap<String, ConstraintBlock>,
    objective: LinExpr,
}

impl Problem {
    /// Declare a family of variables, one per key.
    ///
    /// # Arguments
    ///
    /// * `name` - Unique name of the family
    /// * `domain` - Domain shared by every variable of the family
    /// * `keys` - The coordinates to create variables for
    ///
    /// # Returns
    ///
    /// A typed handle to the new variables, or an error if the name is already taken.
    pub fn add_variables<K: Key>(
        &mut self,
        name: &'static str,
        domain: Domain,
        keys: impl IntoIterator<Item = K>,
    ) -> Result<VarArray<K>, BuildError> {
        if self.families.contains_key(name) {
            return Err(BuildError::DuplicateVariable(name));
        }

        let mut vars = IndexMap::new();
        let mut columns = IndexMap::new();
        for key in keys {
            let var = VarId(self.domains.len());
            self.domains.push(domain);
            columns.insert(key.coord(), var);
            let existing = vars.insert(key, var).is_some();
            assert!(!existing, "Duplicate entry for variable {name}");
        }
        self.families
            .insert(name, VariableFamily { domain, columns });

        Ok(VarArray { name, vars })
    }

    /// Merge a builder's constraints into the problem.
    ///
    /// Fails without modifying the problem if any block name is already present.
    pub fn merge(&mut self, batch: ConstraintBatch) -> Result<(), BuildError> {
        let mut seen = HashSet::new();
        for block in batch.blocks() {
            if self.constraints.contains_key(block.name()) || !seen.insert(block.name()) {
                return Err(BuildError::DuplicateConstraint(block.name().to_string()));
            }
        }

        for block in batch {
            self.constraints.insert(block.name().to_string(), block);
        }

        Ok(())
    }

    /// Set the expression to be minimised
    pub fn set_objective(&mut self, objective: LinExpr) {
        self.objective = objective;
    }

    /// The expression to be minimised
    pub fn objective(&self) -> &LinExpr {
        &self.objective
    }

    /// The domain of every column, in column order
    pub fn domains(&self) -> &[Domain] {
        &self.domains
    }

    /// Number of columns
    pub fn num_columns(&self) -> usize {
        self.domains.len()
    }

    /// Number of constraint rows
    pub fn num_rows(&self) -> usize {
        self.constraints.values().map(ConstraintBlock::len).sum()
    }

    /// Look up a variable family by name
    pub fn family(&self, name: &str) -> Option<&VariableFamily> {
        self.families.get(name)
    }

    /// Iterate over variable families in declaration order
    pub fn families(&self) -> impl Iterator<Item = (&'static str, &VariableFamily)> {
        self.families.iter().map(|(name, family)| (*name, family))
    }

    /// Look up a constraint block by name
    pub fn constraint(&self, name: &str) -> Option<&ConstraintBlock> {
        self.constraints.get(name)
    }

    /// Iterate over constraint blocks in insertion order
    pub fn constraints(&self) -> impl Iterator<Item = &ConstraintBlock> {
        self.constraints.values()
    }

    /// The largest violation of any constraint or domain bound by the given column values
    pub fn max_violation(&self, values: &[f64]) -> f64 {
        let rows = self
            .constraints()
            .flat_map(|block| block.rows())
            .map(|(_, constraint)| constraint.violation(values));
        let bounds = self.domains.iter().zip(values).map(|(domain, value)| {
            let bounds = domain.bounds();
            (bounds.start() - value).max(value - bounds.end()).max(0.0)
        });

        rows.chain(bounds).fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sets::{Scenario, Step};

    #[test]
    fn add_variables_assigns_consecutive_columns() {
        let mut problem = Problem::default();
        let a = problem
            .add_variables("A", Domain::NonNegative, [Step(1), Step(2)])
            .unwrap();
        let b = problem
            .add_variables("B", Domain::Binary, [Scenario(0)])
            .unwrap();

        assert_eq!(a.get(&Step(2)).unwrap(), VarId(1));
        assert_eq!(b.get(&Scenario(0)).unwrap(), VarId(2));
        assert_eq!(problem.num_columns(), 3);
        assert_eq!(problem.family("B").unwrap().domain, Domain::Binary);
        assert_eq!(
            a.get(&Step(3)),
            Err(BuildError::MissingVariable {
                name: "A",
                coord: Step(3).coord()
            })
        );
    }

    #[test]
    fn duplicate_variable_name() {
        let mut problem = Problem::default();
        problem
            .add_variables("A", Domain::Free, [Step(1)])
            .unwrap();
        assert_eq!(
            problem.add_variables("A", Domain::Free, [Step(2)]),
            Err(BuildError::DuplicateVariable("A"))
        );
    }

    #[test]
    fn duplicate_constraint_name() {
        let mut problem = Problem::default();
        let x = problem
            .add_variables("X", Domain::NonNegative, [()])
            .unwrap()
            .get(&())
            .unwrap();

        let mut batch = ConstraintBatch::default();
        batch.add("Limit", [(Coord::default(), Constraint::leq(x, 1.0))]);
        problem.merge(batch).unwrap();

        let mut batch = ConstraintBatch::default();
        batch.add("Other", [(Coord::default(), Constraint::geq(x, 0.5))]);
        batch.add("Limit", [(Coord::default(), Constraint::leq(x, 2.0))]);
        assert_eq!(
            problem.merge(batch),
            Err(BuildError::DuplicateConstraint("Limit".into()))
        );

        // Nothing from the rejected batch is kept
        assert!(problem.constraint("Other").is_none());
        assert_eq!(problem.num_rows(), 1);
    }

    #[test]
    fn max_violation_checks_rows_and_bounds() {
        let mut problem = Problem::default();
        let vars = problem
            .add_variables("X", Domain::Binary, [Step(1), Step(2)])
            .unwrap();
        let (x1, x2) = (vars.get(&Step(1)).unwrap(), vars.get(&Step(2)).unwrap());
        let mut batch = ConstraintBatch::default();
        batch.add("Sum", [(Coord::default(), Constraint::equal(x1 + x2, 1.0))]);
        problem.merge(batch).unwrap();

        assert_eq!(problem.max_violation(&[1.0, 0.0]), 0.0);
        assert_eq!(problem.max_violation(&[1.0, 1.0]), 1.0);
        assert_eq!(problem.max_violation(&[1.5, -0.5]), 0.5);
    }
}
