//! Constraints and named blocks of constraints.
use super::VarId;
use super::expression::LinExpr;
use crate::sets::Coord;
use std::ops::RangeInclusive;

/// The relational operator of a constraint
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum Relation {
    /// Left-hand side no greater than right-hand side
    #[strum(to_string = "<=")]
    LessEq,
    /// Both sides equal
    #[strum(to_string = "==")]
    Eq,
    /// Left-hand side no less than right-hand side
    #[strum(to_string = ">=")]
    GreaterEq,
}

/// A single linear (in)equality, normalised so that all variables are on the left
#[derive(Clone, Debug, PartialEq)]
pub struct Constraint {
    lhs: LinExpr,
    relation: Relation,
    rhs: f64,
}

impl Constraint {
    /// Create a constraint `lhs (relation) rhs`, moving variables left and constants right
    pub fn new(lhs: impl Into<LinExpr>, relation: Relation, rhs: impl Into<LinExpr>) -> Self {
        let expr = lhs.into() - rhs.into();
        let rhs = -expr.constant_value();
        let lhs = expr + rhs;

        Self { lhs, relation, rhs }
    }

    /// `lhs <= rhs`
    pub fn leq(lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) -> Self {
        Self::new(lhs, Relation::LessEq, rhs)
    }

    /// `lhs == rhs`
    pub fn equal(lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) -> Self {
        Self::new(lhs, Relation::Eq, rhs)
    }

    /// `lhs >= rhs`
    pub fn geq(lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) -> Self {
        Self::new(lhs, Relation::GreaterEq, rhs)
    }

    /// The variable side of the constraint
    pub fn lhs(&self) -> &LinExpr {
        &self.lhs
    }

    /// The constant right-hand side
    pub fn rhs(&self) -> f64 {
        self.rhs
    }

    /// The coefficient of `var` on the left-hand side
    pub fn coefficient(&self, var: VarId) -> f64 {
        self.lhs.coefficient(var)
    }

    /// The interval the left-hand side must lie in
    pub fn bounds(&self) -> RangeInclusive<f64> {
        match self.relation {
            Relation::LessEq => f64::NEG_INFINITY..=self.rhs,
            Relation::Eq => self.rhs..=self.rhs,
            Relation::GreaterEq => self.rhs..=f64::INFINITY,
        }
    }

    /// How far the given assignment is from satisfying the constraint (zero if satisfied)
    pub fn violation(&self, values: &[f64]) -> f64 {
        let lhs = self.lhs.evaluate(values);
        match self.relation {
            Relation::LessEq => (lhs - self.rhs).max(0.0),
            Relation::Eq => (lhs - self.rhs).abs(),
            Relation::GreaterEq => (self.rhs - lhs).max(0.0),
        }
    }
}

/// A named group of constraint rows, one per coordinate
#[derive(Clone, Debug, PartialEq)]
pub struct ConstraintBlock {
    name: String,
    rows: Vec<(Coord, Constraint)>,
}

impl ConstraintBlock {
    /// Create a block from its rows
    pub fn new(name: impl Into<String>, rows: impl IntoIterator<Item = (Coord, Constraint)>) -> Self {
        Self {
            name: name.into(),
            rows: rows.into_iter().collect(),
        }
    }

    /// The block's name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Iterate over the rows of the block
    pub fn rows(&self) -> impl Iterator<Item = (&Coord, &Constraint)> {
        self.rows.iter().map(|(coord, constraint)| (coord, constraint))
    }

    /// The row at `coord`, if any
    pub fn row(&self, coord: &Coord) -> Option<&Constraint> {
        self.rows
            .iter()
            .find(|(c, _)| c == coord)
            .map(|(_, constraint)| constraint)
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the block has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The constraint blocks produced by one builder, to be merged into a [`super::Problem`]
#[derive(Debug, Default)]
pub struct ConstraintBatch {
    blocks: Vec<ConstraintBlock>,
}

impl ConstraintBatch {
    /// Add a block of rows
    pub fn add(
        &mut self,
        name: impl Into<String>,
        rows: impl IntoIterator<Item = (Coord, Constraint)>,
    ) {
        self.blocks.push(ConstraintBlock::new(name, rows));
    }

    /// Iterate over the blocks
    pub fn blocks(&self) -> impl Iterator<Item = &ConstraintBlock> {
        self.blocks.iter()
    }

    /// Number of blocks in the batch
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl IntoIterator for ConstraintBatch {
    type Item = ConstraintBlock;
    type IntoIter = std::vec::IntoIter<ConstraintBlock>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_move_right() {
        let (x, y) = (VarId(0), VarId(1));
        let constraint = Constraint::leq(x + 3.0, 2.0 * y + 10.0);
        assert_eq!(constraint.rhs(), 7.0);
        assert_eq!(constraint.coefficient(x), 1.0);
        assert_eq!(constraint.coefficient(y), -2.0);
        assert_eq!(constraint.lhs().constant_value(), 0.0);
        assert_eq!(constraint.bounds(), f64::NEG_INFINITY..=7.0);
    }

    #[test]
    fn violation() {
        let x = VarId(0);
        let constraint = Constraint::geq(x, 5.0);
        assert_eq!(constraint.violation(&[6.0]), 0.0);
        assert_eq!(constraint.violation(&[4.0]), 1.0);
        assert_eq!(Constraint::equal(x, 5.0).violation(&[4.5]), 0.5);
    }
}
