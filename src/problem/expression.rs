//! Linear expressions over problem variables.
use super::VarId;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// A linear combination of variables plus a constant
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinExpr {
    terms: Vec<(VarId, f64)>,
    constant: f64,
}

impl LinExpr {
    /// An expression with a single term
    pub fn term(var: VarId, coeff: f64) -> Self {
        Self {
            terms: vec![(var, coeff)],
            constant: 0.0,
        }
    }

    /// A constant expression
    pub fn constant(value: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    /// The constant part of the expression
    pub fn constant_value(&self) -> f64 {
        self.constant
    }

    /// The raw terms, possibly with repeated variables
    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    /// The coefficient of `var`, summed over repeated terms
    pub fn coefficient(&self, var: VarId) -> f64 {
        self.terms
            .iter()
            .filter(|(v, _)| *v == var)
            .map(|(_, coeff)| coeff)
            .sum()
    }

    /// Terms with repeated variables merged and zero coefficients dropped, ordered by variable
    pub fn simplified_terms(&self) -> Vec<(VarId, f64)> {
        let mut terms = self.terms.clone();
        terms.sort_by_key(|(var, _)| *var);

        let mut out: Vec<(VarId, f64)> = Vec::with_capacity(terms.len());
        for (var, coeff) in terms {
            match out.last_mut() {
                Some((last, acc)) if *last == var => *acc += coeff,
                _ => out.push((var, coeff)),
            }
        }
        out.retain(|(_, coeff)| *coeff != 0.0);

        out
    }

    /// Evaluate the expression for the given column values
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.constant
            + self
                .terms
                .iter()
                .map(|(var, coeff)| coeff * values[var.index()])
                .sum::<f64>()
    }
}

impl From<VarId> for LinExpr {
    fn from(var: VarId) -> Self {
        Self::term(var, 1.0)
    }
}

impl From<f64> for LinExpr {
    fn from(value: f64) -> Self {
        Self::constant(value)
    }
}

impl<T: Into<LinExpr>> AddAssign<T> for LinExpr {
    fn add_assign(&mut self, rhs: T) {
        let rhs = rhs.into();
        self.terms.extend(rhs.terms);
        self.constant += rhs.constant;
    }
}

impl<T: Into<LinExpr>> SubAssign<T> for LinExpr {
    fn sub_assign(&mut self, rhs: T) {
        *self += -rhs.into();
    }
}

impl<T: Into<LinExpr>> Add<T> for LinExpr {
    type Output = LinExpr;

    fn add(mut self, rhs: T) -> LinExpr {
        self += rhs;
        self
    }
}

impl<T: Into<LinExpr>> Sub<T> for LinExpr {
    type Output = LinExpr;

    fn sub(mut self, rhs: T) -> LinExpr {
        self -= rhs;
        self
    }
}

impl Neg for LinExpr {
    type Output = LinExpr;

    fn neg(self) -> LinExpr {
        self * -1.0
    }
}

impl Mul<f64> for LinExpr {
    type Output = LinExpr;

    fn mul(mut self, rhs: f64) -> LinExpr {
        for (_, coeff) in &mut self.terms {
            *coeff *= rhs;
        }
        self.constant *= rhs;
        self
    }
}

impl Mul<LinExpr> for f64 {
    type Output = LinExpr;

    fn mul(self, rhs: LinExpr) -> LinExpr {
        rhs * self
    }
}

impl Mul<VarId> for f64 {
    type Output = LinExpr;

    fn mul(self, rhs: VarId) -> LinExpr {
        LinExpr::term(rhs, self)
    }
}

impl<T: Into<LinExpr>> Add<T> for VarId {
    type Output = LinExpr;

    fn add(self, rhs: T) -> LinExpr {
        LinExpr::from(self) + rhs
    }
}

impl<T: Into<LinExpr>> Sub<T> for VarId {
    type Output = LinExpr;

    fn sub(self, rhs: T) -> LinExpr {
        LinExpr::from(self) - rhs
    }
}

impl Sum for LinExpr {
    fn sum<I: Iterator<Item = LinExpr>>(iter: I) -> Self {
        iter.fold(LinExpr::default(), |acc, expr| acc + expr)
    }
}
