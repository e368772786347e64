//! Satisfying assignments.

use rasat_math::eval::{self, EvalError};
use rasat_math::polynomial::Sign;
use rasat_math::{Polynomial, RealAlgebraicNumber, RealAssignment, Var};
use std::fmt;

use crate::constraint::Relation;

/// A (partial) assignment of variables to exact real values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    values: RealAssignment,
}

impl Model {
    /// An empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value of a variable.
    pub fn assign(&mut self, var: Var, value: RealAlgebraicNumber) {
        self.values.insert(var, value);
    }

    /// Remove the value of a variable.
    pub fn unassign(&mut self, var: Var) {
        self.values.remove(&var);
    }

    /// The value of a variable, if assigned.
    pub fn get(&self, var: Var) -> Option<&RealAlgebraicNumber> {
        self.values.get(&var)
    }

    /// Whether a variable is assigned.
    pub fn contains(&self, var: Var) -> bool {
        self.values.contains_key(&var)
    }

    /// Number of assigned variables.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no variable is assigned.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The underlying assignment map.
    pub fn assignment(&self) -> &RealAssignment {
        &self.values
    }

    /// Iterate over `(variable, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Var, &RealAlgebraicNumber)> {
        self.values.iter()
    }

    /// Exact sign of a polynomial under this model.
    pub fn sign_of(&self, poly: &Polynomial) -> Result<Sign, EvalError> {
        eval::sign_at(poly, &self.values)
    }

    /// Whether `poly ~ 0` holds under this model.
    pub fn satisfies(&self, poly: &Polynomial, relation: Relation) -> Result<bool, EvalError> {
        Ok(relation.holds_on(self.sign_of(poly)?))
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<(&Var, &RealAlgebraicNumber)> = self.values.iter().collect();
        entries.sort_by_key(|(v, _)| **v);
        write!(f, "{{")?;
        for (k, (var, value)) in entries.iter().enumerate() {
            if k > 0 {
                write!(f, ", ")?;
            }
            write!(f, "x{var} -> {value}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;
    use num_rational::BigRational;

    fn q(n: i64) -> BigRational {
        BigRational::from_integer(BigInt::from(n))
    }

    #[test]
    fn assign_and_satisfy() {
        let mut model = Model::new();
        model.assign(0, RealAlgebraicNumber::from_int(3));
        // x - 2 > 0 holds at x = 3.
        let p = &Polynomial::variable(0) - &Polynomial::constant(q(2));
        assert_eq!(model.satisfies(&p, Relation::Greater), Ok(true));
        assert_eq!(model.satisfies(&p, Relation::Less), Ok(false));
    }

    #[test]
    fn missing_variable_is_an_error() {
        let model = Model::new();
        let p = Polynomial::variable(7);
        assert!(model.sign_of(&p).is_err());
    }
}
