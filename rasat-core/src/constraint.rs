//! Polynomial constraints: a left-hand side compared against zero.

use rasat_math::polynomial::Sign;
use std::fmt;

use crate::pool::PolyId;

/// The six order relations against zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Relation {
    /// `lhs = 0`
    Eq,
    /// `lhs != 0`
    Neq,
    /// `lhs < 0`
    Less,
    /// `lhs <= 0`
    Leq,
    /// `lhs > 0`
    Greater,
    /// `lhs >= 0`
    Geq,
}

impl Relation {
    /// The relation of the negated constraint.
    #[must_use]
    pub fn negated(self) -> Self {
        match self {
            Relation::Eq => Relation::Neq,
            Relation::Neq => Relation::Eq,
            Relation::Less => Relation::Geq,
            Relation::Leq => Relation::Greater,
            Relation::Greater => Relation::Leq,
            Relation::Geq => Relation::Less,
        }
    }

    /// The relation equivalent to this one after negating the left-hand
    /// side.
    #[must_use]
    pub fn mirrored(self) -> Self {
        match self {
            Relation::Eq => Relation::Eq,
            Relation::Neq => Relation::Neq,
            Relation::Less => Relation::Greater,
            Relation::Leq => Relation::Geq,
            Relation::Greater => Relation::Less,
            Relation::Geq => Relation::Leq,
        }
    }

    /// Whether a left-hand side of the given sign satisfies the relation.
    #[must_use]
    pub fn holds_on(self, sign: Sign) -> bool {
        match self {
            Relation::Eq => sign == Sign::Zero,
            Relation::Neq => sign != Sign::Zero,
            Relation::Less => sign == Sign::Negative,
            Relation::Leq => sign != Sign::Positive,
            Relation::Greater => sign == Sign::Positive,
            Relation::Geq => sign != Sign::Negative,
        }
    }

    /// Whether the relation excludes equality.
    #[must_use]
    pub fn is_strict(self) -> bool {
        matches!(self, Relation::Neq | Relation::Less | Relation::Greater)
    }

    /// Whether the relation admits equality.
    #[must_use]
    pub fn is_weak(self) -> bool {
        !self.is_strict()
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Relation::Eq => "=",
            Relation::Neq => "!=",
            Relation::Less => "<",
            Relation::Leq => "<=",
            Relation::Greater => ">",
            Relation::Geq => ">=",
        };
        write!(f, "{s}")
    }
}

/// A canonical constraint `lhs ~ 0` with a pooled left-hand side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Constraint {
    /// Left-hand side polynomial.
    pub poly: PolyId,
    /// Comparison against zero.
    pub relation: Relation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negation_is_involutive() {
        for rel in [
            Relation::Eq,
            Relation::Neq,
            Relation::Less,
            Relation::Leq,
            Relation::Greater,
            Relation::Geq,
        ] {
            assert_eq!(rel.negated().negated(), rel);
            assert_eq!(rel.mirrored().mirrored(), rel);
        }
    }

    #[test]
    fn holds_on_signs() {
        assert!(Relation::Eq.holds_on(Sign::Zero));
        assert!(!Relation::Eq.holds_on(Sign::Positive));
        assert!(Relation::Leq.holds_on(Sign::Zero));
        assert!(Relation::Leq.holds_on(Sign::Negative));
        assert!(!Relation::Leq.holds_on(Sign::Positive));
        assert!(Relation::Neq.holds_on(Sign::Negative));
    }

    #[test]
    fn mirroring_swaps_direction() {
        assert_eq!(Relation::Less.mirrored(), Relation::Greater);
        assert_eq!(Relation::Geq.mirrored(), Relation::Leq);
        // A sign flip of the lhs turns p < 0 into -p > 0.
        assert!(Relation::Less.holds_on(Sign::Negative));
        assert!(Relation::Less.mirrored().holds_on(Sign::Positive));
    }
}
