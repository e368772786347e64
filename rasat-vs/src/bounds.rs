//! Variable bounds derived from univariate linear conditions.
//!
//! Bounds are used to prune test candidates that fall outside the
//! feasible box and to detect immediate conflicts between opposing
//! bounds. A widened `f64` image of the bounds is kept for heuristic
//! ordering only; every pruning decision is validated against the exact
//! rational bounds before it takes effect.

use num_rational::BigRational;
use num_traits::ToPrimitive;
use rasat_core::Bitset;
use rasat_math::Var;
use rustc_hash::FxHashMap;

/// One directed bound with its origin set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound {
    /// The bounding value.
    pub value: BigRational,
    /// Whether the bound excludes the value itself.
    pub strict: bool,
    /// Input constraints the bound descends from.
    pub origins: Bitset,
}

/// Exact lower/upper bounds per variable.
#[derive(Debug, Clone, Default)]
pub struct VariableBounds {
    lower: FxHashMap<Var, Bound>,
    upper: FxHashMap<Var, Bound>,
}

impl VariableBounds {
    /// No bounds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all bounds.
    pub fn clear(&mut self) {
        self.lower.clear();
        self.upper.clear();
    }

    /// Tighten the lower bound of `var`.
    pub fn add_lower(&mut self, var: Var, value: BigRational, strict: bool, origins: Bitset) {
        let replace = match self.lower.get(&var) {
            None => true,
            Some(existing) => {
                value > existing.value || (value == existing.value && strict && !existing.strict)
            }
        };
        if replace {
            self.lower.insert(
                var,
                Bound {
                    value,
                    strict,
                    origins,
                },
            );
        }
    }

    /// Tighten the upper bound of `var`.
    pub fn add_upper(&mut self, var: Var, value: BigRational, strict: bool, origins: Bitset) {
        let replace = match self.upper.get(&var) {
            None => true,
            Some(existing) => {
                value < existing.value || (value == existing.value && strict && !existing.strict)
            }
        };
        if replace {
            self.upper.insert(
                var,
                Bound {
                    value,
                    strict,
                    origins,
                },
            );
        }
    }

    /// The current lower bound.
    pub fn lower(&self, var: Var) -> Option<&Bound> {
        self.lower.get(&var)
    }

    /// The current upper bound.
    pub fn upper(&self, var: Var) -> Option<&Bound> {
        self.upper.get(&var)
    }

    /// If the bounds of some variable are contradictory, the union of
    /// the responsible origins.
    pub fn conflict(&self) -> Option<Bitset> {
        for (var, lo) in &self.lower {
            let Some(hi) = self.upper.get(var) else {
                continue;
            };
            let empty = lo.value > hi.value
                || (lo.value == hi.value && (lo.strict || hi.strict));
            if empty {
                let mut origins = lo.origins.clone();
                origins.union_with(&hi.origins);
                return Some(origins);
            }
        }
        None
    }

    /// Whether a candidate value for `var` is exactly inside the bounds.
    /// A `false` answer carries the origins of the violated bound.
    pub fn admits(&self, var: Var, value: &BigRational) -> Result<(), Bitset> {
        if let Some(lo) = self.lower.get(&var) {
            if *value < lo.value || (*value == lo.value && lo.strict) {
                return Err(lo.origins.clone());
            }
        }
        if let Some(hi) = self.upper.get(&var) {
            if *value > hi.value || (*value == hi.value && hi.strict) {
                return Err(hi.origins.clone());
            }
        }
        Ok(())
    }

    /// Advisory width of the feasible interval of `var`, for heuristic
    /// ordering only. Infinite when a side is unbounded; never used to
    /// prune.
    pub fn advisory_width(&self, var: Var) -> f64 {
        let lo = self
            .lower
            .get(&var)
            .and_then(|b| b.value.to_f64())
            .unwrap_or(f64::NEG_INFINITY);
        let hi = self
            .upper
            .get(&var)
            .and_then(|b| b.value.to_f64())
            .unwrap_or(f64::INFINITY);
        hi - lo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    fn q(n: i64) -> BigRational {
        BigRational::from_integer(BigInt::from(n))
    }

    fn origins(i: usize) -> Bitset {
        Bitset::from_indices([i])
    }

    #[test]
    fn tightening_keeps_the_stronger_bound() {
        let mut b = VariableBounds::new();
        b.add_lower(0, q(1), false, origins(0));
        b.add_lower(0, q(3), false, origins(1));
        b.add_lower(0, q(2), false, origins(2));
        assert_eq!(b.lower(0).map(|bound| bound.value.clone()), Some(q(3)));
    }

    #[test]
    fn conflict_detection() {
        let mut b = VariableBounds::new();
        b.add_lower(0, q(2), false, origins(0));
        assert!(b.conflict().is_none());
        b.add_upper(0, q(1), false, origins(1));
        let conflict = b.conflict().expect("bounds cross");
        assert!(conflict.test(0) && conflict.test(1));
    }

    #[test]
    fn equal_bounds_conflict_only_if_strict() {
        let mut b = VariableBounds::new();
        b.add_lower(0, q(2), false, origins(0));
        b.add_upper(0, q(2), false, origins(1));
        assert!(b.conflict().is_none());
        b.add_lower(0, q(2), true, origins(2));
        assert!(b.conflict().is_some());
    }

    #[test]
    fn admits_respects_strictness() {
        let mut b = VariableBounds::new();
        b.add_lower(0, q(0), true, origins(0));
        b.add_upper(0, q(10), false, origins(1));
        assert!(b.admits(0, &q(5)).is_ok());
        assert!(b.admits(0, &q(10)).is_ok());
        assert!(b.admits(0, &q(0)).is_err());
        assert!(b.admits(0, &q(-1)).is_err());
    }

    #[test]
    fn advisory_width_is_heuristic_only() {
        let mut b = VariableBounds::new();
        assert!(b.advisory_width(0).is_infinite());
        b.add_lower(0, q(0), false, origins(0));
        b.add_upper(0, q(4), false, origins(1));
        assert!((b.advisory_width(0) - 4.0).abs() < 1e-9);
    }
}
