//! Square-root expressions `(p + q * sqrt(r)) / s`.
//!
//! The symbolic terms substituted for an eliminated variable. All four
//! components are polynomials in the remaining variables; `r` is
//! understood to be non-negative and `s` nonzero wherever the expression
//! is used (both are guarded by side conditions on the substitution).
//!
//! Substituting such a term into a polynomial and clearing denominators
//! yields `A + B * sqrt(r)`; the sign of that value is decided by case
//! analysis on the signs of `A` and `B`, producing a disjunction of
//! conjunctions of ordinary polynomial constraints.

use num_rational::BigRational;
use rasat_core::Relation;
use rasat_math::{Polynomial, Var};
use std::fmt;

/// A term `(p + q * sqrt(r)) / s` with polynomial components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqrtExpr {
    /// Constant part of the numerator.
    pub p: Polynomial,
    /// Radical coefficient.
    pub q: Polynomial,
    /// Radicand; non-negative by side condition.
    pub r: Polynomial,
    /// Denominator; nonzero by side condition.
    pub s: Polynomial,
}

/// A disjunction of conjunctions of constraints over polynomials.
pub type Dnf = Vec<Vec<(Polynomial, Relation)>>;

impl SqrtExpr {
    /// The polynomial term `p`.
    pub fn from_polynomial(p: Polynomial) -> Self {
        Self {
            p,
            q: Polynomial::zero(),
            r: Polynomial::zero(),
            s: Polynomial::one(),
        }
    }

    /// The fraction `p / s`.
    pub fn fraction(p: Polynomial, s: Polynomial) -> Self {
        Self {
            p,
            q: Polynomial::zero(),
            r: Polynomial::zero(),
            s,
        }
    }

    /// The full form `(p + q * sqrt(r)) / s`.
    pub fn new(p: Polynomial, q: Polynomial, r: Polynomial, s: Polynomial) -> Self {
        Self { p, q, r, s }
    }

    /// Whether the radical part vanishes syntactically.
    pub fn is_polynomial_fraction(&self) -> bool {
        self.q.is_zero() || self.r.is_zero()
    }

    /// Evaluate to a rational if every component is constant and the
    /// radicand is a perfect square (or irrelevant).
    pub fn to_rational(&self) -> Option<BigRational> {
        let p = self.p.constant_value()?;
        let s = self.s.constant_value()?;
        if s == BigRational::from_integer(0.into()) {
            return None;
        }
        if self.is_polynomial_fraction() {
            return Some(p / s);
        }
        let q = self.q.constant_value()?;
        let r = self.r.constant_value()?;
        let sqrt = rational_sqrt(&r)?;
        Some((p + q * sqrt) / s)
    }

    /// Substitute this term for `var` in `poly`, multiplying through by
    /// `s^deg`: the result is `(A, B)` with
    /// `poly[var -> term] * s^deg = A + B * sqrt(r)`, together with the
    /// degree used for the denominator power.
    pub fn substitute_into(&self, poly: &Polynomial, var: Var) -> (Polynomial, Polynomial, u32) {
        let coeffs = poly.coeffs_wrt(var);
        let degree = (coeffs.len() - 1) as u32;
        // t^i = a_i + b_i * sqrt(r), built incrementally.
        let mut a = Polynomial::one();
        let mut b = Polynomial::zero();
        let mut result_a = Polynomial::zero();
        let mut result_b = Polynomial::zero();
        for (i, coeff) in coeffs.iter().enumerate() {
            let s_power = self.s.pow(degree - i as u32);
            let scaled = coeff * &s_power;
            result_a = &result_a + &(&scaled * &a);
            result_b = &result_b + &(&scaled * &b);
            if (i as u32) < degree {
                // (a + b sqrt r)(p + q sqrt r) = ap + bqr + (aq + bp) sqrt r
                let next_a = &(&a * &self.p) + &(&(&b * &self.q) * &self.r);
                let next_b = &(&a * &self.q) + &(&b * &self.p);
                a = next_a;
                b = next_b;
            }
        }
        (result_a, result_b, degree)
    }
}

/// The square root of a rational, if it is rational.
fn rational_sqrt(value: &BigRational) -> Option<BigRational> {
    use num_traits::Signed;
    if value.is_negative() {
        return None;
    }
    let numer = value.numer().sqrt();
    let denom = value.denom().sqrt();
    let candidate = BigRational::new(numer, denom);
    if &(&candidate * &candidate) == value {
        Some(candidate)
    } else {
        None
    }
}

/// Case rules for `A + B * sqrt(r) ~ 0`, assuming `r >= 0`.
///
/// When the radical part is absent the single case `A ~ 0` is produced.
pub fn sign_cases(a: &Polynomial, b: &Polynomial, r: &Polynomial, relation: Relation) -> Dnf {
    if b.is_zero() || r.is_zero() {
        return vec![vec![(a.clone(), relation)]];
    }
    let ab = a * b;
    let a2 = a * a;
    let b2r = &(b * b) * r;
    let defect = &a2 - &b2r;
    match relation {
        Relation::Eq => vec![vec![(ab, Relation::Leq), (defect.clone(), Relation::Eq)]],
        Relation::Neq => vec![
            vec![(ab, Relation::Greater)],
            vec![(defect.clone(), Relation::Neq)],
        ],
        Relation::Less => less_cases(a, b, &defect, false),
        Relation::Leq => less_cases(a, b, &defect, true),
        Relation::Greater => less_cases(&(-a), &(-b), &defect, false),
        Relation::Geq => less_cases(&(-a), &(-b), &defect, true),
    }
}

/// `A + B sqrt(r) < 0` (or `<= 0` when `weak`); the defect is
/// `A^2 - B^2 r`, which is unchanged under simultaneous negation of `A`
/// and `B`.
fn less_cases(a: &Polynomial, b: &Polynomial, defect: &Polynomial, weak: bool) -> Dnf {
    let (lt, le) = if weak {
        (Relation::Leq, Relation::Leq)
    } else {
        (Relation::Less, Relation::Less)
    };
    vec![
        // Both parts point down.
        vec![(a.clone(), lt), (b.clone(), Relation::Leq)],
        // Negative constant part dominates a positive radical part.
        vec![
            (a.clone(), lt),
            (b.clone(), Relation::Greater),
            (defect.clone(), if weak { Relation::Geq } else { Relation::Greater }),
        ],
        // Negative radical part dominates a non-negative constant part.
        vec![
            (a.clone(), Relation::Geq),
            (b.clone(), Relation::Less),
            (defect.clone(), le),
        ],
    ]
}

/// Conjunction of two DNFs (cartesian product of their conjunctions).
pub fn dnf_and(left: &Dnf, right: &Dnf) -> Dnf {
    let mut out = Vec::with_capacity(left.len() * right.len());
    for l in left {
        for r in right {
            let mut conj = l.clone();
            conj.extend(r.iter().cloned());
            out.push(conj);
        }
    }
    out
}

impl fmt::Display for SqrtExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_polynomial_fraction() {
            write!(f, "({}) / ({})", self.p, self.s)
        } else {
            write!(
                f,
                "(({}) + ({}) * sqrt({})) / ({})",
                self.p, self.q, self.r, self.s
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;
    use rasat_math::polynomial::Sign;
    use rustc_hash::FxHashMap;

    fn q(n: i64) -> BigRational {
        BigRational::from_integer(BigInt::from(n))
    }

    fn x() -> Polynomial {
        Polynomial::variable(0)
    }

    fn c(n: i64) -> Polynomial {
        Polynomial::constant(q(n))
    }

    #[test]
    fn rational_evaluation() {
        // (1 + 2*sqrt(9)) / 7 = 1
        let e = SqrtExpr::new(c(1), c(2), c(9), c(7));
        assert_eq!(e.to_rational(), Some(q(1)));
        // sqrt(2) is not rational.
        let irr = SqrtExpr::new(c(0), c(1), c(2), c(1));
        assert_eq!(irr.to_rational(), None);
    }

    #[test]
    fn substitute_fraction_into_linear() {
        // Substitute x -> 3/2 into x - 1: s*x - s*1 evaluated: A = 3 - 2 = 1.
        let term = SqrtExpr::fraction(c(3), c(2));
        let poly = &x() - &c(1);
        let (a, b, degree) = term.substitute_into(&poly, 0);
        assert_eq!(degree, 1);
        assert!(b.is_zero());
        assert_eq!(a, c(1));
    }

    #[test]
    fn substitute_radical_into_quadratic() {
        // x -> sqrt(2) into x^2 - 2 gives A + B*sqrt(2) with A = 0, B = 0:
        // (sqrt 2)^2 - 2 = 0.
        let term = SqrtExpr::new(c(0), c(1), c(2), c(1));
        let poly = &(&x() * &x()) - &c(2);
        let (a, b, _) = term.substitute_into(&poly, 0);
        assert!(a.is_zero());
        assert!(b.is_zero());
    }

    #[test]
    fn substitute_radical_into_linear() {
        // x -> (1 + sqrt(2)) into x - 1: A = 0, B = 1.
        let term = SqrtExpr::new(c(1), c(1), c(2), c(1));
        let poly = &x() - &c(1);
        let (a, b, _) = term.substitute_into(&poly, 0);
        assert!(a.is_zero());
        assert_eq!(b, c(1));
    }

    #[test]
    fn eq_case_rule_detects_root() {
        // A = 0, B = 0: A*B <= 0 and A^2 - B^2 r = 0 both hold.
        let cases = sign_cases(&c(0), &c(0), &c(2), Relation::Eq);
        assert_eq!(cases.len(), 1);
        let empty = FxHashMap::default();
        for (poly, rel) in &cases[0] {
            let value = poly.evaluate(&empty).expect("constant");
            assert!(rel.holds_on(Sign::of_rational(&value)));
        }
    }

    #[test]
    fn less_case_rules_cover_negative_value() {
        // Value -1 + 1*sqrt(0.25) = -0.5 < 0 with A = -1, B = 1, r = 1/4:
        // the case A < 0, B > 0, A^2 - B^2 r > 0 must hold.
        let a = c(-1);
        let b = c(1);
        let r = Polynomial::constant(BigRational::new(BigInt::from(1), BigInt::from(4)));
        let cases = sign_cases(&a, &b, &r, Relation::Less);
        let empty = FxHashMap::default();
        let holds = cases.iter().any(|conj| {
            conj.iter().all(|(poly, rel)| {
                let value = poly.evaluate(&empty).expect("constant");
                rel.holds_on(Sign::of_rational(&value))
            })
        });
        assert!(holds);
    }

    #[test]
    fn greater_mirror_covers_positive_value() {
        // 1 + 1*sqrt(4) = 3 > 0.
        let cases = sign_cases(&c(1), &c(1), &c(4), Relation::Greater);
        let empty = FxHashMap::default();
        let holds = cases.iter().any(|conj| {
            conj.iter().all(|(poly, rel)| {
                let value = poly.evaluate(&empty).expect("constant");
                rel.holds_on(Sign::of_rational(&value))
            })
        });
        assert!(holds);
    }

    #[test]
    fn negative_value_fails_greater_cases() {
        // -2 + 1*sqrt(1) = -1, not > 0: no case may hold.
        let cases = sign_cases(&c(-2), &c(1), &c(1), Relation::Greater);
        let empty = FxHashMap::default();
        let holds = cases.iter().any(|conj| {
            conj.iter().all(|(poly, rel)| {
                let value = poly.evaluate(&empty).expect("constant");
                rel.holds_on(Sign::of_rational(&value))
            })
        });
        assert!(!holds);
    }

    #[test]
    fn dnf_product() {
        let left: Dnf = vec![vec![(c(1), Relation::Greater)], vec![(c(2), Relation::Greater)]];
        let right: Dnf = vec![vec![(c(3), Relation::Less)]];
        let product = dnf_and(&left, &right);
        assert_eq!(product.len(), 2);
        assert_eq!(product[0].len(), 2);
    }
}
