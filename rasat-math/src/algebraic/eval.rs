//! Exact sign evaluation under partial real-algebraic assignments.
//!
//! Given a polynomial and an assignment mapping some variables to real
//! algebraic numbers, this module decides the exact sign of the value,
//! isolates the real roots of the polynomial in one remaining variable,
//! and detects nullification (all coefficients vanishing).
//!
//! Rational assignment values are substituted directly. For algebraic
//! values, the assigned variables are eliminated by resultants against the
//! defining polynomials, producing a univariate carrier polynomial whose
//! root set contains the value in question; interval refinement then
//! separates that root from zero, with the carrier providing the exact
//! zero test that refinement alone cannot.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::Zero;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::interval::RatInterval;
use crate::polynomial::gcd::gcd;
use crate::polynomial::resultant::resultant;
use crate::polynomial::{Polynomial, Sign, Var};
use crate::unipoly::UniPoly;
use crate::RealAlgebraicNumber;

/// A partial assignment of variables to exact real values.
pub type RealAssignment = FxHashMap<Var, RealAlgebraicNumber>;

/// Failures of exact evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// A variable of the polynomial has no assigned value.
    #[error("variable x{0} is not assigned")]
    Unassigned(Var),
    /// The resultant chain lost the value it was carrying; the caller
    /// treats this as a projection obstruction.
    #[error("degenerate elimination while evaluating at an algebraic point")]
    Degenerate,
}

/// Result of isolating the roots of a polynomial under an assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootsResult {
    /// The polynomial vanishes identically under the assignment.
    Nullified,
    /// The real roots, in ascending order.
    Roots(Vec<RealAlgebraicNumber>),
}

const MAX_REFINEMENTS: usize = 16_384;

/// Exact sign of `p` under `assignment`.
///
/// Every variable of `p` must be assigned.
pub fn sign_at(p: &Polynomial, assignment: &RealAssignment) -> Result<Sign, EvalError> {
    let (rational, algebraic) = split_assignment(assignment);
    let reduced = p.substitute_rational(&rational);
    if let Some(c) = reduced.constant_value() {
        return Ok(Sign::of_rational(&c));
    }
    let vars = reduced.vars();
    for &v in &vars {
        if !algebraic.contains_key(&v) {
            return Err(EvalError::Unassigned(v));
        }
    }
    if let [only] = vars[..] {
        if let Some(u) = reduced.to_unipoly(only) {
            return Ok(sign_of_unipoly_at(&u, &algebraic[&only]));
        }
    }
    sign_by_elimination(&reduced, &vars, &algebraic)
}

/// Real roots of `p` in `var` under `assignment`, or nullification.
///
/// All variables of `p` except `var` must be assigned.
pub fn real_roots(
    p: &Polynomial,
    var: Var,
    assignment: &RealAssignment,
) -> Result<RootsResult, EvalError> {
    let (rational, algebraic) = split_assignment(assignment);
    let reduced = p.substitute_rational(&rational);
    if !reduced.contains_var(var) {
        return Ok(if sign_at(&reduced, assignment)?.is_zero() {
            RootsResult::Nullified
        } else {
            RootsResult::Roots(Vec::new())
        });
    }
    let other_vars: Vec<Var> = reduced.vars().into_iter().filter(|&v| v != var).collect();
    for &v in &other_vars {
        if !algebraic.contains_key(&v) {
            return Err(EvalError::Unassigned(v));
        }
    }
    if other_vars.is_empty() {
        let Some(u) = reduced.to_unipoly(var) else {
            return Err(EvalError::Degenerate);
        };
        return Ok(RootsResult::Roots(RealAlgebraicNumber::real_roots(&u)));
    }
    // Nullification: every coefficient of the univariate view vanishes.
    let mut nullified = true;
    for coeff in reduced.coeffs_wrt(var) {
        if !sign_at(&coeff, assignment)?.is_zero() {
            nullified = false;
            break;
        }
    }
    if nullified {
        return Ok(RootsResult::Nullified);
    }
    // Eliminate the algebraic variables; the surviving univariate carrier
    // has every root of p(assignment, var) among its own roots.
    let carrier = match eliminate(reduced.clone(), &other_vars, &algebraic)? {
        Elimination::Poly(f) => f,
        Elimination::Vanishes => return Err(EvalError::Degenerate),
    };
    let Some(candidates) = carrier.to_unipoly(var) else {
        return Err(EvalError::Degenerate);
    };
    let mut roots = Vec::new();
    for candidate in RealAlgebraicNumber::real_roots(&candidates) {
        let mut extended = assignment.clone();
        extended.insert(var, candidate.clone());
        if sign_at(&reduced, &extended)?.is_zero() {
            roots.push(candidate);
        }
    }
    Ok(RootsResult::Roots(roots))
}

/// Whether `p` vanishes identically in `var` under `assignment`.
pub fn is_nullified(
    p: &Polynomial,
    var: Var,
    assignment: &RealAssignment,
) -> Result<bool, EvalError> {
    match real_roots(p, var, assignment)? {
        RootsResult::Nullified => Ok(true),
        RootsResult::Roots(_) => Ok(false),
    }
}

fn split_assignment(
    assignment: &RealAssignment,
) -> (FxHashMap<Var, BigRational>, FxHashMap<Var, RealAlgebraicNumber>) {
    let mut rational = FxHashMap::default();
    let mut algebraic = FxHashMap::default();
    for (&var, value) in assignment {
        match value {
            RealAlgebraicNumber::Rational(q) => {
                rational.insert(var, q.clone());
            }
            root @ RealAlgebraicNumber::Root { .. } => {
                algebraic.insert(var, root.clone());
            }
        }
    }
    (rational, algebraic)
}

/// Sign of a univariate polynomial at one algebraic point.
fn sign_of_unipoly_at(u: &UniPoly, alpha: &RealAlgebraicNumber) -> Sign {
    match alpha {
        RealAlgebraicNumber::Rational(value) => u.sign_at(value),
        RealAlgebraicNumber::Root { poly, lower, upper } => {
            let common = u.gcd(poly);
            if !common.is_constant() {
                let seq = common.sturm_sequence();
                if UniPoly::count_roots_in(&seq, lower, upper) >= 1 {
                    return Sign::Zero;
                }
            }
            // alpha is not a root of u; refinement must separate.
            let mut point = alpha.clone();
            loop {
                if let RealAlgebraicNumber::Rational(value) = &point {
                    return u.sign_at(value);
                }
                let enclosure = interval_eval_unipoly(u, &point.interval());
                if let Some(sign) = enclosure.sign_if_known() {
                    return sign;
                }
                point.refine();
            }
        }
    }
}

enum Elimination {
    Poly(Polynomial),
    /// The polynomial vanishes identically on the slice fixed by one of
    /// the assigned algebraic values.
    Vanishes,
}

/// Eliminate the given algebraic variables from `f` by resultants against
/// their defining polynomials.
fn eliminate(
    mut f: Polynomial,
    vars: &[Var],
    algebraic: &FxHashMap<Var, RealAlgebraicNumber>,
) -> Result<Elimination, EvalError> {
    for &v in vars {
        if !f.contains_var(v) {
            continue;
        }
        let RealAlgebraicNumber::Root { poly, lower, upper } = &algebraic[&v] else {
            return Err(EvalError::Unassigned(v));
        };
        let defining = Polynomial::from_unipoly(v, poly);
        let common = gcd(&f, &defining);
        let divisor = if common.is_constant() {
            defining
        } else {
            let Some(common_uni) = common.to_unipoly(v) else {
                return Err(EvalError::Degenerate);
            };
            let seq = common_uni.sturm_sequence();
            if common_uni.sign_at(lower).is_zero()
                || common_uni.sign_at(upper).is_zero()
                || UniPoly::count_roots_in(&seq, lower, upper) >= 1
            {
                return Ok(Elimination::Vanishes);
            }
            match defining.try_div(&common) {
                Some(rest) => rest,
                None => return Err(EvalError::Degenerate),
            }
        };
        f = resultant(&divisor, &f, v);
        if f.is_zero() {
            return Err(EvalError::Degenerate);
        }
    }
    Ok(Elimination::Poly(f))
}

/// General sign evaluation via a fresh carrier variable.
fn sign_by_elimination(
    reduced: &Polynomial,
    vars: &[Var],
    algebraic: &FxHashMap<Var, RealAlgebraicNumber>,
) -> Result<Sign, EvalError> {
    let fresh = vars.iter().copied().max().unwrap_or(0) + 1;
    let f0 = &Polynomial::variable(fresh) - reduced;
    let carrier = match eliminate(f0, vars, algebraic)? {
        Elimination::Poly(f) => f,
        Elimination::Vanishes => return Err(EvalError::Degenerate),
    };
    let Some(m) = carrier.to_unipoly(fresh) else {
        return Err(EvalError::Degenerate);
    };
    let m = m.square_free();
    let zero = BigRational::zero();
    let zero_is_candidate = m.sign_at(&zero).is_zero();
    let seq = m.sturm_sequence();
    let mut points: FxHashMap<Var, RealAlgebraicNumber> = vars
        .iter()
        .map(|&v| (v, algebraic[&v].clone()))
        .collect();
    for _ in 0..MAX_REFINEMENTS {
        let intervals: FxHashMap<Var, RatInterval> = points
            .iter()
            .map(|(&v, point)| (v, point.interval()))
            .collect();
        let enclosure = interval_eval(reduced, &intervals);
        if let Some(sign) = enclosure.sign_if_known() {
            return Ok(sign);
        }
        if zero_is_candidate {
            let (lo, hi) = widen_to_nonroots(&m, &enclosure);
            if UniPoly::count_roots_in(&seq, &lo, &hi) == 1 {
                return Ok(Sign::Zero);
            }
        }
        for point in points.values_mut() {
            point.refine();
        }
    }
    Err(EvalError::Degenerate)
}

/// Widen an enclosure outwards until both endpoints are non-roots of `m`.
fn widen_to_nonroots(m: &UniPoly, enclosure: &RatInterval) -> (BigRational, BigRational) {
    let one = BigRational::from_integer(BigInt::from(1));
    let scale = BigRational::from_integer(BigInt::from(1024));
    let mut delta = (enclosure.width() + &one) / &scale;
    let two = BigRational::from_integer(BigInt::from(2));
    let mut lo = &enclosure.lo - &delta;
    while m.sign_at(&lo).is_zero() {
        delta /= &two;
        lo = &enclosure.lo - &delta;
    }
    let mut delta = (enclosure.width() + one) / scale;
    let mut hi = &enclosure.hi + &delta;
    while m.sign_at(&hi).is_zero() {
        delta /= &two;
        hi = &enclosure.hi + &delta;
    }
    (lo, hi)
}

/// Interval enclosure of a multivariate polynomial over boxes.
fn interval_eval(p: &Polynomial, intervals: &FxHashMap<Var, RatInterval>) -> RatInterval {
    let mut acc = RatInterval::point(BigRational::zero());
    for (coeff, mono) in p.terms() {
        let mut term = RatInterval::point(coeff.clone());
        for vp in mono.vars() {
            match intervals.get(&vp.var) {
                Some(iv) => term = term.mul(&iv.pow(vp.power)),
                None => return RatInterval::point(BigRational::zero()),
            }
        }
        acc = acc.add(&term);
    }
    acc
}

/// Interval enclosure of a univariate polynomial over one box (Horner).
fn interval_eval_unipoly(u: &UniPoly, x: &RatInterval) -> RatInterval {
    let mut acc = RatInterval::point(BigRational::zero());
    for c in u.coeffs().iter().rev() {
        acc = acc.mul(x).add(&RatInterval::point(c.clone()));
    }
    acc
}
