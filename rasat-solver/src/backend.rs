//! The shared linear backend interface.
//!
//! The dispatcher consults a linear backend for cheap feasibility checks
//! before the nonlinear engines run. Nonlinear monomials are abstracted
//! by auxiliary variables first (the de-linearization table records which
//! monomial each auxiliary replaced), so an infeasible subset reported by
//! the backend can be remapped to the original constraints and never
//! leaks an auxiliary.
//!
//! The default implementation is exact interval propagation over the
//! linear image: sound for refutations, never used to conclude
//! satisfiability.

use num_rational::BigRational;
use num_traits::Zero;
use rasat_core::{Constraint, PolyPool, Relation};
use rasat_math::{Monomial, Polynomial, Var};
use rustc_hash::FxHashMap;
use tracing::trace;

/// Outcome of a linear feasibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinearOutcome {
    /// The linear image is infeasible; the indices name the input
    /// constraints responsible.
    Unsat(Vec<usize>),
    /// No refutation found (the image may still be infeasible over the
    /// nonlinear original).
    Unknown,
}

/// A backend deciding conjunctions of linear constraints.
pub trait LinearBackend {
    /// Check the conjunction; constraints are `(polynomial, relation)`
    /// pairs over the abstracted (purely linear) image.
    fn check_linear(&mut self, constraints: &[(Polynomial, Relation)]) -> LinearOutcome;
}

/// Replace every nonlinear monomial by a fresh auxiliary variable.
///
/// Returns the linear image together with the de-linearization table
/// mapping each auxiliary back to the monomial it replaced.
pub fn linearize(
    polys: &PolyPool,
    constraints: &[Constraint],
) -> (Vec<(Polynomial, Relation)>, FxHashMap<Var, Monomial>) {
    let mut max_var: Var = 0;
    for c in constraints {
        for v in polys.get(c.poly).vars() {
            max_var = max_var.max(v + 1);
        }
    }
    let mut table: FxHashMap<Var, Monomial> = FxHashMap::default();
    let mut seen: FxHashMap<Monomial, Var> = FxHashMap::default();
    let mut out = Vec::with_capacity(constraints.len());
    for c in constraints {
        let poly = polys.get(c.poly);
        let rewritten = Polynomial::from_terms(poly.terms().iter().map(|(coeff, mono)| {
            if mono.total_degree() <= 1 {
                (coeff.clone(), mono.clone())
            } else {
                let aux = *seen.entry(mono.clone()).or_insert_with(|| {
                    let fresh = max_var;
                    max_var += 1;
                    table.insert(fresh, mono.clone());
                    fresh
                });
                (coeff.clone(), Monomial::from_var(aux))
            }
        }));
        out.push((rewritten, c.relation));
    }
    (out, table)
}

/// Exact interval-propagation backend.
///
/// Bounds per variable are tightened from each constraint in turn until a
/// pass changes nothing or a contradiction appears. Every contraction is
/// exact rational arithmetic.
#[derive(Debug, Clone, Default)]
pub struct IntervalBackend {
    /// Maximum propagation passes.
    pub max_passes: usize,
}

impl IntervalBackend {
    /// A backend with the default pass limit.
    pub fn new() -> Self {
        Self { max_passes: 16 }
    }
}

#[derive(Debug, Clone, Default)]
struct VarInterval {
    lower: Option<(BigRational, bool)>,
    upper: Option<(BigRational, bool)>,
    origins: Vec<usize>,
}

impl VarInterval {
    fn conflicting(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Some((lo, lo_strict)), Some((hi, hi_strict))) => {
                lo > hi || (lo == hi && (*lo_strict || *hi_strict))
            }
            _ => false,
        }
    }
}

impl LinearBackend for IntervalBackend {
    fn check_linear(&mut self, constraints: &[(Polynomial, Relation)]) -> LinearOutcome {
        let mut intervals: FxHashMap<Var, VarInterval> = FxHashMap::default();
        let passes = self.max_passes.max(1);
        for _ in 0..passes {
            let mut changed = false;
            for (index, (poly, relation)) in constraints.iter().enumerate() {
                if *relation == Relation::Neq {
                    continue;
                }
                // Tighten the bound of each variable from the others.
                for var in poly.vars() {
                    let coeffs = poly.coeffs_wrt(var);
                    if coeffs.len() != 2 {
                        continue;
                    }
                    let Some(slope) = coeffs[1].constant_value() else {
                        continue;
                    };
                    if slope.is_zero() {
                        continue;
                    }
                    // rest's interval: evaluate term-wise over the known
                    // bounds; give up on unbounded parts.
                    let Some((rest_lo, rest_hi)) = bound_polynomial(&coeffs[0], &intervals) else {
                        continue;
                    };
                    // slope * var + rest ~ 0  =>  var ~' -rest / slope
                    let positive = slope > BigRational::zero();
                    let bound_from_hi = -&rest_hi / &slope;
                    let bound_from_lo = -&rest_lo / &slope;
                    let entry = intervals.entry(var).or_default();
                    let strict = relation.is_strict();
                    let mut tightened = false;
                    match relation {
                        Relation::Eq => {
                            tightened |= tighten_lower(entry, &bound_from_hi.clone().min(bound_from_lo.clone()), false);
                            tightened |= tighten_upper(entry, &bound_from_hi.max(bound_from_lo), false);
                        }
                        Relation::Leq | Relation::Less => {
                            if positive {
                                tightened |= tighten_upper(entry, &bound_from_lo, strict);
                            } else {
                                tightened |= tighten_lower(entry, &bound_from_lo, strict);
                            }
                        }
                        Relation::Geq | Relation::Greater => {
                            if positive {
                                tightened |= tighten_lower(entry, &bound_from_hi, strict);
                            } else {
                                tightened |= tighten_upper(entry, &bound_from_hi, strict);
                            }
                        }
                        Relation::Neq => {}
                    }
                    if tightened {
                        entry.origins.push(index);
                        changed = true;
                        if entry.conflicting() {
                            let mut origins = entry.origins.clone();
                            origins.sort_unstable();
                            origins.dedup();
                            trace!(var, "linear backend: bound conflict");
                            return LinearOutcome::Unsat(origins);
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }
        LinearOutcome::Unknown
    }
}

/// Enclose a linear polynomial over the known variable intervals; `None`
/// when some part is unbounded.
fn bound_polynomial(
    poly: &Polynomial,
    intervals: &FxHashMap<Var, VarInterval>,
) -> Option<(BigRational, BigRational)> {
    let mut lo = BigRational::zero();
    let mut hi = BigRational::zero();
    for (coeff, mono) in poly.terms() {
        if mono.is_unit() {
            lo += coeff;
            hi += coeff;
            continue;
        }
        let &[vp] = mono.vars() else {
            return None;
        };
        if vp.power != 1 {
            return None;
        }
        let interval = intervals.get(&vp.var)?;
        let (vl, _) = interval.lower.as_ref()?;
        let (vu, _) = interval.upper.as_ref()?;
        let a = coeff * vl;
        let b = coeff * vu;
        if a <= b {
            lo += a;
            hi += b;
        } else {
            lo += b;
            hi += a;
        }
    }
    Some((lo, hi))
}

fn tighten_lower(entry: &mut VarInterval, value: &BigRational, strict: bool) -> bool {
    let better = match &entry.lower {
        None => true,
        Some((existing, existing_strict)) => {
            value > existing || (value == existing && strict && !existing_strict)
        }
    };
    if better {
        entry.lower = Some((value.clone(), strict));
    }
    better
}

fn tighten_upper(entry: &mut VarInterval, value: &BigRational, strict: bool) -> bool {
    let better = match &entry.upper {
        None => true,
        Some((existing, existing_strict)) => {
            value < existing || (value == existing && strict && !existing_strict)
        }
    };
    if better {
        entry.upper = Some((value.clone(), strict));
    }
    better
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;
    use rasat_core::ConstraintPool;

    fn q(n: i64) -> BigRational {
        BigRational::from_integer(BigInt::from(n))
    }

    fn x() -> Polynomial {
        Polynomial::variable(0)
    }

    fn y() -> Polynomial {
        Polynomial::variable(1)
    }

    #[test]
    fn linearization_abstracts_monomials() {
        let mut polys = PolyPool::new();
        let mut pool = ConstraintPool::new();
        // x*y + x - 1 >= 0: the product becomes an auxiliary.
        let id = pool.intern(
            &mut polys,
            &(&(&x() * &y()) + &x()) - &Polynomial::one(),
            Relation::Geq,
        );
        let (image, table) = linearize(&polys, &[pool.get(id)]);
        assert_eq!(image.len(), 1);
        assert!(image[0].0.is_linear());
        assert_eq!(table.len(), 1);
        let (&aux, mono) = table.iter().next().expect("one auxiliary");
        assert!(aux >= 2);
        assert_eq!(mono.total_degree(), 2);
    }

    #[test]
    fn shared_monomials_share_auxiliaries() {
        let mut polys = PolyPool::new();
        let mut pool = ConstraintPool::new();
        let a = pool.intern(&mut polys, &(&x() * &y()) - &Polynomial::one(), Relation::Geq);
        let b = pool.intern(&mut polys, &(&x() * &y()) + &Polynomial::one(), Relation::Leq);
        let (image, table) = linearize(&polys, &[pool.get(a), pool.get(b)]);
        assert_eq!(table.len(), 1);
        assert_eq!(image[0].0.main_var(), image[1].0.main_var());
    }

    #[test]
    fn interval_backend_refutes_crossing_bounds() {
        // x >= 2 and x <= 1.
        let mut backend = IntervalBackend::new();
        let constraints = vec![
            (&x() - &Polynomial::constant(q(2)), Relation::Geq),
            (&x() - &Polynomial::constant(q(1)), Relation::Leq),
        ];
        match backend.check_linear(&constraints) {
            LinearOutcome::Unsat(origins) => {
                assert!(origins.contains(&0) || origins.contains(&1));
            }
            LinearOutcome::Unknown => panic!("expected a refutation"),
        }
    }

    #[test]
    fn propagation_chains_through_equalities() {
        // x = 1, y = x + 3, y <= 2: infeasible after one propagation.
        let mut backend = IntervalBackend::new();
        let constraints = vec![
            (&x() - &Polynomial::one(), Relation::Eq),
            (&(&y() - &x()) - &Polynomial::constant(q(3)), Relation::Eq),
            (&y() - &Polynomial::constant(q(2)), Relation::Leq),
        ];
        assert!(matches!(
            backend.check_linear(&constraints),
            LinearOutcome::Unsat(_)
        ));
    }

    #[test]
    fn feasible_bounds_stay_unknown() {
        let mut backend = IntervalBackend::new();
        let constraints = vec![
            (x(), Relation::Geq),
            (&x() - &Polynomial::constant(q(5)), Relation::Leq),
        ];
        assert_eq!(backend.check_linear(&constraints), LinearOutcome::Unknown);
    }
}
