//! Hash-consed polynomial and constraint pools.
//!
//! Interning is total and idempotent: structurally identical polynomials
//! and canonically identical constraints always resolve to the same
//! stable id. The polynomial pool memoizes the expensive per-polynomial
//! data (leading coefficients, discriminants, pairwise resultants,
//! square-free factors); consumers address everything through ids.

use rasat_math::polynomial::factor::nonconst_factors;
use rasat_math::polynomial::resultant::{discriminant, resultant};
use rasat_math::polynomial::Sign;
use rasat_math::{Polynomial, Var};
use rustc_hash::FxHashMap;
use std::fmt;

use crate::constraint::{Constraint, Relation};

/// Stable identifier of a pooled polynomial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolyId(pub u32);

/// Stable identifier of a pooled constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(pub u32);

impl fmt::Display for PolyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

impl fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// The process-wide polynomial store.
///
/// Writes happen only during interning; lookups are read-only. Polynomials
/// are never removed during a check.
#[derive(Debug, Default)]
pub struct PolyPool {
    polys: Vec<Polynomial>,
    index: FxHashMap<Polynomial, PolyId>,
    ldcf: FxHashMap<PolyId, PolyId>,
    disc: FxHashMap<PolyId, PolyId>,
    res: FxHashMap<(PolyId, PolyId), PolyId>,
    factors: FxHashMap<PolyId, Vec<PolyId>>,
}

impl PolyPool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a polynomial, returning its stable id.
    pub fn intern(&mut self, poly: Polynomial) -> PolyId {
        if let Some(&id) = self.index.get(&poly) {
            return id;
        }
        let id = PolyId(self.polys.len() as u32);
        self.index.insert(poly.clone(), id);
        self.polys.push(poly);
        id
    }

    /// The polynomial behind an id.
    pub fn get(&self, id: PolyId) -> &Polynomial {
        &self.polys[id.0 as usize]
    }

    /// Number of pooled polynomials.
    pub fn len(&self) -> usize {
        self.polys.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.polys.is_empty()
    }

    /// Leading coefficient of `p` with respect to its main variable,
    /// memoized.
    pub fn leading_coeff(&mut self, id: PolyId, var: Var) -> PolyId {
        if let Some(&cached) = self.ldcf.get(&id) {
            return cached;
        }
        let lc = self.get(id).leading_coeff_wrt(var);
        let lc_id = self.intern(lc);
        self.ldcf.insert(id, lc_id);
        lc_id
    }

    /// Discriminant of `p` with respect to `var`, memoized.
    pub fn discriminant(&mut self, id: PolyId, var: Var) -> PolyId {
        if let Some(&cached) = self.disc.get(&id) {
            return cached;
        }
        let d = discriminant(self.get(id), var);
        let d_id = self.intern(d.integer_normalized().0);
        self.disc.insert(id, d_id);
        d_id
    }

    /// Resultant of two polynomials with respect to `var`, memoized
    /// symmetrically up to sign.
    pub fn resultant(&mut self, a: PolyId, b: PolyId, var: Var) -> PolyId {
        let key = if a <= b { (a, b) } else { (b, a) };
        if let Some(&cached) = self.res.get(&key) {
            return cached;
        }
        let r = resultant(self.get(key.0), self.get(key.1), var);
        let r_id = self.intern(r.integer_normalized().0);
        self.res.insert(key, r_id);
        r_id
    }

    /// Square-free, pairwise-coprime non-constant factors, memoized.
    pub fn factors(&mut self, id: PolyId) -> Vec<PolyId> {
        if let Some(cached) = self.factors.get(&id) {
            return cached.clone();
        }
        let fs: Vec<PolyId> = nonconst_factors(self.get(id))
            .into_iter()
            .map(|f| self.intern(f))
            .collect();
        self.factors.insert(id, fs.clone());
        fs
    }
}

/// The constraint store with canonicalization.
#[derive(Debug, Default)]
pub struct ConstraintPool {
    constraints: Vec<Constraint>,
    index: FxHashMap<Constraint, ConstraintId>,
}

impl ConstraintPool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `lhs ~ 0`, canonicalizing first: integer content is
    /// stripped, the leading coefficient is made positive, and the
    /// relation is mirrored accordingly so that `p ~ 0` and `-p ~' 0`
    /// share one representative.
    pub fn intern(
        &mut self,
        polys: &mut PolyPool,
        lhs: Polynomial,
        relation: Relation,
    ) -> ConstraintId {
        let (normalized, flipped) = lhs.integer_normalized();
        let relation = if flipped { relation.mirrored() } else { relation };
        let poly = polys.intern(normalized);
        let constraint = Constraint { poly, relation };
        if let Some(&id) = self.index.get(&constraint) {
            return id;
        }
        let id = ConstraintId(self.constraints.len() as u32);
        self.index.insert(constraint, id);
        self.constraints.push(constraint);
        id
    }

    /// The constraint behind an id.
    pub fn get(&self, id: ConstraintId) -> Constraint {
        self.constraints[id.0 as usize]
    }

    /// Number of pooled constraints.
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Cheap syntactic consistency: `Some(truth)` for constraints with a
    /// constant left-hand side, `None` otherwise.
    pub fn consistency(&self, polys: &PolyPool, id: ConstraintId) -> Option<bool> {
        let constraint = self.get(id);
        let value = polys.get(constraint.poly).constant_value()?;
        Some(constraint.relation.holds_on(Sign::of_rational(&value)))
    }
}

/// Pretty-printer for a pooled constraint.
pub fn display_constraint(polys: &PolyPool, constraint: Constraint) -> String {
    format!("{} {} 0", polys.get(constraint.poly), constraint.relation)
}
