//! The projection pool.
//!
//! Holds, per level, the polynomials whose sign structure determines the
//! decomposition, and memoizes every projection operation: resultants,
//! discriminants, leading coefficients and square-free factorizations are
//! cached in the shared polynomial pool, while root isolation and
//! nullification checks are cached per `(sample prefix, polynomial)`.
//!
//! Clearing is level-scoped: dropping level `l` invalidates every cached
//! result at levels at or above `l`.

use rasat_core::{PolyId, PolyPool};
use rasat_math::eval::{self, EvalError, RootsResult};
use rasat_math::{RealAssignment, Var};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

/// Projection operator choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionOperator {
    /// McCallum projection: discriminants, pairwise resultants, leading
    /// coefficients of the square-free basis. Incomplete under
    /// nullification.
    McCallum,
    /// Collins projection: additionally keeps all reducta coefficients.
    /// Complete but larger.
    Collins,
}

/// Configuration of the projection pool.
#[derive(Debug, Clone)]
pub struct ProjectionConfig {
    /// Operator used when descending a level.
    pub operator: ProjectionOperator,
    /// Factorize into a square-free basis before projecting.
    pub factorize: bool,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            operator: ProjectionOperator::McCallum,
            factorize: true,
        }
    }
}

/// Counters for projection work.
#[derive(Debug, Clone, Default)]
pub struct ProjectionStats {
    /// Polynomials added across all levels.
    pub polynomials_added: u64,
    /// Resultants computed.
    pub resultants: u64,
    /// Discriminants computed.
    pub discriminants: u64,
    /// Leading coefficients computed.
    pub leading_coeffs: u64,
    /// Root isolation calls that missed the cache.
    pub root_isolations: u64,
    /// Nullifications encountered.
    pub nullifications: u64,
    /// Cache hits on root isolation.
    pub cache_hits: u64,
}

/// Per-level polynomial sets plus memoized projection results.
#[derive(Debug)]
pub struct ProjectionPool {
    config: ProjectionConfig,
    stats: ProjectionStats,
    /// `levels[v]` holds the polynomials whose main variable is `v`.
    levels: Vec<FxHashSet<PolyId>>,
    /// Whether projection has been run for a level already.
    projected: Vec<bool>,
    /// Roots of a polynomial under the assignment identified by a prefix
    /// key.
    roots: FxHashMap<(u64, PolyId), RootsResult>,
}

impl ProjectionPool {
    /// A pool for `dim` variables.
    pub fn new(dim: usize, config: ProjectionConfig) -> Self {
        Self {
            config,
            stats: ProjectionStats::default(),
            levels: vec![FxHashSet::default(); dim],
            projected: vec![false; dim],
            roots: FxHashMap::default(),
        }
    }

    /// Current statistics.
    pub fn stats(&self) -> &ProjectionStats {
        &self.stats
    }

    /// The polynomials at the level of variable `var`.
    pub fn polys_at(&self, var: Var) -> impl Iterator<Item = PolyId> + '_ {
        let mut ids: Vec<PolyId> = self.levels[var as usize].iter().copied().collect();
        ids.sort();
        ids.into_iter()
    }

    /// Number of variables.
    pub fn dim(&self) -> usize {
        self.levels.len()
    }

    /// Add an input polynomial; it is factorized into its square-free
    /// basis and the factors are placed at their levels. Returns the
    /// factors actually inserted.
    pub fn add_polynomial(&mut self, polys: &mut PolyPool, id: PolyId) -> Vec<PolyId> {
        let mut inserted = Vec::new();
        let factors = if self.config.factorize {
            polys.factors(id)
        } else {
            vec![id]
        };
        for factor in factors {
            let Some(var) = polys.get(factor).main_var() else {
                continue;
            };
            debug_assert!((var as usize) < self.levels.len());
            if self.levels[var as usize].insert(factor) {
                trace!(poly = %polys.get(factor), level = var, "projection: insert");
                self.stats.polynomials_added += 1;
                self.invalidate_projection_at(var);
                inserted.push(factor);
            }
        }
        inserted
    }

    /// Run one projection step from the level of `var` down, inserting
    /// the resulting polynomials at their levels. Idempotent per level
    /// until new polynomials arrive.
    pub fn project_level(&mut self, polys: &mut PolyPool, var: Var) {
        let v = var as usize;
        if self.projected[v] {
            return;
        }
        self.projected[v] = true;
        let ids: Vec<PolyId> = self.polys_at(var).collect();
        debug!(level = var, count = ids.len(), "projection step");
        let mut produced: Vec<PolyId> = Vec::new();
        for &p in &ids {
            produced.push(polys.discriminant(p, var));
            self.stats.discriminants += 1;
            produced.push(polys.leading_coeff(p, var));
            self.stats.leading_coeffs += 1;
            if self.config.operator == ProjectionOperator::Collins {
                // Collins keeps every coefficient of the univariate view.
                for coeff in polys.get(p).coeffs_wrt(var) {
                    produced.push(polys.intern(coeff.integer_normalized().0));
                }
            }
        }
        for i in 0..ids.len() {
            for j in i + 1..ids.len() {
                produced.push(polys.resultant(ids[i], ids[j], var));
                self.stats.resultants += 1;
            }
        }
        for id in produced {
            if polys.get(id).is_constant() {
                continue;
            }
            self.add_polynomial(polys, id);
        }
    }

    /// Real roots of `poly` in `var` under `assignment`, memoized by the
    /// caller-provided prefix key.
    pub fn real_roots(
        &mut self,
        polys: &PolyPool,
        prefix_key: u64,
        poly: PolyId,
        var: Var,
        assignment: &RealAssignment,
    ) -> Result<RootsResult, EvalError> {
        if let Some(cached) = self.roots.get(&(prefix_key, poly)) {
            self.stats.cache_hits += 1;
            return Ok(cached.clone());
        }
        self.stats.root_isolations += 1;
        let result = eval::real_roots(polys.get(poly), var, assignment)?;
        if matches!(result, RootsResult::Nullified) {
            self.stats.nullifications += 1;
        }
        self.roots.insert((prefix_key, poly), result.clone());
        Ok(result)
    }

    /// Whether `poly` vanishes identically in `var` under `assignment`.
    pub fn is_nullified(
        &mut self,
        polys: &PolyPool,
        prefix_key: u64,
        poly: PolyId,
        var: Var,
        assignment: &RealAssignment,
    ) -> Result<bool, EvalError> {
        Ok(matches!(
            self.real_roots(polys, prefix_key, poly, var, assignment)?,
            RootsResult::Nullified
        ))
    }

    /// Remove every polynomial and cached result at levels `>= var`.
    pub fn clear_from_level(&mut self, polys: &PolyPool, var: Var) {
        for v in (var as usize)..self.levels.len() {
            self.levels[v].clear();
            self.projected[v] = false;
        }
        self.roots
            .retain(|(_, id), _| polys.get(*id).level() < var as usize + 1);
    }

    /// Forget the sample-keyed caches (used when sample ids are reused
    /// after subtree invalidation).
    pub fn clear_sample_caches(&mut self) {
        self.roots.clear();
    }

    fn invalidate_projection_at(&mut self, var: Var) {
        // A new polynomial at a level requires redoing that level's
        // projection step.
        self.projected[var as usize] = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;
    use num_rational::BigRational;
    use rasat_math::Polynomial;

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
    fn factors_are_placed_by_level() {
        let mut polys = PolyPool::new();
        let mut proj = ProjectionPool::new(2, ProjectionConfig::default());
        // (x - 1) * (y - 2) splits across both levels.
        let p = &(&x() - &Polynomial::one()) * &(&y() - &Polynomial::constant(q(2)));
        let id = polys.intern(p);
        proj.add_polynomial(&mut polys, id);
        assert_eq!(proj.polys_at(0).count(), 1);
        assert_eq!(proj.polys_at(1).count(), 1);
    }

    #[test]
    fn projection_of_circle_reaches_level_zero() {
        let mut polys = PolyPool::new();
        let mut proj = ProjectionPool::new(2, ProjectionConfig::default());
        // x^2 + y^2 - 1, main variable y.
        let circle = &(&(&x() * &x()) + &(&y() * &y())) - &Polynomial::one();
        let id = polys.intern(circle);
        proj.add_polynomial(&mut polys, id);
        proj.project_level(&mut polys, 1);
        // The discriminant contributes a polynomial in x alone.
        assert!(proj.polys_at(0).count() >= 1);
    }

    #[test]
    fn root_isolation_is_cached() {
        let mut polys = PolyPool::new();
        let mut proj = ProjectionPool::new(1, ProjectionConfig::default());
        let p = polys.intern(&(&x() * &x()) - &Polynomial::constant(q(2)));
        let assignment = RealAssignment::default();
        let r1 = proj
            .real_roots(&polys, 0, p, 0, &assignment)
            .expect("isolation succeeds");
        let r2 = proj
            .real_roots(&polys, 0, p, 0, &assignment)
            .expect("isolation succeeds");
        assert_eq!(r1, r2);
        assert_eq!(proj.stats().cache_hits, 1);
        match r1 {
            RootsResult::Roots(roots) => assert_eq!(roots.len(), 2),
            RootsResult::Nullified => panic!("not nullified"),
        }
    }

    #[test]
    fn level_scoped_clearing() {
        let mut polys = PolyPool::new();
        let mut proj = ProjectionPool::new(2, ProjectionConfig::default());
        let circle = &(&(&x() * &x()) + &(&y() * &y())) - &Polynomial::one();
        let id = polys.intern(circle);
        proj.add_polynomial(&mut polys, id);
        proj.project_level(&mut polys, 1);
        proj.clear_from_level(&polys, 1);
        assert_eq!(proj.polys_at(1).count(), 0);
        // Level 0 keeps its projected polynomials.
        assert!(proj.polys_at(0).count() >= 1);
    }
}
