//! The CAD core.
//!
//! Drives projection and lifting over a fixed variable order. Per level
//! the core cycles through projecting (adding required projection
//! polynomials), lifting (extending the current sample by a root or
//! sector sample), evaluating (recording constraint truth values in the
//! sample's bitsets) and refuting (accumulating unsat intervals into a
//! covering of the level).
//!
//! A full covering at the top level is a global refutation; the conflict
//! graph collected along the way yields a minimal infeasible subset. A
//! sample satisfying every constraint at full depth is a model.

use rasat_core::{
    Answer, Bitset, CancellationFlag, Constraint, Model, PolyId, PolyPool,
};
use rasat_math::eval::{EvalError, RootsResult};
use rasat_math::{RealAlgebraicNumber, Var};
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, trace};

use crate::conflict::{generate_mis, row_weight, ConflictGraph, MisHeuristic};
use crate::covering::{CoveringStatus, LevelCovering, UnsatInterval};
use crate::lifting::{LiftingTree, SampleId};
use crate::onecell::{describe_cell, DelineatedPoly};
use crate::projection::{ProjectionConfig, ProjectionPool};

/// Configuration of the CAD engine.
#[derive(Debug, Clone, Default)]
pub struct CadConfig {
    /// Projection settings.
    pub projection: ProjectionConfig,
    /// Infeasible-subset policy.
    pub mis_heuristic: MisHeuristic,
}

/// Failures that abort a check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CadError {
    /// The exact kernel could not evaluate under the current assignment.
    #[error("evaluation failed: {0}")]
    Eval(#[from] EvalError),
    /// An internal invariant was violated; the check is halted.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

/// Counters for one engine instance.
#[derive(Debug, Clone, Default)]
pub struct CadStats {
    /// Calls to `check`.
    pub checks: u64,
    /// Constraint evaluations actually performed (cache misses).
    pub evaluations: u64,
    /// Samples that falsified at least one constraint.
    pub conflicts: u64,
    /// Full-depth samples visited.
    pub full_samples: u64,
    /// Coverings completed (levels refuted).
    pub coverings: u64,
    /// Nullifications or degenerate evaluations skipped.
    pub obstructions: u64,
}

enum LevelResult {
    Sat,
    Unsat(Bitset),
    Unknown,
}

/// The CAD engine over a fixed variable order `x0 < x1 < ...`.
#[derive(Debug)]
pub struct CadSolver {
    config: CadConfig,
    stats: CadStats,
    dim: usize,
    /// Slot per constraint; never reused so bitset indices stay stable.
    constraints: Vec<Option<Constraint>>,
    activity: Vec<f64>,
    projection: ProjectionPool,
    lifting: LiftingTree,
    /// Which constraints contributed each projection factor.
    poly_origins: FxHashMap<PolyId, Bitset>,
    /// Set when a nullification or degenerate evaluation was skipped; an
    /// UNSAT outcome is then weakened to UNKNOWN.
    incomplete: bool,
    /// Constraint index of a syntactically false input, if any.
    trivial_conflict: Option<usize>,
}

impl CadSolver {
    /// An engine for `dim` variables.
    pub fn new(dim: usize, config: CadConfig) -> Self {
        Self {
            projection: ProjectionPool::new(dim, config.projection.clone()),
            lifting: LiftingTree::new(dim),
            config,
            stats: CadStats::default(),
            dim,
            constraints: Vec::new(),
            activity: Vec::new(),
            poly_origins: FxHashMap::default(),
            incomplete: false,
            trivial_conflict: None,
        }
    }

    /// Current statistics.
    pub fn stats(&self) -> &CadStats {
        &self.stats
    }

    /// The live constraints with their indices.
    pub fn constraints(&self) -> impl Iterator<Item = (usize, Constraint)> + '_ {
        self.constraints
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.map(|c| (i, c)))
    }

    /// Add a constraint; returns its stable index.
    pub fn add_constraint(&mut self, polys: &mut PolyPool, constraint: Constraint) -> usize {
        let index = self.constraints.len();
        self.constraints.push(Some(constraint));
        self.activity.push(0.0);
        self.ensure_dim(polys.get(constraint.poly).level());
        debug!(constraint = %rasat_core::pool::display_constraint(polys, constraint), index, "cad: add");
        if polys.get(constraint.poly).is_constant() {
            let value = polys
                .get(constraint.poly)
                .constant_value()
                .map(|v| constraint.relation.holds_on(rasat_math::polynomial::Sign::of_rational(&v)));
            if value == Some(false) && self.trivial_conflict.is_none() {
                self.trivial_conflict = Some(index);
            }
            return index;
        }
        for factor in self.projection.add_polynomial(polys, constraint.poly) {
            self.poly_origins
                .entry(factor)
                .or_default()
                .set(index);
        }
        index
    }

    /// Remove a constraint. Lifting subtrees depending on it are
    /// invalidated; the projection is rebuilt from the surviving
    /// constraints.
    pub fn remove_constraint(&mut self, polys: &mut PolyPool, constraint: Constraint) {
        let Some(index) = self
            .constraints
            .iter()
            .position(|c| *c == Some(constraint))
        else {
            return;
        };
        debug!(index, "cad: remove");
        self.constraints[index] = None;
        if self.trivial_conflict == Some(index) {
            self.trivial_conflict = None;
        }
        self.lifting.invalidate_constraint(index);
        // Rebuild the projection from scratch; caches keyed by sample
        // prefix are dropped with it.
        self.projection = ProjectionPool::new(self.dim, self.config.projection.clone());
        self.projection.clear_sample_caches();
        self.poly_origins.clear();
        let live: Vec<(usize, Constraint)> = self.constraints().collect();
        for (idx, c) in live {
            if polys.get(c.poly).is_constant() {
                continue;
            }
            for factor in self.projection.add_polynomial(polys, c.poly) {
                self.poly_origins.entry(factor).or_default().set(idx);
            }
        }
    }

    fn ensure_dim(&mut self, level: usize) {
        if level > self.dim {
            self.dim = level;
            self.projection = ProjectionPool::new(self.dim, self.config.projection.clone());
            self.lifting.reset(self.dim);
            self.poly_origins.clear();
        }
    }

    /// Decide the conjunction of the added constraints. On SAT the model
    /// is populated with a satisfying point; on UNSAT an infeasible
    /// subset is derivable via [`CadSolver::infeasible_subset`].
    pub fn check(
        &mut self,
        polys: &mut PolyPool,
        cancel: &CancellationFlag,
        model: &mut Model,
    ) -> Result<Answer, CadError> {
        self.stats.checks += 1;
        self.incomplete = false;
        if let Some(index) = self.trivial_conflict {
            trace!(index, "cad: trivially false input");
            return Ok(Answer::Unsat);
        }
        if self.constraints().count() == 0 || self.dim == 0 {
            return Ok(Answer::Sat);
        }
        // Re-register factors (idempotent) and run the projection phase
        // from the highest level down.
        let live: Vec<(usize, Constraint)> = self.constraints().collect();
        for (idx, c) in &live {
            if polys.get(c.poly).is_constant() {
                continue;
            }
            for factor in self.projection.add_polynomial(polys, c.poly) {
                self.poly_origins.entry(factor).or_default().set(*idx);
            }
        }
        for var in (0..self.dim as Var).rev() {
            self.projection.project_level(polys, var);
        }
        let root = self.lifting.root();
        match self.lift_level(polys, cancel, 1, root, model)? {
            LevelResult::Sat => Ok(Answer::Sat),
            LevelResult::Unsat(_) if self.incomplete => Ok(Answer::Unknown),
            LevelResult::Unsat(_) => Ok(Answer::Unsat),
            LevelResult::Unknown => Ok(Answer::Unknown),
        }
    }

    /// One level of the lifting search.
    fn lift_level(
        &mut self,
        polys: &mut PolyPool,
        cancel: &CancellationFlag,
        level: usize,
        parent: SampleId,
        model: &mut Model,
    ) -> Result<LevelResult, CadError> {
        let var = (level - 1) as Var;
        let assignment = self.lifting.assignment_prefix(parent);
        let prefix_key = self.lifting.prefix_key(parent);
        // Roots of every projection polynomial at this level.
        let mut roots: Vec<(RealAlgebraicNumber, Bitset)> = Vec::new();
        let mut delineated: Vec<DelineatedPoly> = Vec::new();
        let level_polys: Vec<PolyId> = self.projection.polys_at(var).collect();
        for p in level_polys {
            match self
                .projection
                .real_roots(polys, prefix_key, p, var, &assignment)
            {
                Ok(RootsResult::Roots(rs)) => {
                    let deps = self.poly_origins.get(&p).cloned().unwrap_or_default();
                    for r in &rs {
                        roots.push((r.clone(), deps.clone()));
                    }
                    delineated.push(DelineatedPoly { poly: p, roots: rs });
                }
                Ok(RootsResult::Nullified) => {
                    trace!(poly = %polys.get(p), "cad: nullified, skipping");
                    self.stats.obstructions += 1;
                    self.incomplete = true;
                }
                Err(EvalError::Degenerate) => {
                    self.stats.obstructions += 1;
                    self.incomplete = true;
                }
                Err(err @ EvalError::Unassigned(_)) => {
                    return Err(CadError::Invariant(format!(
                        "projection polynomial not evaluable: {err}"
                    )));
                }
            }
        }
        let children = self.lifting.populate_children(parent, roots);
        let mut covering = LevelCovering::new();
        let mut unknown_seen = false;
        for (position, &child) in children.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(LevelResult::Unknown);
            }
            let falsified = match self.evaluate_at(polys, child, level) {
                Ok(falsified) => falsified,
                Err(CadError::Eval(EvalError::Degenerate)) => {
                    // Evaluation obstruction: the sample cannot be
                    // decided, so neither can a refutation of the level.
                    self.stats.obstructions += 1;
                    self.incomplete = true;
                    unknown_seen = true;
                    continue;
                }
                Err(err) => return Err(err),
            };
            if let Some(falsified) = falsified {
                self.stats.conflicts += 1;
                let interval =
                    self.cell_interval(&children, position, level, &falsified, &delineated);
                covering.add_interval(interval);
                continue;
            }
            if level == self.dim {
                self.stats.full_samples += 1;
                let full = self.lifting.assignment_prefix(child);
                for (v, value) in full {
                    model.assign(v, value);
                }
                return Ok(LevelResult::Sat);
            }
            match self.lift_level(polys, cancel, level + 1, child, model)? {
                LevelResult::Sat => return Ok(LevelResult::Sat),
                LevelResult::Unsat(origins) => {
                    let interval =
                        self.cell_interval(&children, position, level, &origins, &delineated);
                    covering.add_interval(interval);
                }
                LevelResult::Unknown => {
                    unknown_seen = true;
                }
            }
        }
        if unknown_seen {
            return Ok(LevelResult::Unknown);
        }
        match covering.compute_covering() {
            CoveringStatus::Full => {
                self.stats.coverings += 1;
                // Characterization exercises the one-cell projection; with
                // a complete projection the result is already present one
                // level down.
                if level > 1 {
                    let lower = covering.characterize(polys, var);
                    for id in lower {
                        self.projection.add_polynomial(polys, id);
                    }
                }
                Ok(LevelResult::Unsat(covering.covering_origins()))
            }
            _ => {
                // With a complete projection every cell is either refuted
                // or explored; a gap means an obstruction was skipped.
                self.incomplete = true;
                Ok(LevelResult::Unknown)
            }
        }
    }

    /// Evaluate every constraint whose level matches at the sample.
    /// Returns the set of falsified constraints, or `None` if all hold.
    fn evaluate_at(
        &mut self,
        polys: &PolyPool,
        sample: SampleId,
        level: usize,
    ) -> Result<Option<Bitset>, CadError> {
        let assignment = self.lifting.assignment_prefix(sample);
        let live: Vec<(usize, Constraint)> = self
            .constraints()
            .filter(|(_, c)| {
                let l = polys.get(c.poly).level();
                l == level && l > 0
            })
            .collect();
        for (index, constraint) in live {
            if self.lifting.sample(sample).evaluated_with.test(index) {
                continue;
            }
            self.stats.evaluations += 1;
            let sign = rasat_math::eval::sign_at(polys.get(constraint.poly), &assignment)?;
            let holds = constraint.relation.holds_on(sign);
            trace!(
                constraint = %rasat_core::pool::display_constraint(polys, constraint),
                holds,
                "cad: evaluate"
            );
            let node = self.lifting.sample_mut(sample);
            node.evaluated_with.set(index);
            if holds {
                node.evaluation.set(index);
            } else {
                self.activity[index] += 1.0;
            }
        }
        let falsified = self.lifting.sample(sample).falsified();
        Ok((!falsified.is_empty()).then_some(falsified))
    }

    /// The unsat interval for the cell of `children[position]`.
    fn cell_interval(
        &self,
        children: &[SampleId],
        position: usize,
        level: usize,
        origins: &Bitset,
        delineated: &[DelineatedPoly],
    ) -> UnsatInterval {
        let sample = self.lifting.sample(children[position]);
        let value = sample.value.clone().unwrap_or_else(|| {
            RealAlgebraicNumber::from_int(0)
        });
        let cell = describe_cell((level - 1) as Var, &value, delineated);
        if sample.is_section {
            let mut interval = UnsatInterval::point(value, origins.clone());
            interval.cell = Some(cell);
            return interval;
        }
        let lower = position
            .checked_sub(1)
            .and_then(|i| children.get(i))
            .and_then(|&id| self.lifting.sample(id).value.clone());
        let upper = children
            .get(position + 1)
            .and_then(|&id| self.lifting.sample(id).value.clone());
        UnsatInterval {
            lower,
            upper,
            lower_strict: true,
            upper_strict: true,
            origins: origins.clone(),
            cell: Some(cell),
        }
    }

    /// Extract an infeasible subset under the configured heuristic,
    /// expressed as constraints. Only meaningful after an UNSAT check.
    pub fn infeasible_subset(&self, polys: &PolyPool) -> Vec<Constraint> {
        if let Some(index) = self.trivial_conflict {
            if let Some(Some(c)) = self.constraints.get(index) {
                return vec![*c];
            }
        }
        let valid: Bitset = self
            .constraints()
            .map(|(i, _)| i)
            .collect();
        let mut graph = ConflictGraph::new(self.constraints.len());
        for id in self.lifting.live_samples() {
            let sample = self.lifting.sample(id);
            let mut falsified = sample.falsified();
            falsified.intersect_with(&valid);
            if !falsified.is_empty() {
                graph.add_sample(&falsified);
            }
        }
        let weights: Vec<f64> = self
            .constraints
            .iter()
            .enumerate()
            .map(|(i, c)| match c {
                Some(c) => {
                    let poly = polys.get(c.poly);
                    let complexity = poly.num_terms() as u32 + poly.total_degree();
                    row_weight(complexity, self.activity[i])
                }
                None => f64::INFINITY,
            })
            .collect();
        let mis = generate_mis(&graph, self.config.mis_heuristic, &weights);
        mis.into_iter()
            .filter_map(|i| self.constraints.get(i).copied().flatten())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;
    use num_rational::BigRational;
    use rasat_core::{ConstraintPool, Relation};
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

    struct Harness {
        polys: PolyPool,
        constraints: ConstraintPool,
        solver: CadSolver,
        cancel: CancellationFlag,
    }

    impl Harness {
        fn new(dim: usize) -> Self {
            Self {
                polys: PolyPool::new(),
                constraints: ConstraintPool::new(),
                solver: CadSolver::new(dim, CadConfig::default()),
                cancel: CancellationFlag::new(),
            }
        }

        fn add(&mut self, lhs: Polynomial, rel: Relation) -> Constraint {
            let id = self.constraints.intern(&mut self.polys, lhs, rel);
            let constraint = self.constraints.get(id);
            self.solver.add_constraint(&mut self.polys, constraint);
            constraint
        }

        fn check(&mut self) -> (Answer, Model) {
            let mut model = Model::new();
            let answer = self
                .solver
                .check(&mut self.polys, &self.cancel, &mut model)
                .expect("check succeeds");
            (answer, model)
        }
    }

    #[test]
    fn empty_input_is_sat() {
        let mut h = Harness::new(1);
        let (answer, model) = h.check();
        assert_eq!(answer, Answer::Sat);
        assert!(model.is_empty());
    }

    #[test]
    fn sum_of_square_and_one_is_unsat() {
        // x^2 + 1 = 0
        let mut h = Harness::new(1);
        let c = h.add(
            &(&x() * &x()) + &Polynomial::one(),
            Relation::Eq,
        );
        let (answer, _) = h.check();
        assert_eq!(answer, Answer::Unsat);
        let core = h.solver.infeasible_subset(&h.polys);
        assert_eq!(core, vec![c]);
    }

    #[test]
    fn sqrt_two_is_found() {
        // x^2 - 2 = 0 and x > 0
        let mut h = Harness::new(1);
        h.add(&(&x() * &x()) - &Polynomial::constant(q(2)), Relation::Eq);
        h.add(x(), Relation::Greater);
        let (answer, model) = h.check();
        assert_eq!(answer, Answer::Sat);
        let value = model.get(0).expect("x assigned");
        assert!(*value > RealAlgebraicNumber::from_int(1));
        assert!(*value < RealAlgebraicNumber::from_int(2));
        assert!(!value.is_rational());
        // The model satisfies the input exactly.
        let p = &(&x() * &x()) - &Polynomial::constant(q(2));
        assert_eq!(model.satisfies(&p, Relation::Eq), Ok(true));
    }

    #[test]
    fn hyperbola_and_line_unsat() {
        // x*y = 1 and x + y = 0
        let mut h = Harness::new(2);
        let a = h.add(&(&x() * &y()) - &Polynomial::one(), Relation::Eq);
        let b = h.add(&x() + &y(), Relation::Eq);
        let (answer, _) = h.check();
        assert_eq!(answer, Answer::Unsat);
        let core = h.solver.infeasible_subset(&h.polys);
        assert!(core.contains(&a));
        assert!(core.contains(&b));
    }

    #[test]
    fn circle_and_halfplane_unsat() {
        // x^2 + y^2 <= 1 and x + y >= 2
        let mut h = Harness::new(2);
        let circle = h.add(
            &(&(&x() * &x()) + &(&y() * &y())) - &Polynomial::one(),
            Relation::Leq,
        );
        let line = h.add(
            &(&x() + &y()) - &Polynomial::constant(q(2)),
            Relation::Geq,
        );
        let (answer, _) = h.check();
        assert_eq!(answer, Answer::Unsat);
        let core = h.solver.infeasible_subset(&h.polys);
        assert!(core.contains(&circle));
        assert!(core.contains(&line));
    }

    #[test]
    fn cubic_with_disequality() {
        // (x-1)(x-2)(x-3) = 0 and x != 2
        let mut h = Harness::new(1);
        let cubic = &(&(&x() - &Polynomial::one())
            * &(&x() - &Polynomial::constant(q(2))))
            * &(&x() - &Polynomial::constant(q(3)));
        h.add(cubic, Relation::Eq);
        h.add(&x() - &Polynomial::constant(q(2)), Relation::Neq);
        let (answer, model) = h.check();
        assert_eq!(answer, Answer::Sat);
        let value = model.get(0).expect("x assigned");
        let one = RealAlgebraicNumber::from_int(1);
        let three = RealAlgebraicNumber::from_int(3);
        assert!(*value == one || *value == three);
    }

    #[test]
    fn trivially_false_constant() {
        let mut h = Harness::new(1);
        let c = h.add(Polynomial::one(), Relation::Less);
        let (answer, _) = h.check();
        assert_eq!(answer, Answer::Unsat);
        assert_eq!(h.solver.infeasible_subset(&h.polys), vec![c]);
    }

    #[test]
    fn incremental_add_after_sat() {
        let mut h = Harness::new(1);
        h.add(x(), Relation::Greater);
        let (first, _) = h.check();
        assert_eq!(first, Answer::Sat);
        h.add(&x() + &Polynomial::one(), Relation::Less);
        let (second, _) = h.check();
        assert_eq!(second, Answer::Unsat);
    }

    #[test]
    fn remove_constraint_restores_sat() {
        let mut h = Harness::new(1);
        h.add(x(), Relation::Greater);
        let tight = h.add(&x() + &Polynomial::one(), Relation::Less);
        let (first, _) = h.check();
        assert_eq!(first, Answer::Unsat);
        h.solver.remove_constraint(&mut h.polys, tight);
        let (second, _) = h.check();
        assert_eq!(second, Answer::Sat);
    }

    #[test]
    fn cancellation_yields_unknown() {
        let mut h = Harness::new(2);
        h.add(
            &(&(&x() * &x()) + &(&y() * &y())) - &Polynomial::one(),
            Relation::Leq,
        );
        h.cancel.cancel();
        let (answer, _) = h.check();
        assert_eq!(answer, Answer::Unknown);
    }
}
