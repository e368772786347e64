//! The virtual substitution engine.
//!
//! A best-first search over the state tree: the ranking always yields the
//! state with the smallest `(valuation, backend valuation, id)` key, and
//! the state's status decides the work done — applying the pending
//! substitution, taking the next sub-result combination, or generating
//! test candidates and spawning children.
//!
//! Conflicts travel upwards: a refuted child stores its reason at the
//! father, and a father whose cases are exhausted folds the reasons and
//! passes them on, until the root is refuted and the folded reasons form
//! the infeasible subset.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use rasat_core::{
    Answer, Bitset, CancellationFlag, Constraint, ConstraintPool, Model, PolyPool, Relation,
};
use rasat_math::{Polynomial, RealAlgebraicNumber, UniPoly, Var};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, trace};

use crate::bounds::VariableBounds;
use crate::condition::{Condition, ConditionId};
use crate::sqrt_expr::SqrtExpr;
use crate::state::{CondConjunction, StateId, StateStatus, StateTree, SubResult};
use crate::substitution::{
    apply, test_candidates, CandidateResult, Substitution, SubstitutionType,
};

/// Configuration of the VS engine.
#[derive(Debug, Clone)]
pub struct VsConfig {
    /// Pick any equation before every inequality when choosing the next
    /// condition to eliminate.
    pub prefer_equation_over_all: bool,
    /// Snap epsilon candidates to a rational strictly between the root
    /// and the next root up during model construction.
    pub snap_epsilon_to_rational: bool,
    /// Generate the plus-infinity candidate for integer variables.
    pub integer_branch_and_bound: bool,
    /// Hard bound on main-loop iterations.
    pub max_iterations: u64,
}

impl Default for VsConfig {
    fn default() -> Self {
        Self {
            prefer_equation_over_all: true,
            snap_epsilon_to_rational: false,
            integer_branch_and_bound: true,
            max_iterations: 100_000,
        }
    }
}

/// Counters for one engine instance.
#[derive(Debug, Clone, Default)]
pub struct VsStats {
    /// Main-loop iterations.
    pub iterations: u64,
    /// States allocated.
    pub states_created: u64,
    /// Substitutions applied to a condition list.
    pub substitutions_applied: u64,
    /// Test candidates generated.
    pub test_candidates: u64,
    /// Conflict sets recorded.
    pub conflicts: u64,
    /// Integer gcd refutations.
    pub gcd_prunes: u64,
    /// Test values snapped to the next integer.
    pub int_snaps: u64,
    /// Branch-and-bound requests emitted.
    pub branch_requests: u64,
}

/// Why the engine gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnknownReason {
    /// Some condition has degree three or more in its elimination
    /// variable; the residue should go to a stronger backend.
    TooHighDegree(Vec<Constraint>),
    /// The shared cancellation flag was raised.
    Cancelled,
    /// The iteration safety net fired.
    IterationLimit,
    /// The search space drained without a verdict.
    Incomplete,
}

/// Result of a VS check.
#[derive(Debug, Clone)]
pub enum VsOutcome {
    /// Satisfiable with a verified model.
    Sat(Model),
    /// Satisfiable, but the model needs a backend to construct.
    SatNoModel,
    /// Unsatisfiable; the input indices form an infeasible subset.
    Unsat(Vec<usize>),
    /// An integer variable needs a branch-and-bound split
    /// `x <= floor(v)  or  x >= floor(v) + 1`.
    Branch {
        /// The integer variable.
        var: Var,
        /// Floor of the offending rational value.
        below: BigInt,
        /// Premise: input indices of the substitution's origins.
        origins: Vec<usize>,
    },
    /// No verdict.
    Unknown(UnknownReason),
}

impl VsOutcome {
    /// Collapse to the tri-valued answer.
    pub fn answer(&self) -> Answer {
        match self {
            VsOutcome::Sat(_) | VsOutcome::SatNoModel => Answer::Sat,
            VsOutcome::Unsat(_) => Answer::Unsat,
            VsOutcome::Branch { .. } | VsOutcome::Unknown(_) => Answer::Unknown,
        }
    }
}

/// Engine errors (internal invariant violations).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VsError {
    /// An internal invariant was violated; the check is halted.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

/// The VS engine.
#[derive(Debug)]
pub struct VsSolver {
    config: VsConfig,
    stats: VsStats,
    input: Vec<Constraint>,
    integer_vars: FxHashSet<Var>,
    tree: StateTree,
    ranking: BTreeSet<(u64, u64, u32)>,
    next_condition_id: u32,
    deferred: Vec<StateId>,
    var_count: u64,
    last_fingerprint: Option<(u32, u64, usize, bool, usize)>,
    repeat_count: u32,
}

impl VsSolver {
    /// A fresh engine.
    pub fn new(config: VsConfig) -> Self {
        Self {
            config,
            stats: VsStats::default(),
            input: Vec::new(),
            integer_vars: FxHashSet::default(),
            tree: StateTree::new(),
            ranking: BTreeSet::new(),
            next_condition_id: 0,
            deferred: Vec::new(),
            var_count: 0,
            last_fingerprint: None,
            repeat_count: 0,
        }
    }

    /// Current statistics.
    pub fn stats(&self) -> &VsStats {
        &self.stats
    }

    /// Declare a variable as integer-valued.
    pub fn set_integer(&mut self, var: Var) {
        self.integer_vars.insert(var);
    }

    /// Add an input constraint; returns its index (used in infeasible
    /// subsets).
    pub fn add_constraint(&mut self, constraint: Constraint) -> usize {
        self.input.push(constraint);
        self.input.len() - 1
    }

    /// Remove an input constraint.
    pub fn remove_constraint(&mut self, constraint: Constraint) {
        self.input.retain(|c| *c != constraint);
    }

    /// The current input.
    pub fn input(&self) -> &[Constraint] {
        &self.input
    }

    fn fresh_condition_id(&mut self) -> ConditionId {
        let id = ConditionId(self.next_condition_id);
        self.next_condition_id += 1;
        id
    }

    fn ranking_key(&self, id: StateId) -> (u64, u64, u32) {
        let state = self.tree.state(id);
        (state.valuation, state.backend_valuation, id.0)
    }

    fn enqueue(&mut self, id: StateId) {
        let key = self.ranking_key(id);
        self.ranking.insert(key);
    }

    /// Decide the conjunction of the input constraints.
    pub fn check(
        &mut self,
        polys: &mut PolyPool,
        constraints: &mut ConstraintPool,
        cancel: &CancellationFlag,
    ) -> Result<VsOutcome, VsError> {
        self.tree.clear();
        self.ranking.clear();
        self.deferred.clear();
        self.next_condition_id = 0;
        self.last_fingerprint = None;
        self.repeat_count = 0;
        let mut vars: FxHashSet<Var> = FxHashSet::default();
        for c in &self.input {
            vars.extend(polys.get(c.poly).vars());
        }
        self.var_count = vars.len() as u64;
        // Seed the root with the input conditions.
        let root = self.tree.alloc_root();
        self.stats.states_created += 1;
        let mut seeded: Vec<Condition> = Vec::new();
        for (index, constraint) in self.input.clone().into_iter().enumerate() {
            let lhs = polys.get(constraint.poly).clone();
            let cid = constraints.intern(polys, lhs, constraint.relation);
            match constraints.consistency(polys, cid) {
                Some(true) => continue,
                Some(false) => return Ok(VsOutcome::Unsat(vec![index])),
                None => {}
            }
            let id = self.fresh_condition_id();
            seeded.push(Condition::new(id, cid, 0, Bitset::from_indices([index])));
        }
        let valuation = self.var_count;
        {
            let state = self.tree.state_mut(root);
            state.conditions = seeded;
            state.valuation = valuation;
        }
        self.enqueue(root);

        loop {
            if cancel.is_cancelled() {
                return Ok(VsOutcome::Unknown(UnknownReason::Cancelled));
            }
            self.stats.iterations += 1;
            if self.stats.iterations > self.config.max_iterations {
                return Ok(VsOutcome::Unknown(UnknownReason::IterationLimit));
            }
            let Some(&key) = self.ranking.iter().next() else {
                break;
            };
            self.ranking.remove(&key);
            let id = StateId(key.2);
            let state = self.tree.state(id);
            if state.marked_as_deleted || state.inconsistent {
                continue;
            }
            if self.fingerprint_repeats(id) {
                return Ok(VsOutcome::Unknown(UnknownReason::IterationLimit));
            }
            let status = self.tree.state(id).status;
            trace!(state = %id, ?status, "vs: process");
            let outcome = match status {
                StateStatus::SubstitutionToApply => self.substitute_all(polys, constraints, id)?,
                StateStatus::CombineSubresults => self.combine(polys, constraints, id)?,
                StateStatus::TestCandidateToGenerate => {
                    self.generate(polys, constraints, id)?
                }
            };
            if let Some(outcome) = outcome {
                return Ok(outcome);
            }
        }
        if let Some(&deferred) = self.deferred.iter().find(|&&s| {
            !self.tree.state(s).marked_as_deleted && !self.tree.state(s).inconsistent
        }) {
            let residue: Vec<Constraint> = self
                .tree
                .state(deferred)
                .conditions
                .iter()
                .map(|c| constraints.get(c.constraint))
                .collect();
            return Ok(VsOutcome::Unknown(UnknownReason::TooHighDegree(residue)));
        }
        Ok(VsOutcome::Unknown(UnknownReason::Incomplete))
    }

    /// Termination safety net: abort when the observable state of the
    /// engine repeats across consecutive iterations.
    fn fingerprint_repeats(&mut self, id: StateId) -> bool {
        let state = self.tree.state(id);
        let unconsidered = state
            .conditions
            .iter()
            .filter(|c| c.recently_added)
            .count();
        let fingerprint = (
            id.0,
            state.valuation,
            state.subst_results.iter().map(Vec::len).sum::<usize>(),
            state.take_sub_result_comb_again,
            unconsidered,
        );
        if self.last_fingerprint == Some(fingerprint) {
            self.repeat_count += 1;
        } else {
            self.repeat_count = 0;
            self.last_fingerprint = Some(fingerprint);
        }
        self.repeat_count > 4
    }

    /// Apply the pending substitution to the father's condition list.
    fn substitute_all(
        &mut self,
        polys: &mut PolyPool,
        constraints: &mut ConstraintPool,
        id: StateId,
    ) -> Result<Option<VsOutcome>, VsError> {
        let Some(parent) = self.tree.state(id).parent else {
            return Err(VsError::Invariant(
                "substitution pending at the root".into(),
            ));
        };
        let Some(subst) = self.tree.state(id).substitution.clone() else {
            return Err(VsError::Invariant("child without a substitution".into()));
        };
        self.stats.substitutions_applied += 1;
        let parent_conditions = self.tree.state(parent).conditions.clone();
        let mut results: Vec<SubResult> = Vec::new();
        for condition in &parent_conditions {
            let constraint = constraints.get(condition.constraint);
            let poly = polys.get(constraint.poly).clone();
            if !poly.contains_var(subst.var) {
                results.push(vec![vec![(condition.constraint, condition.origins.clone())]]);
                continue;
            }
            let mut origins = condition.origins.clone();
            origins.union_with(&subst.origins);
            let dnf = apply(&subst, &poly, constraint.relation);
            let converted = self.convert_dnf(polys, constraints, dnf, &origins);
            if converted.is_empty() {
                // Every branch collapsed: fresh conflict at the parent.
                self.stats.conflicts += 1;
                trace!(state = %id, "vs: substitution refutes a condition");
                return Ok(self.report_refuted(id, origins));
            }
            results.push(converted);
        }
        // Side conditions enter as one extra conjunction.
        let side_dnf = vec![subst.side_conditions.clone()];
        let side = self.convert_dnf(polys, constraints, side_dnf, &subst.origins);
        if side.is_empty() {
            self.stats.conflicts += 1;
            return Ok(self.report_refuted(id, subst.origins.clone()));
        }
        results.push(side);
        let state = self.tree.state_mut(id);
        state.subst_results = results;
        state.status = StateStatus::CombineSubresults;
        self.enqueue(id);
        Ok(None)
    }

    /// Intern a DNF, dropping trivially true constraints and trivially
    /// false conjunctions.
    fn convert_dnf(
        &mut self,
        polys: &mut PolyPool,
        constraints: &mut ConstraintPool,
        dnf: Vec<Vec<(Polynomial, Relation)>>,
        origins: &Bitset,
    ) -> SubResult {
        let mut out: SubResult = Vec::new();
        'conjunctions: for conj in dnf {
            let mut converted: CondConjunction = Vec::new();
            for (poly, relation) in conj {
                let cid = constraints.intern(polys, poly, relation);
                match constraints.consistency(polys, cid) {
                    Some(true) => continue,
                    Some(false) => continue 'conjunctions,
                    None => converted.push((cid, origins.clone())),
                }
            }
            out.push(converted);
        }
        out
    }

    /// Pick the next sub-result combination and rebuild the condition
    /// list from it.
    fn combine(
        &mut self,
        polys: &mut PolyPool,
        constraints: &mut ConstraintPool,
        id: StateId,
    ) -> Result<Option<VsOutcome>, VsError> {
        if self.tree.state(id).parent.is_none() {
            return Err(VsError::Invariant("combination work at the root".into()));
        }
        let advanced = self.tree.state_mut(id).next_combination();
        self.tree.state_mut(id).take_sub_result_comb_again = false;
        if !advanced {
            let folded = self.tree.state(id).folded_conflicts();
            return Ok(self.report_refuted(id, folded));
        }
        // Merge the chosen disjuncts, deduplicating by constraint.
        let mut chosen: Vec<(rasat_core::ConstraintId, Bitset)> = Vec::new();
        {
            let state = self.tree.state(id);
            for conjunction in state.current_combination() {
                for (cid, origins) in conjunction {
                    match chosen.iter_mut().find(|(c, _)| c == cid) {
                        Some((_, existing)) => existing.union_with(origins),
                        None => chosen.push((*cid, origins.clone())),
                    }
                }
            }
        }
        // A trivially false condition rejects this combination only.
        for (cid, origins) in &chosen {
            if constraints.consistency(polys, *cid) == Some(false) {
                self.stats.conflicts += 1;
                let state = self.tree.state_mut(id);
                state.add_conflict(None, origins.clone());
                state.status = StateStatus::CombineSubresults;
                state.take_sub_result_comb_again = true;
                self.enqueue(id);
                return Ok(None);
            }
        }
        let depth = self.tree.state(id).depth;
        let mut conditions = Vec::with_capacity(chosen.len());
        for (cid, origins) in chosen {
            if constraints.consistency(polys, cid) == Some(true) {
                continue;
            }
            let fresh = self.fresh_condition_id();
            conditions.push(Condition::new(fresh, cid, depth, origins));
        }
        let state = self.tree.state_mut(id);
        state.conditions = conditions;
        state.status = StateStatus::TestCandidateToGenerate;
        self.enqueue(id);
        Ok(None)
    }

    /// Generate test candidates for the best condition's variable and
    /// spawn children.
    fn generate(
        &mut self,
        polys: &mut PolyPool,
        constraints: &mut ConstraintPool,
        id: StateId,
    ) -> Result<Option<VsOutcome>, VsError> {
        if self.tree.state(id).conditions.is_empty() {
            debug!(state = %id, "vs: satisfiable leaf");
            return Ok(Some(self.build_model(polys, constraints, id)));
        }
        // Bounds from univariate linear conditions; contradictions refute
        // the current combination.
        let bounds = self.collect_bounds(polys, constraints, id);
        if let Some(conflict) = bounds.conflict() {
            self.stats.conflicts += 1;
            return Ok(self.reject_combination(id, conflict));
        }
        // Integer gcd pruning on linear equations.
        let gcd_conflict = {
            let state = self.tree.state(id);
            state.conditions.iter().find_map(|condition| {
                let constraint = constraints.get(condition.constraint);
                if constraint.relation == Relation::Eq
                    && self.int_equation_unsolvable(polys.get(constraint.poly))
                {
                    Some(condition.origins.clone())
                } else {
                    None
                }
            })
        };
        if let Some(conflict) = gcd_conflict {
            self.stats.gcd_prunes += 1;
            self.stats.conflicts += 1;
            return Ok(self.reject_combination(id, conflict));
        }
        let Some(best) = self.best_condition(polys, constraints, id) else {
            // Only constant conditions remain; they were all true.
            return Ok(Some(self.build_model(polys, constraints, id)));
        };
        let var = best.1;
        let mut candidates: Vec<Substitution> = Vec::new();
        let mut relevant_origins = Bitset::new();
        let mut any_non_equation = false;
        let mut too_high_degree = false;
        {
            let state = self.tree.state(id);
            for condition in &state.conditions {
                let constraint = constraints.get(condition.constraint);
                let poly = polys.get(constraint.poly);
                if poly.degree_in(var) == 0 {
                    continue;
                }
                relevant_origins.union_with(&condition.origins);
                if constraint.relation != Relation::Eq {
                    any_non_equation = true;
                }
                match test_candidates(poly, constraint.relation, var, &condition.origins) {
                    CandidateResult::Candidates(generated) => candidates.extend(generated),
                    CandidateResult::TooHighDegree => {
                        too_high_degree = true;
                    }
                }
            }
        }
        if too_high_degree {
            debug!(state = %id, "vs: degree too high, deferring to backend");
            self.tree.state_mut(id).cannot_be_solved = true;
            self.deferred.push(id);
            return Ok(None);
        }
        if any_non_equation {
            candidates.push(Substitution::minus_infinity(var, Bitset::new()));
            self.tree.state_mut(id).minus_infinity_added = true;
            if self.config.integer_branch_and_bound && self.integer_vars.contains(&var) {
                candidates.push(Substitution::plus_infinity(var, Bitset::new()));
                self.tree.state_mut(id).plus_infinity_added = true;
            }
        }
        let filtered = self.filter_candidates(id, var, &bounds, candidates);
        for condition in &mut self.tree.state_mut(id).conditions {
            condition.recently_added = false;
            condition.flag = true;
        }
        if filtered.is_empty() {
            self.stats.conflicts += 1;
            return Ok(self.reject_combination(id, relevant_origins));
        }
        for candidate in filtered {
            self.stats.test_candidates += 1;
            let child = self.tree.alloc_child(id, candidate);
            self.stats.states_created += 1;
            let valuation = self.var_count.saturating_sub(self.tree.state(child).depth as u64);
            self.tree.state_mut(child).valuation = valuation;
            self.enqueue(child);
        }
        self.tree.state_mut(id).has_children_to_insert = false;
        Ok(None)
    }

    /// Drop candidates whose side conditions are already false, whose
    /// value violates an exact variable bound, or that duplicate another
    /// candidate. Integer variables snap non-integer rational roots of
    /// inequalities to the next integer up; equations with a non-integer
    /// constant root are refuted outright.
    fn filter_candidates(
        &mut self,
        id: StateId,
        var: Var,
        bounds: &VariableBounds,
        candidates: Vec<Substitution>,
    ) -> Vec<Substitution> {
        let mut out: Vec<Substitution> = Vec::new();
        let integer = self.integer_vars.contains(&var);
        for mut candidate in candidates {
            let side_false = candidate.side_conditions.iter().any(|(poly, rel)| {
                poly.constant_value()
                    .map(|v| !rel.holds_on(rasat_math::polynomial::Sign::of_rational(&v)))
                    .unwrap_or(false)
            });
            if side_false {
                continue;
            }
            if let Some(term) = &candidate.term {
                if let Some(value) = term.to_rational() {
                    if integer && !value.is_integer() {
                        if candidate.kind == SubstitutionType::Normal {
                            // Integer roots only; snap the value upward.
                            self.stats.int_snaps += 1;
                            let snapped = value.floor() + BigRational::one();
                            candidate.term =
                                Some(SqrtExpr::from_polynomial(Polynomial::constant(snapped)));
                        }
                        // Epsilon candidates move off the root anyway.
                    }
                    if let Some(term) = &candidate.term {
                        if let Some(value) = term.to_rational() {
                            if let Err(bound_origins) = bounds.admits(var, &value) {
                                let mut conflict = bound_origins;
                                conflict.union_with(&candidate.origins);
                                self.tree.state_mut(id).add_conflict(None, conflict);
                                continue;
                            }
                        }
                    }
                }
            }
            let duplicate = out.iter().any(|existing| {
                existing.kind == candidate.kind && existing.term == candidate.term
            });
            if !duplicate {
                out.push(candidate);
            }
        }
        out
    }

    /// Whether a linear equation over integer variables has no integer
    /// solution because the gcd of the variable coefficients does not
    /// divide the constant term.
    fn int_equation_unsolvable(&self, poly: &Polynomial) -> bool {
        if !poly.is_linear() || poly.is_constant() {
            return false;
        }
        if !poly.vars().iter().all(|v| self.integer_vars.contains(v)) {
            return false;
        }
        let mut gcd = BigInt::zero();
        let mut constant = BigInt::zero();
        for (coeff, mono) in poly.terms() {
            if !coeff.denom().is_one() {
                return false;
            }
            if mono.is_unit() {
                constant = coeff.numer().clone();
            } else {
                gcd = big_gcd(&gcd, coeff.numer());
            }
        }
        if constant.is_zero() || gcd <= BigInt::one() {
            return false;
        }
        !(constant % gcd).is_zero()
    }

    /// Exact bounds from univariate linear conditions.
    fn collect_bounds(
        &self,
        polys: &PolyPool,
        constraints: &ConstraintPool,
        id: StateId,
    ) -> VariableBounds {
        let mut bounds = VariableBounds::new();
        for condition in &self.tree.state(id).conditions {
            let constraint = constraints.get(condition.constraint);
            let poly = polys.get(constraint.poly);
            let vars = poly.vars();
            let [var] = vars[..] else {
                continue;
            };
            if poly.degree_in(var) != 1 {
                continue;
            }
            let coeffs = poly.coeffs_wrt(var);
            let (Some(slope), Some(offset)) =
                (coeffs[1].constant_value(), coeffs[0].constant_value())
            else {
                continue;
            };
            if slope.is_zero() {
                continue;
            }
            let root = -offset / &slope;
            let positive = slope > BigRational::zero();
            let origins = condition.origins.clone();
            match (constraint.relation, positive) {
                (Relation::Eq, _) => {
                    bounds.add_lower(var, root.clone(), false, origins.clone());
                    bounds.add_upper(var, root, false, origins);
                }
                (Relation::Less, true) | (Relation::Greater, false) => {
                    bounds.add_upper(var, root, true, origins);
                }
                (Relation::Leq, true) | (Relation::Geq, false) => {
                    bounds.add_upper(var, root, false, origins);
                }
                (Relation::Greater, true) | (Relation::Less, false) => {
                    bounds.add_lower(var, root, true, origins);
                }
                (Relation::Geq, true) | (Relation::Leq, false) => {
                    bounds.add_lower(var, root, false, origins);
                }
                (Relation::Neq, _) => {}
            }
        }
        bounds
    }

    /// Best-condition heuristic: score by degree in the condition's main
    /// variable, monomial count, equation-before-inequality and
    /// linearity of the coefficients; smaller wins, ties break on the
    /// condition id. Returns the condition id and its main variable.
    fn best_condition(
        &self,
        polys: &PolyPool,
        constraints: &ConstraintPool,
        id: StateId,
    ) -> Option<(ConditionId, Var)> {
        let state = self.tree.state(id);
        let mut best: Option<((u64, u32, u32, u32, u32), ConditionId, Var)> = None;
        for condition in &state.conditions {
            let constraint = constraints.get(condition.constraint);
            let poly = polys.get(constraint.poly);
            let Some(var) = poly.main_var() else {
                continue;
            };
            let degree = poly.degree_in(var);
            let monomials = poly.num_terms() as u32;
            let is_equation = u32::from(constraint.relation != Relation::Eq);
            let linear_coeffs = u32::from(
                !poly
                    .coeffs_wrt(var)
                    .iter()
                    .all(rasat_math::Polynomial::is_linear),
            );
            let equation_first = if self.config.prefer_equation_over_all {
                u64::from(constraint.relation != Relation::Eq)
            } else {
                0
            };
            let score = (
                equation_first,
                degree,
                monomials,
                is_equation,
                linear_coeffs,
            );
            let better = match &best {
                None => true,
                Some((best_score, best_id, _)) => {
                    score < *best_score || (score == *best_score && condition.id < *best_id)
                }
            };
            if better {
                best = Some((score, condition.id, var));
            }
        }
        best.map(|(_, cid, var)| (cid, var))
    }

    /// Reject the current combination of a state; the state retries with
    /// the next combination (or folds and reports upwards).
    fn reject_combination(&mut self, id: StateId, conflict: Bitset) -> Option<VsOutcome> {
        self.tree.state_mut(id).add_conflict(None, conflict);
        if self.tree.state(id).parent.is_some() {
            let state = self.tree.state_mut(id);
            state.status = StateStatus::CombineSubresults;
            state.take_sub_result_comb_again = true;
            self.enqueue(id);
            None
        } else {
            let folded = self.tree.state(id).folded_conflicts();
            Some(VsOutcome::Unsat(folded.iter().collect()))
        }
    }

    /// A state is refuted in its entirety: record the reason at the
    /// father (composing with its other reasons) and walk upwards while
    /// fathers are exhausted.
    fn report_refuted(&mut self, id: StateId, conflict: Bitset) -> Option<VsOutcome> {
        let mut current = id;
        let mut reason = conflict;
        loop {
            {
                let state = self.tree.state_mut(current);
                state.inconsistent = true;
            }
            self.tree.mark_deleted(current);
            let Some(father) = self.tree.state(current).parent else {
                return Some(VsOutcome::Unsat(reason.iter().collect()));
            };
            self.tree
                .state_mut(father)
                .add_conflict(Some(current), reason.clone());
            if self.tree.live_children(father).count() > 0 {
                return None;
            }
            if self.tree.state(father).parent.is_some() {
                // The father may still have untried combinations.
                let state = self.tree.state_mut(father);
                state.status = StateStatus::CombineSubresults;
                state.take_sub_result_comb_again = true;
                self.enqueue(father);
                return None;
            }
            // The root has no combinations: fold and conclude.
            reason = self.tree.state(father).folded_conflicts();
            current = father;
        }
    }

    /// Construct and verify a model for a satisfiable leaf by walking the
    /// substitution chain from the leaf to the root, deepest first.
    fn build_model(
        &mut self,
        polys: &PolyPool,
        constraints: &ConstraintPool,
        leaf: StateId,
    ) -> VsOutcome {
        let mut chain: Vec<(Var, Substitution, Option<StateId>)> = Vec::new();
        let mut cursor = leaf;
        while let Some(parent) = self.tree.state(cursor).parent {
            if let Some(subst) = self.tree.state(cursor).substitution.clone() {
                chain.push((subst.var, subst, Some(parent)));
            }
            cursor = parent;
        }
        let mut input_vars: FxHashSet<Var> = FxHashSet::default();
        for c in &self.input {
            input_vars.extend(polys.get(c.poly).vars());
        }
        for attempt in 0..45u32 {
            let delta = BigRational::new(BigInt::one(), BigInt::from(2u64) << attempt.min(62));
            let big = BigRational::from_integer(BigInt::from(2u64) << attempt.min(62));
            match self.try_model(polys, constraints, &chain, &input_vars, &delta, &big) {
                ModelAttempt::Verified(model) => return VsOutcome::Sat(model),
                ModelAttempt::NonIntegral { var, value, origins } => {
                    self.stats.branch_requests += 1;
                    return VsOutcome::Branch {
                        var,
                        below: value.floor().to_integer(),
                        origins: origins.iter().collect(),
                    };
                }
                ModelAttempt::Retry => continue,
                ModelAttempt::GiveUp => break,
            }
        }
        VsOutcome::SatNoModel
    }

    fn try_model(
        &self,
        polys: &PolyPool,
        constraints: &ConstraintPool,
        chain: &[(Var, Substitution, Option<StateId>)],
        input_vars: &FxHashSet<Var>,
        delta: &BigRational,
        big: &BigRational,
    ) -> ModelAttempt {
        let mut model = Model::new();
        for (var, subst, parent) in chain {
            let value: RealAlgebraicNumber = match subst.kind {
                SubstitutionType::Normal => match self.eval_term(subst, &model) {
                    Some(value) => value,
                    None => return ModelAttempt::GiveUp,
                },
                SubstitutionType::PlusEpsilon => {
                    let Some(base) = self.eval_term(subst, &model) else {
                        return ModelAttempt::GiveUp;
                    };
                    let Some(base) = base.to_rational().cloned() else {
                        return ModelAttempt::GiveUp;
                    };
                    if self.integer_vars.contains(var) {
                        RealAlgebraicNumber::Rational(base.floor() + BigRational::one())
                    } else if self.config.snap_epsilon_to_rational {
                        match self.snap_above(polys, constraints, *parent, *var, &base, &model) {
                            Some(snapped) => RealAlgebraicNumber::Rational(snapped),
                            None => RealAlgebraicNumber::Rational(&base + delta),
                        }
                    } else {
                        RealAlgebraicNumber::Rational(&base + delta)
                    }
                }
                SubstitutionType::MinusInfinity => {
                    RealAlgebraicNumber::Rational(-big.clone())
                }
                SubstitutionType::PlusInfinity => RealAlgebraicNumber::Rational(big.clone()),
                SubstitutionType::Invalid => return ModelAttempt::GiveUp,
            };
            model.assign(*var, value);
        }
        for &var in input_vars {
            if model.get(var).is_none() {
                model.assign(var, RealAlgebraicNumber::from_int(0));
            }
        }
        // Exact verification against the original input.
        for constraint in &self.input {
            match model.satisfies(polys.get(constraint.poly), constraint.relation) {
                Ok(true) => {}
                Ok(false) => return ModelAttempt::Retry,
                Err(_) => return ModelAttempt::GiveUp,
            }
        }
        // Integer variables must take integer values.
        for (var, subst, _) in chain {
            if self.integer_vars.contains(var) {
                if let Some(value) = model.get(*var) {
                    if let Some(rational) = value.to_rational() {
                        if !rational.is_integer() {
                            return ModelAttempt::NonIntegral {
                                var: *var,
                                value: rational.clone(),
                                origins: subst.origins.clone(),
                            };
                        }
                    } else {
                        return ModelAttempt::GiveUp;
                    }
                }
            }
        }
        ModelAttempt::Verified(model)
    }

    /// Evaluate a substitution term under a (rational) partial model.
    fn eval_term(&self, subst: &Substitution, model: &Model) -> Option<RealAlgebraicNumber> {
        let term = subst.term.as_ref()?;
        let mut needed: FxHashSet<Var> = FxHashSet::default();
        for component in [&term.p, &term.q, &term.r, &term.s] {
            needed.extend(component.vars());
        }
        let mut rational: FxHashMap<Var, BigRational> = FxHashMap::default();
        for var in needed {
            rational.insert(var, model.get(var)?.to_rational()?.clone());
        }
        let p = term.p.evaluate(&rational)?;
        let s = term.s.evaluate(&rational)?;
        if s.is_zero() {
            return None;
        }
        if term.is_polynomial_fraction() {
            return Some(RealAlgebraicNumber::Rational(p / s));
        }
        let q = term.q.evaluate(&rational)?;
        let r = term.r.evaluate(&rational)?;
        if r.is_negative() {
            return None;
        }
        if q.is_zero() {
            return Some(RealAlgebraicNumber::Rational(p / s));
        }
        // The value is a root of (s*x - p)^2 - q^2 r; pick the branch by
        // the sign of q/s.
        let s2 = &s * &s;
        let poly = UniPoly::new(vec![
            &(&p * &p) - &(&(&q * &q) * &r),
            -(BigRational::from_integer(BigInt::from(2)) * &p * &s),
            s2,
        ]);
        let roots = RealAlgebraicNumber::real_roots(&poly);
        let take_upper = (q / s) > BigRational::zero();
        match (roots.first(), roots.last()) {
            (Some(first), Some(last)) => Some(if take_upper {
                last.clone()
            } else {
                first.clone()
            }),
            _ => None,
        }
    }

    /// A rational strictly between `base` and the next root above it
    /// among the parent state's conditions.
    fn snap_above(
        &self,
        polys: &PolyPool,
        constraints: &ConstraintPool,
        parent: Option<StateId>,
        var: Var,
        base: &BigRational,
        model: &Model,
    ) -> Option<BigRational> {
        let parent = parent?;
        let mut next: Option<RealAlgebraicNumber> = None;
        let base_ran = RealAlgebraicNumber::Rational(base.clone());
        for condition in &self.tree.state(parent).conditions {
            let constraint = constraints.get(condition.constraint);
            let poly = polys.get(constraint.poly);
            if !poly.contains_var(var) {
                continue;
            }
            let roots = rasat_math::eval::real_roots(poly, var, model.assignment()).ok()?;
            if let rasat_math::eval::RootsResult::Roots(roots) = roots {
                for root in roots {
                    if root > base_ran && next.as_ref().map_or(true, |n| root < *n) {
                        next = Some(root);
                    }
                }
            }
        }
        let next = next?;
        Some(rasat_math::algebraic::number::rational_between(
            &base_ran, &next,
        ))
    }
}

enum ModelAttempt {
    Verified(Model),
    NonIntegral {
        var: Var,
        value: BigRational,
        origins: Bitset,
    },
    Retry,
    GiveUp,
}

fn big_gcd(a: &BigInt, b: &BigInt) -> BigInt {
    let mut a = a.abs();
    let mut b = b.abs();
    while !b.is_zero() {
        let r = &a % &b;
        a = b;
        b = r;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

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
        solver: VsSolver,
        cancel: CancellationFlag,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(VsConfig::default())
        }

        fn with_config(config: VsConfig) -> Self {
            Self {
                polys: PolyPool::new(),
                constraints: ConstraintPool::new(),
                solver: VsSolver::new(config),
                cancel: CancellationFlag::new(),
            }
        }

        fn add(&mut self, lhs: Polynomial, rel: Relation) -> usize {
            let id = self.constraints.intern(&mut self.polys, lhs, rel);
            self.solver.add_constraint(self.constraints.get(id))
        }

        fn check(&mut self) -> VsOutcome {
            self.solver
                .check(&mut self.polys, &mut self.constraints, &self.cancel)
                .expect("check succeeds")
        }
    }

    #[test]
    fn empty_input_is_sat() {
        let mut h = Harness::new();
        let VsOutcome::Sat(model) = h.check() else {
            panic!("expected sat");
        };
        assert!(model.is_empty());
    }

    #[test]
    fn single_strict_bound_is_sat() {
        let mut h = Harness::new();
        h.add(x(), Relation::Greater);
        let VsOutcome::Sat(model) = h.check() else {
            panic!("expected sat");
        };
        assert!(*model.get(0).expect("x assigned") > RealAlgebraicNumber::from_int(0));
    }

    #[test]
    fn opposing_strict_bounds_are_unsat() {
        let mut h = Harness::new();
        let a = h.add(x(), Relation::Greater);
        let b = h.add(x(), Relation::Less);
        let VsOutcome::Unsat(core) = h.check() else {
            panic!("expected unsat");
        };
        assert!(core.contains(&a));
        assert!(core.contains(&b));
    }

    #[test]
    fn interval_constraints_give_interior_point() {
        // 0 < x and x < 1.
        let mut h = Harness::new();
        h.add(x(), Relation::Greater);
        h.add(&x() - &Polynomial::one(), Relation::Less);
        let VsOutcome::Sat(model) = h.check() else {
            panic!("expected sat");
        };
        let value = model.get(0).expect("x assigned");
        assert!(*value > RealAlgebraicNumber::from_int(0));
        assert!(*value < RealAlgebraicNumber::from_int(1));
    }

    #[test]
    fn linear_system_two_vars() {
        // x + y = 2 and x - y = 0 has the solution x = y = 1.
        let mut h = Harness::new();
        h.add(&(&x() + &y()) - &Polynomial::constant(q(2)), Relation::Eq);
        h.add(&x() - &y(), Relation::Eq);
        let VsOutcome::Sat(model) = h.check() else {
            panic!("expected sat");
        };
        assert_eq!(
            model.get(0).and_then(|v| v.to_rational()).cloned(),
            Some(q(1))
        );
        assert_eq!(
            model.get(1).and_then(|v| v.to_rational()).cloned(),
            Some(q(1))
        );
    }

    #[test]
    fn square_plus_one_unsat() {
        let mut h = Harness::new();
        let c = h.add(&(&x() * &x()) + &Polynomial::one(), Relation::Eq);
        let VsOutcome::Unsat(core) = h.check() else {
            panic!("expected unsat");
        };
        assert_eq!(core, vec![c]);
    }

    #[test]
    fn sqrt_two_model_from_radical() {
        // x^2 - 2 = 0 and x > 0.
        let mut h = Harness::new();
        h.add(&(&x() * &x()) - &Polynomial::constant(q(2)), Relation::Eq);
        h.add(x(), Relation::Greater);
        let VsOutcome::Sat(model) = h.check() else {
            panic!("expected sat with model");
        };
        let value = model.get(0).expect("x assigned");
        assert!(!value.is_rational());
        assert!(*value > RealAlgebraicNumber::from_int(1));
        assert!(*value < RealAlgebraicNumber::from_int(2));
    }

    #[test]
    fn quadratic_inequality_with_negative_discriminant() {
        // x^2 + 1 > 0 is valid.
        let mut h = Harness::new();
        h.add(&(&x() * &x()) + &Polynomial::one(), Relation::Greater);
        assert!(matches!(h.check(), VsOutcome::Sat(_)));
    }

    #[test]
    fn hyperbola_and_line_unsat() {
        // x*y = 1 and x + y = 0.
        let mut h = Harness::new();
        let a = h.add(&(&x() * &y()) - &Polynomial::one(), Relation::Eq);
        let b = h.add(&x() + &y(), Relation::Eq);
        let VsOutcome::Unsat(core) = h.check() else {
            panic!("expected unsat");
        };
        assert!(core.contains(&a));
        assert!(core.contains(&b));
    }

    #[test]
    fn gcd_pruning_refutes_integer_system() {
        // 3x - 5y = 1, x + y = 0, x >= 0 over the integers.
        let mut h = Harness::new();
        h.solver.set_integer(0);
        h.solver.set_integer(1);
        let a = h.add(
            &(&x().scale(&q(3)) - &y().scale(&q(5))) - &Polynomial::one(),
            Relation::Eq,
        );
        let b = h.add(&x() + &y(), Relation::Eq);
        h.add(x(), Relation::Geq);
        let VsOutcome::Unsat(core) = h.check() else {
            panic!("expected unsat");
        };
        assert!(core.contains(&a));
        assert!(core.contains(&b));
        assert!(h.solver.stats().gcd_prunes > 0);
    }

    #[test]
    fn cubic_defers_to_backend() {
        let mut h = Harness::new();
        h.add(&x().pow(3) - &Polynomial::constant(q(2)), Relation::Eq);
        let VsOutcome::Unknown(UnknownReason::TooHighDegree(residue)) = h.check() else {
            panic!("expected too-high-degree");
        };
        assert!(!residue.is_empty());
    }

    #[test]
    fn trivially_false_input() {
        let mut h = Harness::new();
        let c = h.add(Polynomial::one(), Relation::Less);
        let VsOutcome::Unsat(core) = h.check() else {
            panic!("expected unsat");
        };
        assert_eq!(core, vec![c]);
    }

    #[test]
    fn cancellation_yields_unknown() {
        let mut h = Harness::new();
        h.add(x(), Relation::Greater);
        h.cancel.cancel();
        assert!(matches!(
            h.check(),
            VsOutcome::Unknown(UnknownReason::Cancelled)
        ));
    }

    #[test]
    fn epsilon_snapping_config_still_sat() {
        let mut h = Harness::with_config(VsConfig {
            snap_epsilon_to_rational: true,
            ..VsConfig::default()
        });
        h.add(x(), Relation::Greater);
        h.add(&x() - &Polynomial::one(), Relation::Less);
        let VsOutcome::Sat(model) = h.check() else {
            panic!("expected sat");
        };
        let value = model.get(0).expect("x assigned");
        assert!(*value > RealAlgebraicNumber::from_int(0));
        assert!(*value < RealAlgebraicNumber::from_int(1));
    }

    #[test]
    fn integer_interval_needs_integer_point() {
        // 2x >= 1 and 2x <= 3 over the integers: x = 1.
        let mut h = Harness::new();
        h.solver.set_integer(0);
        h.add(&x().scale(&q(2)) - &Polynomial::one(), Relation::Geq);
        h.add(&x().scale(&q(2)) - &Polynomial::constant(q(3)), Relation::Leq);
        match h.check() {
            VsOutcome::Sat(model) => {
                let value = model.get(0).expect("x assigned");
                assert_eq!(value.to_rational().cloned(), Some(q(1)));
            }
            VsOutcome::Branch { var, below, .. } => {
                assert_eq!(var, 0);
                assert!(below == BigInt::from(0) || below == BigInt::from(1));
            }
            other => panic!("expected sat or branch, got {other:?}"),
        }
    }
}
