//! The module dispatcher and public solver.

use num_bigint::BigInt;
use num_rational::BigRational;
use rasat_cad::{CadConfig, CadError, CadSolver};
use rasat_core::{
    Answer, CancellationFlag, Constraint, ConstraintPool, FormulaId, FormulaKind, FormulaPool,
    Model, PolyPool, Relation,
};
use rasat_math::{Polynomial, RealAlgebraicNumber, Var};
use rasat_vs::{UnknownReason, VsConfig, VsError, VsOutcome, VsSolver};
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::{linearize, IntervalBackend, LinearBackend, LinearOutcome};
use crate::es::EsPreprocessor;

/// Configuration of the whole pipeline.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// VS engine settings.
    pub vs: VsConfig,
    /// CAD engine settings.
    pub cad: CadConfig,
    /// Run the equality-substitution preprocessor.
    pub use_es: bool,
    /// Consult the linear backend before the nonlinear engines.
    pub use_linear_backend: bool,
    /// Maximum depth of integer branch-and-bound splits.
    pub max_branch_depth: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            vs: VsConfig::default(),
            cad: CadConfig::default(),
            use_es: true,
            use_linear_backend: true,
            max_branch_depth: 64,
        }
    }
}

/// Fatal solver failures; recoverable conditions surface as
/// [`Answer::Unknown`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    /// The input is outside the supported fragment.
    #[error("malformed input: {0}")]
    Malformed(String),
    /// The externally maintained budget was exhausted.
    #[error("resource limit exceeded")]
    ResourceExhausted,
    /// CAD engine invariant violation.
    #[error(transparent)]
    Cad(#[from] CadError),
    /// VS engine invariant violation.
    #[error(transparent)]
    Vs(#[from] VsError),
}

/// Process exit code for a frontend: `0` on a decided answer, `1` on
/// unknown, `2` on malformed input, `3` on resource exhaustion.
pub fn exit_code(result: &Result<Answer, SolverError>) -> i32 {
    match result {
        Ok(answer) => answer.exit_code(),
        Err(SolverError::Malformed(_)) => 2,
        Err(SolverError::ResourceExhausted) => 3,
        Err(_) => 1,
    }
}

/// Counters across the pipeline.
#[derive(Debug, Clone, Default)]
pub struct SolverStats {
    /// Calls to `check`.
    pub checks: u64,
    /// Preprocessor runs.
    pub es_runs: u64,
    /// Linear backend consultations.
    pub linear_checks: u64,
    /// VS engine checks.
    pub vs_checks: u64,
    /// CAD engine checks.
    pub cad_checks: u64,
    /// Branch-and-bound splits performed.
    pub branch_splits: u64,
}

enum ConjOutcome {
    Sat(Model),
    Unsat(Vec<usize>),
    Unknown,
}

/// The public solver: assertion stack, pools, and the engine pipeline.
#[derive(Debug)]
pub struct Solver {
    config: SolverConfig,
    stats: SolverStats,
    polys: PolyPool,
    constraints: ConstraintPool,
    formulas: FormulaPool,
    assertions: Vec<FormulaId>,
    marks: Vec<usize>,
    integer_vars: FxHashSet<Var>,
    cancel: CancellationFlag,
    model: Option<Model>,
    core: Vec<FormulaId>,
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver {
    /// A solver with the default strategy.
    pub fn new() -> Self {
        Self::with_config(SolverConfig::default())
    }

    /// A solver with an explicit configuration.
    pub fn with_config(config: SolverConfig) -> Self {
        Self {
            config,
            stats: SolverStats::default(),
            polys: PolyPool::new(),
            constraints: ConstraintPool::new(),
            formulas: FormulaPool::new(),
            assertions: Vec::new(),
            marks: Vec::new(),
            integer_vars: FxHashSet::default(),
            cancel: CancellationFlag::new(),
            model: None,
            core: Vec::new(),
        }
    }

    /// Current statistics.
    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    /// The shared cancellation flag; cancelling makes every engine
    /// return unknown at its next loop iteration.
    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Declare a variable as integer-valued.
    pub fn declare_int(&mut self, var: Var) {
        self.integer_vars.insert(var);
    }

    /// Build and assert the constraint `lhs ~ 0`. Returns the asserted
    /// formula.
    pub fn assert_constraint(&mut self, lhs: Polynomial, relation: Relation) -> FormulaId {
        let formula = self.mk_constraint(lhs, relation);
        self.assert_formula(formula);
        formula
    }

    /// Build a constraint formula without asserting it.
    pub fn mk_constraint(&mut self, lhs: Polynomial, relation: Relation) -> FormulaId {
        let cid = self.constraints.intern(&mut self.polys, lhs, relation);
        self.formulas.mk_constraint(cid)
    }

    /// Access the formula pool for building composite assertions.
    pub fn formulas_mut(&mut self) -> &mut FormulaPool {
        &mut self.formulas
    }

    /// Assert a formula.
    pub fn assert_formula(&mut self, formula: FormulaId) {
        self.assertions.push(formula);
    }

    /// The asserted formulas, in assertion order.
    pub fn assertions(&self) -> &[FormulaId] {
        &self.assertions
    }

    /// Save the assertion stack.
    pub fn push(&mut self) {
        self.marks.push(self.assertions.len());
    }

    /// Restore the assertion stack to the matching [`Solver::push`].
    pub fn pop(&mut self) {
        if let Some(mark) = self.marks.pop() {
            self.assertions.truncate(mark);
        }
    }

    /// The model of the last satisfiable check.
    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    /// The infeasible subset of the last unsatisfiable check, as a
    /// subset of the asserted formulas.
    pub fn unsat_core(&self) -> &[FormulaId] {
        &self.core
    }

    /// Decide the conjunction of the current assertions.
    pub fn check(&mut self) -> Result<Answer, SolverError> {
        self.stats.checks += 1;
        self.model = None;
        self.core.clear();
        let conjunction = self.formulas.mk_and(self.assertions.clone());
        // Preprocess.
        let (residue, eliminated) = if self.config.use_es {
            self.stats.es_runs += 1;
            let mut es = EsPreprocessor::new();
            for &var in &self.integer_vars {
                es.set_integer(var);
            }
            let run = es.run(
                &mut self.polys,
                &mut self.constraints,
                &mut self.formulas,
                conjunction,
            );
            (run.formula, run.eliminated)
        } else {
            (conjunction, Vec::new())
        };
        match self.formulas.kind(residue) {
            FormulaKind::False => {
                self.core = self.assertions.clone();
                return Ok(Answer::Unsat);
            }
            FormulaKind::True => {
                let mut model = Model::new();
                if !self.complete_model(&mut model, &eliminated) {
                    warn!("model completion failed on a trivially true residue");
                }
                self.model = Some(model);
                return Ok(Answer::Sat);
            }
            _ => {}
        }
        // The engines decide conjunctions of constraint literals.
        let Some(literals) = self.to_conjunction(residue) else {
            debug!("residue is not a conjunction of literals");
            return Ok(Answer::Unknown);
        };
        let conj: Vec<Constraint> = literals.iter().map(|(c, _)| *c).collect();
        let provenance = self.literal_provenance(&literals);
        // The pre-preprocessing conjunction, for model fallbacks that
        // must cover eliminated variables.
        let original_conj: Option<Vec<Constraint>> = self
            .to_conjunction(conjunction)
            .map(|ls| ls.into_iter().map(|(c, _)| c).collect());
        match self.solve_conjunction(&conj, 0)? {
            ConjOutcome::Sat(mut model) => {
                if !self.complete_model(&mut model, &eliminated) {
                    // Fall back to a CAD run over the original input to
                    // cover the eliminated variables exactly.
                    let fallback = original_conj.unwrap_or(conj);
                    if let (Answer::Sat, Some(full)) = self.run_cad_for_model(&fallback)? {
                        self.model = Some(full);
                        return Ok(Answer::Sat);
                    }
                    return Ok(Answer::Unknown);
                }
                self.model = Some(model);
                Ok(Answer::Sat)
            }
            ConjOutcome::Unsat(indices) => {
                self.core = match provenance {
                    Some(map) => {
                        let mut core: Vec<FormulaId> = indices
                            .iter()
                            .filter_map(|i| map.get(i).copied())
                            .collect();
                        core.sort();
                        core.dedup();
                        core
                    }
                    // Provenance was lost in preprocessing; report every
                    // assertion.
                    None => self.assertions.clone(),
                };
                Ok(Answer::Unsat)
            }
            ConjOutcome::Unknown => Ok(Answer::Unknown),
        }
    }

    /// Flatten a residue into constraint literals; negations become
    /// negated relations.
    fn to_conjunction(&mut self, residue: FormulaId) -> Option<Vec<(Constraint, FormulaId)>> {
        let children: Vec<FormulaId> = match self.formulas.kind(residue) {
            FormulaKind::And(children) => children.clone(),
            _ => vec![residue],
        };
        let mut out = Vec::with_capacity(children.len());
        for child in children {
            match self.formulas.kind(child) {
                FormulaKind::Constraint(cid) => {
                    out.push((self.constraints.get(*cid), child));
                }
                FormulaKind::Not(inner) => {
                    let FormulaKind::Constraint(cid) = self.formulas.kind(*inner) else {
                        return None;
                    };
                    let constraint = self.constraints.get(*cid);
                    let lhs = self.polys.get(constraint.poly).clone();
                    let negated = self.constraints.intern(
                        &mut self.polys,
                        lhs,
                        constraint.relation.negated(),
                    );
                    out.push((self.constraints.get(negated), child));
                }
                _ => return None,
            }
        }
        Some(out)
    }

    /// Map conjunction indices back to asserted formulas, when every
    /// literal is itself an assertion.
    fn literal_provenance(
        &self,
        literals: &[(Constraint, FormulaId)],
    ) -> Option<FxHashMap<usize, FormulaId>> {
        let asserted: FxHashSet<FormulaId> = self.assertions.iter().copied().collect();
        let mut map = FxHashMap::default();
        for (index, (_, formula)) in literals.iter().enumerate() {
            if !asserted.contains(formula) {
                return None;
            }
            map.insert(index, *formula);
        }
        Some(map)
    }

    /// Decide a conjunction of constraints, with integer branch-and-bound
    /// on top.
    fn solve_conjunction(
        &mut self,
        conj: &[Constraint],
        depth: u32,
    ) -> Result<ConjOutcome, SolverError> {
        if self.cancel.is_cancelled() {
            return Ok(ConjOutcome::Unknown);
        }
        // Early linear refutation on the de-linearized image.
        if self.config.use_linear_backend {
            self.stats.linear_checks += 1;
            let (image, _table) = linearize(&self.polys, conj);
            let mut backend = IntervalBackend::new();
            if let LinearOutcome::Unsat(indices) = backend.check_linear(&image) {
                debug!("linear backend refuted the conjunction");
                return Ok(ConjOutcome::Unsat(indices));
            }
        }
        self.stats.vs_checks += 1;
        let mut vs = VsSolver::new(self.config.vs.clone());
        for &var in &self.integer_vars {
            vs.set_integer(var);
        }
        for &c in conj {
            vs.add_constraint(c);
        }
        let outcome = vs.check(&mut self.polys, &mut self.constraints, &self.cancel)?;
        match outcome {
            VsOutcome::Sat(model) => Ok(ConjOutcome::Sat(model)),
            VsOutcome::Unsat(core) => Ok(ConjOutcome::Unsat(core)),
            VsOutcome::SatNoModel => match self.run_cad_for_model(conj)? {
                (Answer::Sat, Some(model)) => self.integral_or_branch(conj, model, depth),
                _ => Ok(ConjOutcome::Unknown),
            },
            VsOutcome::Branch { var, below, origins } => {
                self.branch(conj, var, below, &origins, depth)
            }
            VsOutcome::Unknown(UnknownReason::TooHighDegree(_)) => {
                // Escalate the whole conjunction to the CAD engine.
                match self.run_cad(conj)? {
                    (Answer::Sat, Some(model), _) => self.integral_or_branch(conj, model, depth),
                    (Answer::Unsat, _, Some(core)) => Ok(ConjOutcome::Unsat(core)),
                    _ => Ok(ConjOutcome::Unknown),
                }
            }
            VsOutcome::Unknown(_) => Ok(ConjOutcome::Unknown),
        }
    }

    /// Accept a model whose integer variables are integral, or split.
    fn integral_or_branch(
        &mut self,
        conj: &[Constraint],
        model: Model,
        depth: u32,
    ) -> Result<ConjOutcome, SolverError> {
        let offending = self.integer_vars.iter().find_map(|&var| {
            model.get(var).and_then(|value| {
                if value.is_integer() {
                    None
                } else {
                    Some((var, value.clone()))
                }
            })
        });
        match offending {
            None => Ok(ConjOutcome::Sat(model)),
            Some((var, value)) => {
                let below = value.floor();
                self.branch(conj, var, below, &[], depth)
            }
        }
    }

    /// Branch-and-bound split `x <= below  or  x >= below + 1`.
    fn branch(
        &mut self,
        conj: &[Constraint],
        var: Var,
        below: BigInt,
        origins: &[usize],
        depth: u32,
    ) -> Result<ConjOutcome, SolverError> {
        if depth >= self.config.max_branch_depth {
            return Ok(ConjOutcome::Unknown);
        }
        self.stats.branch_splits += 1;
        debug!(var, %below, "branch and bound split");
        let base = conj.len();
        let left_bound = &Polynomial::variable(var)
            - &Polynomial::constant(BigRational::from_integer(below.clone()));
        let right_bound = &Polynomial::variable(var)
            - &Polynomial::constant(BigRational::from_integer(below + BigInt::from(1)));
        let mut unknown_seen = false;
        let mut cores: Vec<usize> = origins.to_vec();
        for (bound, relation) in [(left_bound, Relation::Leq), (right_bound, Relation::Geq)] {
            let cid = self
                .constraints
                .intern(&mut self.polys, bound, relation);
            let mut side = conj.to_vec();
            side.push(self.constraints.get(cid));
            match self.solve_conjunction(&side, depth + 1)? {
                ConjOutcome::Sat(model) => return Ok(ConjOutcome::Sat(model)),
                ConjOutcome::Unsat(core) => {
                    cores.extend(core.into_iter().filter(|&i| i < base));
                }
                ConjOutcome::Unknown => unknown_seen = true,
            }
        }
        if unknown_seen {
            return Ok(ConjOutcome::Unknown);
        }
        cores.sort_unstable();
        cores.dedup();
        Ok(ConjOutcome::Unsat(cores))
    }

    /// Run the CAD engine on a conjunction.
    fn run_cad(
        &mut self,
        conj: &[Constraint],
    ) -> Result<(Answer, Option<Model>, Option<Vec<usize>>), SolverError> {
        self.stats.cad_checks += 1;
        let dim = conj
            .iter()
            .map(|c| self.polys.get(c.poly).level())
            .max()
            .unwrap_or(0);
        let mut cad = CadSolver::new(dim, self.config.cad.clone());
        for &c in conj {
            cad.add_constraint(&mut self.polys, c);
        }
        let mut model = Model::new();
        let answer = cad.check(&mut self.polys, &self.cancel, &mut model)?;
        match answer {
            Answer::Sat => Ok((Answer::Sat, Some(model), None)),
            Answer::Unsat => {
                let subset = cad.infeasible_subset(&self.polys);
                let indices: Vec<usize> = subset
                    .into_iter()
                    .filter_map(|needle| conj.iter().position(|c| *c == needle))
                    .collect();
                Ok((Answer::Unsat, None, Some(indices)))
            }
            Answer::Unknown => Ok((Answer::Unknown, None, None)),
        }
    }

    fn run_cad_for_model(
        &mut self,
        conj: &[Constraint],
    ) -> Result<(Answer, Option<Model>), SolverError> {
        let (answer, model, _) = self.run_cad(conj)?;
        Ok((answer, model))
    }

    /// Fill in the variables eliminated by preprocessing (later
    /// substitutions first) and default everything else to zero. Returns
    /// `false` when an eliminated variable cannot be evaluated over the
    /// model.
    fn complete_model(&self, model: &mut Model, eliminated: &[(Var, Polynomial)]) -> bool {
        for (var, replacement) in eliminated.iter().rev() {
            for v in replacement.vars() {
                if model.get(v).is_none() {
                    model.assign(v, RealAlgebraicNumber::from_int(0));
                }
            }
            let mut rational = FxHashMap::default();
            let mut algebraic: Option<Var> = None;
            for v in replacement.vars() {
                match model.get(v).and_then(|value| value.to_rational()) {
                    Some(value) => {
                        rational.insert(v, value.clone());
                    }
                    None if algebraic.is_none() => algebraic = Some(v),
                    None => return false,
                }
            }
            let value = match algebraic {
                None => match replacement.evaluate(&rational) {
                    Some(value) => RealAlgebraicNumber::Rational(value),
                    None => return false,
                },
                Some(v) => {
                    // One algebraic input: an affine image is still
                    // representable exactly.
                    let partially = replacement.substitute_rational(&rational);
                    if partially.degree_in(v) != 1 {
                        return false;
                    }
                    let coeffs = partially.coeffs_wrt(v);
                    let (Some(scale), Some(offset)) =
                        (coeffs[1].constant_value(), coeffs[0].constant_value())
                    else {
                        return false;
                    };
                    match model.get(v) {
                        Some(base) => base.affine(&scale, &offset),
                        None => return false,
                    }
                }
            };
            model.assign(*var, value);
        }
        true
    }
}
