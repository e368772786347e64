//! Equality-substitution preprocessing.
//!
//! Rewrites a formula to a fixed point by eliminating linear equalities
//! as substitutions and Boolean literals as truth-value substitutions.
//! Two scoped side tables are maintained along the recursion: arithmetic
//! substitutions (variable to polynomial) and Boolean substitutions
//! (formula to truth value). Inside a conjunction all linear equalities
//! are processed first, then the remaining subformulas, repeating until
//! nothing new is found or a subformula collapses to false.
//!
//! Substitutions eliminated at the outermost level are recorded so the
//! final model can be completed for the eliminated variables.

use num_rational::BigRational;
use num_traits::Zero;
use rasat_core::{
    ConstraintPool, FormulaId, FormulaKind, FormulaPool, PolyPool, Relation,
};
use rasat_math::{Polynomial, Var};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

/// Result of one preprocessing run.
#[derive(Debug, Clone)]
pub struct EsRun {
    /// The rewritten formula.
    pub formula: FormulaId,
    /// The substitutions applied at the outermost level, in application
    /// order; used to complete models for eliminated variables.
    pub eliminated: Vec<(Var, Polynomial)>,
}

/// The preprocessor; holds the scoped substitution tables.
#[derive(Debug, Default)]
pub struct EsPreprocessor {
    bool_subs: FxHashMap<FormulaId, bool>,
    arith_subs: FxHashMap<Var, Polynomial>,
    outermost_subs: Vec<(Var, Polynomial)>,
    integer_vars: rustc_hash::FxHashSet<Var>,
}

impl EsPreprocessor {
    /// A fresh preprocessor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a variable as integer-valued: it is only substituted away
    /// when the substitution preserves integrality.
    pub fn set_integer(&mut self, var: Var) {
        self.integer_vars.insert(var);
    }

    /// Rewrite `formula` to its fixed point.
    pub fn run(
        &mut self,
        polys: &mut PolyPool,
        constraints: &mut ConstraintPool,
        formulas: &mut FormulaPool,
        formula: FormulaId,
    ) -> EsRun {
        self.bool_subs.clear();
        self.arith_subs.clear();
        self.outermost_subs.clear();
        let rewritten = self.eliminate(polys, constraints, formulas, formula, true);
        debug!(from = %formula, to = %rewritten, "es: preprocessing done");
        EsRun {
            formula: rewritten,
            eliminated: self.outermost_subs.clone(),
        }
    }

    fn eliminate(
        &mut self,
        polys: &mut PolyPool,
        constraints: &mut ConstraintPool,
        formulas: &mut FormulaPool,
        formula: FormulaId,
        outermost: bool,
    ) -> FormulaId {
        if let Some(&truth) = self.bool_subs.get(&formula) {
            return if truth {
                formulas.mk_true()
            } else {
                formulas.mk_false()
            };
        }
        let result = match formulas.kind(formula).clone() {
            FormulaKind::And(children) => {
                self.eliminate_and(polys, constraints, formulas, children, outermost)
            }
            FormulaKind::Ite(condition, then_branch, else_branch) => {
                let cond = self.eliminate(polys, constraints, formulas, condition, false);
                match formulas.kind(cond).clone() {
                    FormulaKind::True => {
                        self.eliminate(polys, constraints, formulas, then_branch, false)
                    }
                    FormulaKind::False => {
                        self.eliminate(polys, constraints, formulas, else_branch, false)
                    }
                    kind => {
                        // The condition's substitution holds only inside
                        // the branch it guards: the positive case in the
                        // then branch, the negated condition's in the
                        // else branch.
                        let positive_sub = match &kind {
                            FormulaKind::Constraint(cid) => {
                                let constraint = constraints.get(*cid);
                                extract_substitution(
                                    polys.get(constraint.poly),
                                    constraint.relation,
                                    &self.integer_vars,
                                )
                            }
                            _ => None,
                        };
                        let negative_sub = match &kind {
                            FormulaKind::Not(inner) => match formulas.kind(*inner) {
                                FormulaKind::Constraint(cid) => {
                                    let constraint = constraints.get(*cid);
                                    extract_substitution(
                                        polys.get(constraint.poly),
                                        constraint.relation,
                                        &self.integer_vars,
                                    )
                                }
                                _ => None,
                            },
                            _ => None,
                        };
                        let then_scoped = self.scoped(cond, true, positive_sub, |this, p, c, f| {
                            this.eliminate(p, c, f, then_branch, false)
                        }, polys, constraints, formulas);
                        let else_scoped = self.scoped(cond, false, negative_sub, |this, p, c, f| {
                            this.eliminate(p, c, f, else_branch, false)
                        }, polys, constraints, formulas);
                        formulas.mk_ite(cond, then_scoped, else_scoped)
                    }
                }
            }
            FormulaKind::Or(children) => {
                let rewritten: Vec<FormulaId> = children
                    .into_iter()
                    .map(|c| self.eliminate(polys, constraints, formulas, c, false))
                    .collect();
                formulas.mk_or(rewritten)
            }
            FormulaKind::Xor(children) => {
                let rewritten: Vec<FormulaId> = children
                    .into_iter()
                    .map(|c| self.eliminate(polys, constraints, formulas, c, false))
                    .collect();
                formulas.mk_xor(rewritten)
            }
            FormulaKind::Iff(children) => {
                let rewritten: Vec<FormulaId> = children
                    .into_iter()
                    .map(|c| self.eliminate(polys, constraints, formulas, c, false))
                    .collect();
                formulas.mk_iff(rewritten)
            }
            FormulaKind::Not(inner) => {
                let rewritten = self.eliminate(polys, constraints, formulas, inner, false);
                formulas.mk_not(rewritten)
            }
            FormulaKind::Implies(premise, conclusion) => {
                let p = self.eliminate(polys, constraints, formulas, premise, false);
                let c = self.eliminate(polys, constraints, formulas, conclusion, false);
                formulas.mk_implies(p, c)
            }
            FormulaKind::Constraint(cid) => {
                self.rewrite_constraint(polys, constraints, formulas, cid)
            }
            FormulaKind::Exists(vars, body) => {
                let rewritten = self.eliminate(polys, constraints, formulas, body, false);
                formulas.mk_exists(vars, rewritten)
            }
            FormulaKind::Forall(vars, body) => {
                let rewritten = self.eliminate(polys, constraints, formulas, body, false);
                formulas.mk_forall(vars, rewritten)
            }
            FormulaKind::True
            | FormulaKind::False
            | FormulaKind::Bool(_) => formula,
        };
        if let Some(&truth) = self.bool_subs.get(&result) {
            return if truth {
                formulas.mk_true()
            } else {
                formulas.mk_false()
            };
        }
        result
    }

    /// Fixed-point elimination inside a conjunction.
    fn eliminate_and(
        &mut self,
        polys: &mut PolyPool,
        constraints: &mut ConstraintPool,
        formulas: &mut FormulaPool,
        children: Vec<FormulaId>,
        outermost: bool,
    ) -> FormulaId {
        let mut added_arith: Vec<Var> = Vec::new();
        // Maps a kept subformula to the Boolean-substitution key recorded
        // for it, so the entry can be erased before it is reprocessed.
        let mut recorded_bool: FxHashMap<FormulaId, FormulaId> = FxHashMap::default();
        // The equality formulas consumed as substitutions; re-added to
        // the result unless this is the outermost conjunction.
        let mut found_subs: Vec<FormulaId> = Vec::new();
        let mut current = children;
        let mut found_new = true;
        let mut collapsed = false;
        while found_new && !collapsed {
            found_new = false;
            let mut kept: Vec<FormulaId> = Vec::new();
            // All linear equalities first.
            for &sub in &current {
                if !is_linear_equality(formulas, constraints, polys, sub) {
                    continue;
                }
                let rewritten = self.eliminate(polys, constraints, formulas, sub, false);
                match formulas.kind(rewritten) {
                    FormulaKind::False => {
                        collapsed = true;
                        break;
                    }
                    FormulaKind::True => continue,
                    FormulaKind::Constraint(cid) => {
                        let constraint = constraints.get(*cid);
                        if let Some((var, replacement)) =
                            extract_substitution(
                                polys.get(constraint.poly),
                                constraint.relation,
                                &self.integer_vars,
                            )
                        {
                            if !self.arith_subs.contains_key(&var) {
                                trace!(var, replacement = %replacement, "es: substitution");
                                self.arith_subs.insert(var, replacement.clone());
                                added_arith.push(var);
                                found_subs.push(rewritten);
                                if outermost {
                                    self.outermost_subs.push((var, replacement));
                                }
                                found_new = true;
                                continue;
                            }
                        }
                        kept.push(rewritten);
                    }
                    _ => kept.push(rewritten),
                }
            }
            if collapsed {
                break;
            }
            // Then everything else.
            for &sub in &current {
                if is_linear_equality(formulas, constraints, polys, sub) {
                    continue;
                }
                // Forget the truth recorded for this very subformula so
                // it does not simplify itself to a constant.
                if let Some(key) = recorded_bool.remove(&sub) {
                    self.bool_subs.remove(&key);
                }
                let rewritten = self.eliminate(polys, constraints, formulas, sub, false);
                match formulas.kind(rewritten).clone() {
                    FormulaKind::False => {
                        collapsed = true;
                        break;
                    }
                    FormulaKind::True => continue,
                    FormulaKind::And(grand) => {
                        found_new = true;
                        kept.extend(grand);
                    }
                    FormulaKind::Not(inner) => {
                        if rewritten != sub {
                            found_new = true;
                        }
                        kept.push(rewritten);
                        if !self.bool_subs.contains_key(&inner) {
                            self.bool_subs.insert(inner, false);
                            recorded_bool.insert(rewritten, inner);
                        }
                    }
                    _ => {
                        if rewritten != sub {
                            found_new = true;
                        }
                        kept.push(rewritten);
                        if !self.bool_subs.contains_key(&rewritten) {
                            self.bool_subs.insert(rewritten, true);
                            recorded_bool.insert(rewritten, rewritten);
                        }
                    }
                }
            }
            current = kept;
        }
        // Boolean substitutions recorded for siblings do not outlive the
        // conjunction.
        for key in recorded_bool.into_values() {
            self.bool_subs.remove(&key);
        }
        if collapsed {
            if !outermost {
                for var in added_arith {
                    self.arith_subs.remove(&var);
                }
            }
            return formulas.mk_false();
        }
        if !outermost {
            current.extend(found_subs);
        }
        let result = formulas.mk_and(current);
        if !outermost {
            for var in added_arith {
                self.arith_subs.remove(&var);
            }
        }
        result
    }

    /// Apply the arithmetic table to a constraint until it stabilizes.
    fn rewrite_constraint(
        &mut self,
        polys: &mut PolyPool,
        constraints: &mut ConstraintPool,
        formulas: &mut FormulaPool,
        cid: rasat_core::ConstraintId,
    ) -> FormulaId {
        let constraint = constraints.get(cid);
        let mut poly = polys.get(constraint.poly).clone();
        for _ in 0..self.arith_subs.len().max(1) {
            let mut changed = false;
            for (&var, replacement) in &self.arith_subs {
                if poly.contains_var(var) {
                    poly = poly.substitute_poly(var, replacement);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        let new_id = constraints.intern(polys, poly, constraint.relation);
        match constraints.consistency(polys, new_id) {
            Some(true) => formulas.mk_true(),
            Some(false) => formulas.mk_false(),
            None => formulas.mk_constraint(new_id),
        }
    }

    /// Run `body` with a Boolean substitution for the condition and an
    /// optional arithmetic substitution pushed; both are popped on exit.
    fn scoped<T>(
        &mut self,
        formula: FormulaId,
        truth: bool,
        substitution: Option<(Var, Polynomial)>,
        body: impl FnOnce(&mut Self, &mut PolyPool, &mut ConstraintPool, &mut FormulaPool) -> T,
        polys: &mut PolyPool,
        constraints: &mut ConstraintPool,
        formulas: &mut FormulaPool,
    ) -> T {
        let fresh_bool = !self.bool_subs.contains_key(&formula);
        if fresh_bool {
            self.bool_subs.insert(formula, truth);
        }
        let pushed_var = match substitution {
            Some((var, replacement)) if !self.arith_subs.contains_key(&var) => {
                self.arith_subs.insert(var, replacement);
                Some(var)
            }
            _ => None,
        };
        let out = body(self, polys, constraints, formulas);
        if let Some(var) = pushed_var {
            self.arith_subs.remove(&var);
        }
        if fresh_bool {
            self.bool_subs.remove(&formula);
        }
        out
    }
}

/// Whether a formula is a constraint `p = 0` with linear `p`.
fn is_linear_equality(
    formulas: &FormulaPool,
    constraints: &ConstraintPool,
    polys: &PolyPool,
    formula: FormulaId,
) -> bool {
    match formulas.kind(formula) {
        FormulaKind::Constraint(cid) => {
            let constraint = constraints.get(*cid);
            constraint.relation == Relation::Eq && polys.get(constraint.poly).is_linear()
        }
        _ => false,
    }
}

/// Extract `var -> polynomial` from a linear equality: a variable that
/// occurs linearly with a constant coefficient. An integer variable is
/// only eliminated when the substitution preserves integrality (unit
/// coefficient, integer coefficients elsewhere).
pub fn extract_substitution(
    poly: &Polynomial,
    relation: Relation,
    integer_vars: &rustc_hash::FxHashSet<Var>,
) -> Option<(Var, Polynomial)> {
    if relation != Relation::Eq || !poly.is_linear() {
        return None;
    }
    for var in poly.vars() {
        if poly.degree_in(var) != 1 {
            continue;
        }
        let coeffs = poly.coeffs_wrt(var);
        let Some(coeff) = coeffs[1].constant_value() else {
            continue;
        };
        if coeff.is_zero() {
            continue;
        }
        if integer_vars.contains(&var) {
            use num_bigint::BigInt;
            use num_traits::{One, Signed};
            let unit = coeff.numer().abs() == BigInt::one() && coeff.denom().is_one();
            let integral = poly.terms().iter().all(|(c, _)| c.denom().is_one());
            let others_integer = poly
                .vars()
                .iter()
                .all(|v| *v == var || integer_vars.contains(v));
            if !(unit && integral && others_integer) {
                continue;
            }
        }
        // var = -rest / coeff
        let replacement = coeffs[0].scale(&(-BigRational::from_integer(1.into()) / coeff));
        return Some((var, replacement));
    }
    None
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

    struct Pools {
        polys: PolyPool,
        constraints: ConstraintPool,
        formulas: FormulaPool,
    }

    impl Pools {
        fn new() -> Self {
            Self {
                polys: PolyPool::new(),
                constraints: ConstraintPool::new(),
                formulas: FormulaPool::new(),
            }
        }

        fn leaf(&mut self, lhs: Polynomial, rel: Relation) -> FormulaId {
            let cid = self.constraints.intern(&mut self.polys, lhs, rel);
            self.formulas.mk_constraint(cid)
        }
    }

    #[test]
    fn substitution_extraction() {
        // x + 2y - 4 = 0 yields x -> 4 - 2y (or the symmetric choice).
        let poly = &(&x() + &y().scale(&q(2))) - &Polynomial::constant(q(4));
        let ints = rustc_hash::FxHashSet::default();
        let (var, replacement) =
            extract_substitution(&poly, Relation::Eq, &ints).expect("linear");
        let check = poly.substitute_poly(var, &replacement);
        assert!(check.is_zero());
    }

    #[test]
    fn equality_is_used_to_rewrite_siblings() {
        // x - 1 = 0 and x + y > 0 becomes y + 1 > 0 with x eliminated.
        let mut p = Pools::new();
        let eq = p.leaf(&x() - &Polynomial::one(), Relation::Eq);
        let ineq = p.leaf(&x() + &y(), Relation::Greater);
        let conj = p.formulas.mk_and(vec![eq, ineq]);
        let mut es = EsPreprocessor::new();
        let run = es.run(&mut p.polys, &mut p.constraints, &mut p.formulas, conj);
        // The equality is consumed; only the rewritten inequality remains.
        match p.formulas.kind(run.formula) {
            FormulaKind::Constraint(cid) => {
                let constraint = p.constraints.get(*cid);
                assert!(!p.polys.get(constraint.poly).contains_var(0));
                assert!(p.polys.get(constraint.poly).contains_var(1));
            }
            other => panic!("expected a single constraint, got {other:?}"),
        }
        assert_eq!(run.eliminated.len(), 1);
        assert_eq!(run.eliminated[0].0, 0);
    }

    #[test]
    fn chained_equalities_reach_a_fixed_point() {
        // x = y (x - y = 0) and y - 2 = 0 and x + y < 5 collapses to true.
        let mut p = Pools::new();
        let e1 = p.leaf(&x() - &y(), Relation::Eq);
        let e2 = p.leaf(&y() - &Polynomial::constant(q(2)), Relation::Eq);
        let ineq = p.leaf(&(&x() + &y()) - &Polynomial::constant(q(5)), Relation::Less);
        let conj = p.formulas.mk_and(vec![e1, e2, ineq]);
        let mut es = EsPreprocessor::new();
        let run = es.run(&mut p.polys, &mut p.constraints, &mut p.formulas, conj);
        assert!(matches!(p.formulas.kind(run.formula), FormulaKind::True));
        assert_eq!(run.eliminated.len(), 2);
    }

    #[test]
    fn contradiction_collapses_to_false() {
        // x - 1 = 0 and x - 2 = 0.
        let mut p = Pools::new();
        let e1 = p.leaf(&x() - &Polynomial::one(), Relation::Eq);
        let e2 = p.leaf(&x() - &Polynomial::constant(q(2)), Relation::Eq);
        let conj = p.formulas.mk_and(vec![e1, e2]);
        let mut es = EsPreprocessor::new();
        let run = es.run(&mut p.polys, &mut p.constraints, &mut p.formulas, conj);
        assert!(matches!(p.formulas.kind(run.formula), FormulaKind::False));
    }

    #[test]
    fn nonlinear_equalities_are_left_alone() {
        // x^2 - 2 = 0 offers no linear substitution.
        let mut p = Pools::new();
        let eq = p.leaf(&(&x() * &x()) - &Polynomial::constant(q(2)), Relation::Eq);
        let ineq = p.leaf(x(), Relation::Greater);
        let conj = p.formulas.mk_and(vec![eq, ineq]);
        let mut es = EsPreprocessor::new();
        let run = es.run(&mut p.polys, &mut p.constraints, &mut p.formulas, conj);
        match p.formulas.kind(run.formula) {
            FormulaKind::And(children) => assert_eq!(children.len(), 2),
            other => panic!("expected a conjunction, got {other:?}"),
        }
        assert!(run.eliminated.is_empty());
    }

    #[test]
    fn ite_condition_substitutes_only_in_then_branch() {
        // ite(x - 1 = 0, x + y > 0, x > 0): the equality rewrites only the
        // then branch.
        let mut p = Pools::new();
        let cond = p.leaf(&x() - &Polynomial::one(), Relation::Eq);
        let then_branch = p.leaf(&x() + &y(), Relation::Greater);
        let else_branch = p.leaf(x(), Relation::Greater);
        let ite = p.formulas.mk_ite(cond, then_branch, else_branch);
        let mut es = EsPreprocessor::new();
        let run = es.run(&mut p.polys, &mut p.constraints, &mut p.formulas, ite);
        let FormulaKind::Ite(_, t, e) = p.formulas.kind(run.formula).clone() else {
            panic!("expected ite");
        };
        let FormulaKind::Constraint(tc) = p.formulas.kind(t) else {
            panic!("then branch is a constraint");
        };
        assert!(!p.polys.get(p.constraints.get(*tc).poly).contains_var(0));
        let FormulaKind::Constraint(ec) = p.formulas.kind(e) else {
            panic!("else branch is a constraint");
        };
        assert!(p.polys.get(p.constraints.get(*ec).poly).contains_var(0));
    }
}
