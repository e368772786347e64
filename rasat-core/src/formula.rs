//! The formula arena.
//!
//! Formulas are trees over the usual Boolean connectives with constraints
//! at the leaves, stored in an arena with structural sharing: building the
//! same connective over the same children returns the same id, so id
//! equality is formula identity.
//!
//! The n-ary constructors perform the cheap normalizations the engines
//! rely on (flattening, unit dropping, constant collapse); anything deeper
//! is the preprocessor's job.

use rasat_math::Var;
use rustc_hash::FxHashMap;
use std::fmt;

use crate::pool::ConstraintId;

/// Stable identifier of a pooled formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormulaId(pub u32);

impl fmt::Display for FormulaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// A formula node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FormulaKind {
    /// The constant true.
    True,
    /// The constant false.
    False,
    /// A Boolean variable.
    Bool(u32),
    /// An arithmetic constraint leaf.
    Constraint(ConstraintId),
    /// Negation.
    Not(FormulaId),
    /// N-ary conjunction.
    And(Vec<FormulaId>),
    /// N-ary disjunction.
    Or(Vec<FormulaId>),
    /// N-ary exclusive or.
    Xor(Vec<FormulaId>),
    /// N-ary bi-implication.
    Iff(Vec<FormulaId>),
    /// Implication.
    Implies(FormulaId, FormulaId),
    /// If-then-else over formulas.
    Ite(FormulaId, FormulaId, FormulaId),
    /// Existential quantification.
    Exists(Vec<Var>, FormulaId),
    /// Universal quantification.
    Forall(Vec<Var>, FormulaId),
}

/// Arena of structurally shared formulas.
#[derive(Debug, Default)]
pub struct FormulaPool {
    nodes: Vec<FormulaKind>,
    index: FxHashMap<FormulaKind, FormulaId>,
}

impl FormulaPool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    fn mk(&mut self, kind: FormulaKind) -> FormulaId {
        if let Some(&id) = self.index.get(&kind) {
            return id;
        }
        let id = FormulaId(self.nodes.len() as u32);
        self.index.insert(kind.clone(), id);
        self.nodes.push(kind);
        id
    }

    /// The node behind an id.
    pub fn kind(&self, id: FormulaId) -> &FormulaKind {
        &self.nodes[id.0 as usize]
    }

    /// `true`.
    pub fn mk_true(&mut self) -> FormulaId {
        self.mk(FormulaKind::True)
    }

    /// `false`.
    pub fn mk_false(&mut self) -> FormulaId {
        self.mk(FormulaKind::False)
    }

    /// A Boolean variable.
    pub fn mk_bool(&mut self, var: u32) -> FormulaId {
        self.mk(FormulaKind::Bool(var))
    }

    /// A constraint leaf.
    pub fn mk_constraint(&mut self, constraint: ConstraintId) -> FormulaId {
        self.mk(FormulaKind::Constraint(constraint))
    }

    /// Negation, with double negation and constants collapsed.
    pub fn mk_not(&mut self, inner: FormulaId) -> FormulaId {
        enum Shape {
            True,
            False,
            Inner(FormulaId),
            Other,
        }
        let shape = match self.kind(inner) {
            FormulaKind::True => Shape::True,
            FormulaKind::False => Shape::False,
            FormulaKind::Not(sub) => Shape::Inner(*sub),
            _ => Shape::Other,
        };
        match shape {
            Shape::True => self.mk_false(),
            Shape::False => self.mk_true(),
            Shape::Inner(sub) => sub,
            Shape::Other => self.mk(FormulaKind::Not(inner)),
        }
    }

    /// Conjunction: flattens nested conjunctions, drops `true`, collapses
    /// on `false`, deduplicates, unwraps singletons.
    pub fn mk_and(&mut self, children: Vec<FormulaId>) -> FormulaId {
        let true_id = self.mk_true();
        let false_id = self.mk_false();
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            if child == true_id {
                continue;
            }
            if child == false_id {
                return false_id;
            }
            match self.kind(child) {
                FormulaKind::And(grand) => flat.extend(grand.iter().copied()),
                _ => flat.push(child),
            }
        }
        flat.sort();
        flat.dedup();
        match flat.len() {
            0 => true_id,
            1 => flat[0],
            _ => self.mk(FormulaKind::And(flat)),
        }
    }

    /// Disjunction, dual to [`Self::mk_and`].
    pub fn mk_or(&mut self, children: Vec<FormulaId>) -> FormulaId {
        let true_id = self.mk_true();
        let false_id = self.mk_false();
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            if child == false_id {
                continue;
            }
            if child == true_id {
                return true_id;
            }
            match self.kind(child) {
                FormulaKind::Or(grand) => flat.extend(grand.iter().copied()),
                _ => flat.push(child),
            }
        }
        flat.sort();
        flat.dedup();
        match flat.len() {
            0 => false_id,
            1 => flat[0],
            _ => self.mk(FormulaKind::Or(flat)),
        }
    }

    /// Exclusive or; constants are folded out.
    pub fn mk_xor(&mut self, children: Vec<FormulaId>) -> FormulaId {
        let true_id = self.mk_true();
        let false_id = self.mk_false();
        let mut flat = Vec::with_capacity(children.len());
        let mut parity = false;
        for child in children {
            if child == false_id {
                continue;
            }
            if child == true_id {
                parity = !parity;
                continue;
            }
            flat.push(child);
        }
        let core = match flat.len() {
            0 => false_id,
            1 => flat[0],
            _ => self.mk(FormulaKind::Xor(flat)),
        };
        if parity {
            self.mk_not(core)
        } else {
            core
        }
    }

    /// Bi-implication of two or more formulas.
    pub fn mk_iff(&mut self, children: Vec<FormulaId>) -> FormulaId {
        let mut flat = children;
        flat.sort();
        flat.dedup();
        match flat.len() {
            0 => self.mk_true(),
            1 => self.mk_true(),
            _ => self.mk(FormulaKind::Iff(flat)),
        }
    }

    /// Implication with constant folding.
    pub fn mk_implies(&mut self, premise: FormulaId, conclusion: FormulaId) -> FormulaId {
        let true_id = self.mk_true();
        let false_id = self.mk_false();
        if premise == false_id || conclusion == true_id {
            return true_id;
        }
        if premise == true_id {
            return conclusion;
        }
        if conclusion == false_id {
            return self.mk_not(premise);
        }
        self.mk(FormulaKind::Implies(premise, conclusion))
    }

    /// If-then-else with constant folding of the condition.
    pub fn mk_ite(
        &mut self,
        condition: FormulaId,
        then_branch: FormulaId,
        else_branch: FormulaId,
    ) -> FormulaId {
        let true_id = self.mk_true();
        let false_id = self.mk_false();
        if condition == true_id {
            return then_branch;
        }
        if condition == false_id {
            return else_branch;
        }
        if then_branch == else_branch {
            return then_branch;
        }
        self.mk(FormulaKind::Ite(condition, then_branch, else_branch))
    }

    /// Existential quantification.
    pub fn mk_exists(&mut self, vars: Vec<Var>, body: FormulaId) -> FormulaId {
        if vars.is_empty() {
            return body;
        }
        self.mk(FormulaKind::Exists(vars, body))
    }

    /// Universal quantification.
    pub fn mk_forall(&mut self, vars: Vec<Var>, body: FormulaId) -> FormulaId {
        if vars.is_empty() {
            return body;
        }
        self.mk(FormulaKind::Forall(vars, body))
    }

    /// Collect the constraint leaves of a formula.
    pub fn constraints_of(&self, id: FormulaId) -> Vec<ConstraintId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        let mut seen = rustc_hash::FxHashSet::default();
        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            match self.kind(next) {
                FormulaKind::Constraint(c) => out.push(*c),
                FormulaKind::Not(a) => stack.push(*a),
                FormulaKind::And(children)
                | FormulaKind::Or(children)
                | FormulaKind::Xor(children)
                | FormulaKind::Iff(children) => stack.extend(children.iter().copied()),
                FormulaKind::Implies(a, b) => {
                    stack.push(*a);
                    stack.push(*b);
                }
                FormulaKind::Ite(c, t, e) => {
                    stack.push(*c);
                    stack.push(*t);
                    stack.push(*e);
                }
                FormulaKind::Exists(_, body) | FormulaKind::Forall(_, body) => stack.push(*body),
                FormulaKind::True | FormulaKind::False | FormulaKind::Bool(_) => {}
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Relation;
    use crate::pool::{ConstraintPool, PolyPool};
    use rasat_math::Polynomial;

    fn leaf(pool: &mut FormulaPool) -> (FormulaId, FormulaId) {
        let mut polys = PolyPool::new();
        let mut constraints = ConstraintPool::new();
        let a = constraints.intern(&mut polys, Polynomial::variable(0), Relation::Greater);
        let b = constraints.intern(&mut polys, Polynomial::variable(1), Relation::Less);
        (pool.mk_constraint(a), pool.mk_constraint(b))
    }

    #[test]
    fn structural_sharing() {
        let mut pool = FormulaPool::new();
        let (a, b) = leaf(&mut pool);
        let f1 = pool.mk_and(vec![a, b]);
        let f2 = pool.mk_and(vec![b, a]);
        assert_eq!(f1, f2);
    }

    #[test]
    fn and_simplifications() {
        let mut pool = FormulaPool::new();
        let (a, b) = leaf(&mut pool);
        let t = pool.mk_true();
        let f = pool.mk_false();
        assert_eq!(pool.mk_and(vec![a, t]), a);
        assert_eq!(pool.mk_and(vec![a, f, b]), pool.mk_false());
        assert_eq!(pool.mk_and(vec![]), pool.mk_true());
        let nested = pool.mk_and(vec![a, b]);
        assert_eq!(pool.mk_and(vec![nested, a]), nested);
    }

    #[test]
    fn not_involution() {
        let mut pool = FormulaPool::new();
        let (a, _) = leaf(&mut pool);
        let na = pool.mk_not(a);
        assert_eq!(pool.mk_not(na), a);
        let t = pool.mk_true();
        assert_eq!(pool.mk_not(t), pool.mk_false());
    }

    #[test]
    fn implies_folding() {
        let mut pool = FormulaPool::new();
        let (a, b) = leaf(&mut pool);
        let t = pool.mk_true();
        let f = pool.mk_false();
        assert_eq!(pool.mk_implies(f, a), t);
        assert_eq!(pool.mk_implies(t, b), b);
        assert_eq!(pool.mk_implies(a, f), pool.mk_not(a));
    }

    #[test]
    fn xor_parity() {
        let mut pool = FormulaPool::new();
        let (a, _) = leaf(&mut pool);
        let t = pool.mk_true();
        let x = pool.mk_xor(vec![a, t]);
        assert_eq!(x, pool.mk_not(a));
    }

    #[test]
    fn collects_constraint_leaves() {
        let mut pool = FormulaPool::new();
        let (a, b) = leaf(&mut pool);
        let na = pool.mk_not(a);
        let conj = pool.mk_and(vec![na, b]);
        let leaves = pool.constraints_of(conj);
        assert_eq!(leaves.len(), 2);
    }
}
