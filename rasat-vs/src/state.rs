//! The VS exploration tree.
//!
//! Each node carries a condition list (the local conjunction), the
//! substitution that produced it from its parent, the disjunctive
//! substitution results with a combination cursor, conflict sets keyed by
//! the child that reported them, and the status driving what work is due:
//! a pending substitution, a fresh sub-result combination, or test
//! candidate generation.

use rasat_core::{Bitset, ConstraintId};
use rustc_hash::FxHashMap;
use std::fmt;

use crate::condition::Condition;
use crate::substitution::Substitution;

/// Index of a state in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub u32);

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// What work a state is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateStatus {
    /// The substitution from the parent has not been applied yet.
    SubstitutionToApply,
    /// A fresh disjunct combination of the substitution results must be
    /// chosen.
    CombineSubresults,
    /// The condition list is stable; generate test candidates.
    TestCandidateToGenerate,
}

/// One conjunction of pooled constraints with their input origins.
pub type CondConjunction = Vec<(ConstraintId, Bitset)>;

/// The disjunction produced by substituting into one condition.
pub type SubResult = Vec<CondConjunction>;

/// A node of the exploration tree.
#[derive(Debug)]
pub struct State {
    /// Parent node, absent for the root.
    pub parent: Option<StateId>,
    /// Child states, one per generated test candidate.
    pub children: Vec<StateId>,
    /// The substitution on the edge from the parent.
    pub substitution: Option<Substitution>,
    /// The local conjunction.
    pub conditions: Vec<Condition>,
    /// Substitution-result disjunctions, one per originating condition
    /// (plus one for the substitution's side conditions).
    pub subst_results: Vec<SubResult>,
    /// Current choice of one disjunct per sub-result.
    pub combination: Vec<usize>,
    /// Whether `combination` currently points at a valid choice.
    pub has_combination: bool,
    /// Set when the current combination was rejected and the next one
    /// must be taken.
    pub take_sub_result_comb_again: bool,
    /// Conflict reasons, keyed by the child that reported them (`None`
    /// for conflicts found at this state itself).
    pub conflict_sets: FxHashMap<Option<StateId>, Vec<Bitset>>,
    /// Pending work kind.
    pub status: StateStatus,
    /// Subtree retired by pruning.
    pub marked_as_deleted: bool,
    /// Every case of this state is refuted.
    pub inconsistent: bool,
    /// A condition exceeded the degree bound; a backend must decide.
    pub cannot_be_solved: bool,
    /// New children still have to be inserted into the ranking.
    pub has_children_to_insert: bool,
    /// Primary ranking component; smaller is processed first.
    pub valuation: u64,
    /// Secondary ranking component from the backend.
    pub backend_valuation: u64,
    /// Distance from the root.
    pub depth: usize,
    /// Whether the minus-infinity candidate was generated here.
    pub minus_infinity_added: bool,
    /// Whether the plus-infinity candidate was generated here.
    pub plus_infinity_added: bool,
}

impl State {
    fn new(parent: Option<StateId>, substitution: Option<Substitution>, depth: usize) -> Self {
        Self {
            parent,
            children: Vec::new(),
            substitution,
            conditions: Vec::new(),
            subst_results: Vec::new(),
            combination: Vec::new(),
            has_combination: false,
            take_sub_result_comb_again: false,
            conflict_sets: FxHashMap::default(),
            status: if parent.is_some() {
                StateStatus::SubstitutionToApply
            } else {
                StateStatus::TestCandidateToGenerate
            },
            marked_as_deleted: false,
            inconsistent: false,
            cannot_be_solved: false,
            has_children_to_insert: false,
            valuation: 0,
            backend_valuation: 0,
            depth,
            minus_infinity_added: false,
            plus_infinity_added: false,
        }
    }

    /// Advance the combination cursor like an odometer. Returns `false`
    /// when every combination has been consumed.
    pub fn next_combination(&mut self) -> bool {
        if self.subst_results.iter().any(Vec::is_empty) {
            return false;
        }
        if !self.has_combination {
            self.combination = vec![0; self.subst_results.len()];
            self.has_combination = true;
            return true;
        }
        for i in (0..self.combination.len()).rev() {
            if self.combination[i] + 1 < self.subst_results[i].len() {
                self.combination[i] += 1;
                for later in self.combination[i + 1..].iter_mut() {
                    *later = 0;
                }
                return true;
            }
        }
        false
    }

    /// The currently selected disjuncts.
    pub fn current_combination(&self) -> impl Iterator<Item = &CondConjunction> {
        debug_assert!(self.has_combination);
        self.combination
            .iter()
            .enumerate()
            .map(|(i, &j)| &self.subst_results[i][j])
    }

    /// Record a conflict reason.
    pub fn add_conflict(&mut self, child: Option<StateId>, reason: Bitset) {
        self.conflict_sets.entry(child).or_default().push(reason);
    }

    /// Union of every recorded conflict reason.
    pub fn folded_conflicts(&self) -> Bitset {
        let mut folded = Bitset::new();
        for reasons in self.conflict_sets.values() {
            for reason in reasons {
                folded.union_with(reason);
            }
        }
        folded
    }
}

/// The arena of states.
#[derive(Debug, Default)]
pub struct StateTree {
    states: Vec<State>,
}

impl StateTree {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all states.
    pub fn clear(&mut self) {
        self.states.clear();
    }

    /// Number of allocated states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Allocate the root state.
    pub fn alloc_root(&mut self) -> StateId {
        debug_assert!(self.states.is_empty());
        self.states.push(State::new(None, None, 0));
        StateId(0)
    }

    /// Allocate a child reached by a substitution.
    pub fn alloc_child(&mut self, parent: StateId, substitution: Substitution) -> StateId {
        let depth = self.state(parent).depth + 1;
        let id = StateId(self.states.len() as u32);
        self.states
            .push(State::new(Some(parent), Some(substitution), depth));
        self.state_mut(parent).children.push(id);
        self.state_mut(parent).has_children_to_insert = true;
        id
    }

    /// Immutable access.
    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.0 as usize]
    }

    /// Mutable access.
    pub fn state_mut(&mut self, id: StateId) -> &mut State {
        &mut self.states[id.0 as usize]
    }

    /// Mark a subtree as deleted (removing it from consideration; the
    /// ranking skips deleted states).
    pub fn mark_deleted(&mut self, id: StateId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if self.state(current).marked_as_deleted {
                continue;
            }
            self.state_mut(current).marked_as_deleted = true;
            stack.extend(self.state(current).children.iter().copied());
        }
    }

    /// Live (not deleted, not inconsistent) children of a state.
    pub fn live_children(&self, id: StateId) -> impl Iterator<Item = StateId> + '_ {
        self.state(id)
            .children
            .iter()
            .copied()
            .filter(|&c| !self.state(c).marked_as_deleted && !self.state(c).inconsistent)
    }
}
