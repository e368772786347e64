//! Conditions: constraints enriched with engine bookkeeping.

use rasat_core::{Bitset, ConstraintId};
use std::fmt;

/// Engine-wide condition identifier; fresh for every condition created,
/// including copies produced by substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConditionId(pub u32);

impl fmt::Display for ConditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

/// A constraint inside a state's condition list.
#[derive(Debug, Clone)]
pub struct Condition {
    /// Fresh id.
    pub id: ConditionId,
    /// The pooled constraint.
    pub constraint: ConstraintId,
    /// Depth of the state that created the condition.
    pub recursion_depth: usize,
    /// Set while the condition has not yet been considered for test
    /// candidate generation.
    pub recently_added: bool,
    /// Set once the condition has contributed test candidates.
    pub flag: bool,
    /// Indices of the original input constraints this condition descends
    /// from. Never empty.
    pub origins: Bitset,
}

impl Condition {
    /// A fresh condition.
    pub fn new(
        id: ConditionId,
        constraint: ConstraintId,
        recursion_depth: usize,
        origins: Bitset,
    ) -> Self {
        debug_assert!(!origins.is_empty());
        Self {
            id,
            constraint,
            recursion_depth,
            recently_added: true,
            flag: false,
            origins,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_condition_is_recently_added() {
        let c = Condition::new(
            ConditionId(4),
            ConstraintId(0),
            2,
            Bitset::from_indices([1]),
        );
        assert!(c.recently_added);
        assert!(!c.flag);
        assert_eq!(c.recursion_depth, 2);
        assert!(c.origins.test(1));
    }
}
