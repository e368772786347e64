//! The lifting tree.
//!
//! A persistent prefix tree of partial sample points: a node at depth `k`
//! carries the value chosen for variable `k - 1`, bitsets recording which
//! constraints the sample has been evaluated against and with which
//! result, and a dependency bitset naming the constraints its existence
//! depends on, so that constraint removal invalidates exactly the
//! affected subtrees.
//!
//! Children are kept in ascending order of their real algebraic value.
//! Between adjacent section samples (roots of projection polynomials) a
//! sector sample is materialized by the midpoint rule; below the least
//! root and above the greatest, integer samples one past the floor and
//! ceiling are used, and an empty level gets the single sample zero.

use num_rational::BigRational;
use rasat_core::Bitset;
use rasat_math::algebraic::number::{rational_above, rational_below, rational_between};
use rasat_math::{RealAlgebraicNumber, RealAssignment, Var};
use tracing::trace;

/// Index of a sample node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleId(pub u32);

/// One node of the lifting tree.
#[derive(Debug, Clone)]
pub struct Sample {
    /// The value chosen at this level; `None` only for the virtual root.
    pub value: Option<RealAlgebraicNumber>,
    /// Parent node; `None` only for the virtual root.
    pub parent: Option<SampleId>,
    /// Children at the next level, ascending by value.
    pub children: Vec<SampleId>,
    /// Depth in the tree; the root has depth zero and a node at depth `k`
    /// assigns variable `k - 1`.
    pub level: usize,
    /// Whether the value is a root of a projection polynomial (a section)
    /// rather than an interior sector sample.
    pub is_section: bool,
    /// Constraints this sample has been evaluated against.
    pub evaluated_with: Bitset,
    /// Evaluation results, aligned with `evaluated_with`.
    pub evaluation: Bitset,
    /// Constraints whose presence this sample depends on.
    pub depends_on: Bitset,
    /// Cleared when an owning constraint is removed.
    pub alive: bool,
}

impl Sample {
    fn new(level: usize, parent: SampleId, value: RealAlgebraicNumber, is_section: bool) -> Self {
        Self {
            value: Some(value),
            parent: Some(parent),
            children: Vec::new(),
            level,
            is_section,
            evaluated_with: Bitset::new(),
            evaluation: Bitset::new(),
            depends_on: Bitset::new(),
            alive: true,
        }
    }

    /// Whether the sample has recorded a conflict with some constraint:
    /// evaluated and found false.
    pub fn has_conflict(&self) -> bool {
        let mut falsified = self.evaluated_with.clone();
        falsified.difference_with(&self.evaluation);
        !falsified.is_empty()
    }

    /// The constraints this sample falsifies.
    pub fn falsified(&self) -> Bitset {
        let mut falsified = self.evaluated_with.clone();
        falsified.difference_with(&self.evaluation);
        falsified
    }
}

/// The sample tree for a fixed number of variables.
#[derive(Debug)]
pub struct LiftingTree {
    samples: Vec<Sample>,
    dim: usize,
}

impl LiftingTree {
    /// A tree with only the virtual root, for `dim` variables.
    pub fn new(dim: usize) -> Self {
        let root = Sample {
            value: None,
            parent: None,
            children: Vec::new(),
            level: 0,
            is_section: false,
            evaluated_with: Bitset::new(),
            evaluation: Bitset::new(),
            depends_on: Bitset::new(),
            alive: true,
        };
        Self {
            samples: vec![root],
            dim,
        }
    }

    /// Drop everything and start over.
    pub fn reset(&mut self, dim: usize) {
        *self = Self::new(dim);
    }

    /// The virtual root.
    pub fn root(&self) -> SampleId {
        SampleId(0)
    }

    /// Number of variables.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Immutable access to a node.
    pub fn sample(&self, id: SampleId) -> &Sample {
        &self.samples[id.0 as usize]
    }

    /// Mutable access to a node.
    pub fn sample_mut(&mut self, id: SampleId) -> &mut Sample {
        &mut self.samples[id.0 as usize]
    }

    /// Number of nodes ever allocated (including dead ones).
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the tree has no real samples.
    pub fn is_empty(&self) -> bool {
        self.samples.len() <= 1
    }

    /// The assignment collected along the path from the root to `id`:
    /// the node at depth `k` assigns variable `k - 1`.
    pub fn assignment_prefix(&self, id: SampleId) -> RealAssignment {
        let mut assignment = RealAssignment::default();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.sample(current);
            if let (Some(value), true) = (&node.value, node.level > 0) {
                assignment.insert((node.level - 1) as Var, value.clone());
            }
            cursor = node.parent;
        }
        assignment
    }

    /// A stable cache key for the assignment prefix ending at `id`.
    pub fn prefix_key(&self, id: SampleId) -> u64 {
        u64::from(id.0)
    }

    /// Live children of a node, ascending.
    pub fn live_children(&self, id: SampleId) -> Vec<SampleId> {
        self.sample(id)
            .children
            .iter()
            .copied()
            .filter(|&c| self.sample(c).alive)
            .collect()
    }

    /// Merge the given roots into the children of `parent` and
    /// materialize sector samples, reusing existing nodes where the value
    /// is unchanged. Returns the live children in ascending order.
    pub fn populate_children(
        &mut self,
        parent: SampleId,
        roots: Vec<(RealAlgebraicNumber, Bitset)>,
    ) -> Vec<SampleId> {
        let level = self.sample(parent).level + 1;
        debug_assert!(level <= self.dim);
        // Deduplicate equal roots, merging dependencies.
        let mut sections: Vec<(RealAlgebraicNumber, Bitset)> = Vec::new();
        let mut sorted = roots;
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        for (value, deps) in sorted {
            match sections.last_mut() {
                Some((existing, existing_deps)) if *existing == value => {
                    existing_deps.union_with(&deps);
                }
                _ => sections.push((value, deps)),
            }
        }
        // Reuse matching live section children.
        let previous = self.live_children(parent);
        let mut reusable_sections: Vec<(RealAlgebraicNumber, SampleId)> = previous
            .iter()
            .filter(|&&c| self.sample(c).is_section)
            .filter_map(|&c| self.sample(c).value.clone().map(|v| (v, c)))
            .collect();
        let reusable_sectors: Vec<(RealAlgebraicNumber, SampleId)> = previous
            .iter()
            .filter(|&&c| !self.sample(c).is_section)
            .filter_map(|&c| self.sample(c).value.clone().map(|v| (v, c)))
            .collect();

        let mut ordered: Vec<SampleId> = Vec::new();
        let mut section_ids: Vec<SampleId> = Vec::new();
        for (value, deps) in &sections {
            let id = if let Some(pos) = reusable_sections.iter().position(|(v, _)| v == value) {
                let (_, existing) = reusable_sections.swap_remove(pos);
                existing
            } else {
                self.alloc(Sample::new(level, parent, value.clone(), true))
            };
            self.sample_mut(id).depends_on.union_with(deps);
            section_ids.push(id);
        }
        // Sector samples around and between the sections.
        let section_values: Vec<RealAlgebraicNumber> =
            sections.iter().map(|(v, _)| v.clone()).collect();
        let mut sector_values: Vec<(BigRational, Bitset)> = Vec::new();
        if section_values.is_empty() {
            sector_values.push((BigRational::from_integer(0.into()), Bitset::new()));
        } else {
            sector_values.push((
                rational_below(&section_values[0]),
                sections[0].1.clone(),
            ));
            for i in 0..section_values.len() - 1 {
                let mut deps = sections[i].1.clone();
                deps.union_with(&sections[i + 1].1);
                sector_values.push((
                    rational_between(&section_values[i], &section_values[i + 1]),
                    deps,
                ));
            }
            sector_values.push((
                rational_above(&section_values[section_values.len() - 1]),
                sections[sections.len() - 1].1.clone(),
            ));
        }
        // Interleave: sector, section, sector, section, ..., sector.
        for (i, (value, deps)) in sector_values.into_iter().enumerate() {
            let lower = if i == 0 {
                None
            } else {
                Some(&section_values[i - 1])
            };
            let upper = section_values.get(i);
            let candidate = RealAlgebraicNumber::Rational(value);
            let reused = reusable_sectors.iter().find(|(v, _)| {
                let above = lower.map_or(true, |l| v > l);
                let below = upper.map_or(true, |u| v < u);
                above && below
            });
            let id = match reused {
                Some((_, existing)) => *existing,
                None => self.alloc(Sample::new(level, parent, candidate, false)),
            };
            self.sample_mut(id).depends_on.union_with(&deps);
            ordered.push(id);
            if let Some(&section) = section_ids.get(i) {
                ordered.push(section);
            }
        }
        trace!(parent = parent.0, level, count = ordered.len(), "lifting: children");
        self.sample_mut(parent).children = ordered.clone();
        ordered
    }

    fn alloc(&mut self, sample: Sample) -> SampleId {
        let id = SampleId(self.samples.len() as u32);
        self.samples.push(sample);
        id
    }

    /// Kill every sample (and its subtree) depending on the given
    /// constraint.
    pub fn invalidate_constraint(&mut self, constraint_index: usize) {
        let doomed: Vec<SampleId> = (0..self.samples.len())
            .map(|i| SampleId(i as u32))
            .filter(|&id| {
                self.sample(id).alive && self.sample(id).depends_on.test(constraint_index)
            })
            .collect();
        for id in doomed {
            self.kill_subtree(id);
        }
    }

    fn kill_subtree(&mut self, id: SampleId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !self.sample(current).alive {
                continue;
            }
            self.sample_mut(current).alive = false;
            stack.extend(self.sample(current).children.iter().copied());
        }
    }

    /// All live samples in allocation order, skipping the virtual root.
    pub fn live_samples(&self) -> impl Iterator<Item = SampleId> + '_ {
        (1..self.samples.len())
            .map(|i| SampleId(i as u32))
            .filter(|&id| self.sample(id).alive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    fn q(n: i64) -> BigRational {
        BigRational::from_integer(BigInt::from(n))
    }

    fn ran(n: i64) -> RealAlgebraicNumber {
        RealAlgebraicNumber::from_int(n)
    }

    #[test]
    fn empty_level_gets_zero_sample() {
        let mut tree = LiftingTree::new(1);
        let children = tree.populate_children(tree.root(), Vec::new());
        assert_eq!(children.len(), 1);
        let sample = tree.sample(children[0]);
        assert!(!sample.is_section);
        assert_eq!(
            sample.value.as_ref().and_then(|v| v.to_rational()).cloned(),
            Some(q(0))
        );
    }

    #[test]
    fn sections_and_sectors_interleave() {
        let mut tree = LiftingTree::new(1);
        let roots = vec![(ran(1), Bitset::new()), (ran(3), Bitset::new())];
        let children = tree.populate_children(tree.root(), roots);
        // sector, section(1), sector, section(3), sector
        assert_eq!(children.len(), 5);
        let values: Vec<bool> = children
            .iter()
            .map(|&c| tree.sample(c).is_section)
            .collect();
        assert_eq!(values, vec![false, true, false, true, false]);
        // Ascending order.
        let mut last: Option<RealAlgebraicNumber> = None;
        for &c in &children {
            let v = tree.sample(c).value.clone().expect("non-root");
            if let Some(prev) = &last {
                assert!(*prev < v);
            }
            last = Some(v);
        }
    }

    #[test]
    fn equal_roots_merge_dependencies() {
        let mut tree = LiftingTree::new(1);
        let mut deps_a = Bitset::new();
        deps_a.set(0);
        let mut deps_b = Bitset::new();
        deps_b.set(1);
        let roots = vec![(ran(2), deps_a), (ran(2), deps_b)];
        let children = tree.populate_children(tree.root(), roots);
        // sector, section(2), sector
        assert_eq!(children.len(), 3);
        let section = children[1];
        assert!(tree.sample(section).depends_on.test(0));
        assert!(tree.sample(section).depends_on.test(1));
    }

    #[test]
    fn repopulation_reuses_sections() {
        let mut tree = LiftingTree::new(1);
        let first = tree.populate_children(tree.root(), vec![(ran(1), Bitset::new())]);
        let section = first[1];
        tree.sample_mut(section).evaluated_with.set(0);
        // Adding a new root keeps the old section node (and its bitsets).
        let second = tree.populate_children(
            tree.root(),
            vec![(ran(1), Bitset::new()), (ran(5), Bitset::new())],
        );
        assert!(second.contains(&section));
        assert!(tree.sample(section).evaluated_with.test(0));
    }

    #[test]
    fn invalidation_kills_dependent_subtrees() {
        let mut tree = LiftingTree::new(2);
        let mut deps = Bitset::new();
        deps.set(7);
        let children = tree.populate_children(tree.root(), vec![(ran(0), deps)]);
        let section = children[1];
        let grand = tree.populate_children(section, vec![(ran(4), Bitset::new())]);
        assert!(!grand.is_empty());
        tree.invalidate_constraint(7);
        assert!(!tree.sample(section).alive);
        assert!(grand.iter().all(|&g| !tree.sample(g).alive));
        // The sectors did not depend on the constraint only through the
        // section's bitset union.
        assert!(tree.live_samples().count() < 5);
    }

    #[test]
    fn assignment_prefix_collects_path() {
        let mut tree = LiftingTree::new(2);
        let level1 = tree.populate_children(tree.root(), vec![(ran(1), Bitset::new())]);
        let section = level1[1];
        let level2 = tree.populate_children(section, vec![(ran(2), Bitset::new())]);
        let leaf = level2[1];
        let assignment = tree.assignment_prefix(leaf);
        assert_eq!(assignment.len(), 2);
        assert_eq!(assignment[&0], ran(1));
        assert_eq!(assignment[&1], ran(2));
    }
}
