//! Conflict graph and minimal-infeasible-subset extraction.
//!
//! The conflict graph is a bipartite incidence structure: rows are
//! constraints, columns are samples that falsify at least one constraint,
//! and an entry `(c, s)` is set iff sample `s` falsifies constraint `c`.
//! A set of rows covering every column yields an infeasible subset; the
//! heuristics below trade quality of the cover against effort.

use rasat_core::Bitset;
use rustc_hash::FxHashSet;

/// Selection policy for infeasible subsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MisHeuristic {
    /// The whole constraint set.
    Trivial,
    /// Repeatedly pick the row covering the most uncovered columns.
    Greedy,
    /// Select essential rows first, then greedy over deduplicated
    /// columns.
    GreedyPre,
    /// Greedy until at most six rows remain, then exhaustive minimum set
    /// cover.
    Hybrid,
    /// Greedy maximizing `coverage / weight`.
    GreedyWeighted,
    /// Like [`MisHeuristic::GreedyWeighted`] with an exhaustive
    /// minimum-weight tail.
    HybridWeighted,
}

impl Default for MisHeuristic {
    fn default() -> Self {
        MisHeuristic::Greedy
    }
}

const HYBRID_EXHAUSTIVE_LIMIT: usize = 6;

/// Weight of a constraint row for the weighted heuristics:
/// `1 + 0.5 * complexity + 10 / (1 + activity)`.
pub fn row_weight(complexity: u32, activity: f64) -> f64 {
    1.0 + 0.5 * f64::from(complexity) + 10.0 / (1.0 + activity)
}

/// Bipartite constraint/sample incidence.
#[derive(Debug, Clone, Default)]
pub struct ConflictGraph {
    /// `rows[c]` holds the column indices falsified by constraint `c`.
    rows: Vec<Bitset>,
    columns: usize,
    uncovered: Bitset,
}

impl ConflictGraph {
    /// A graph over `num_constraints` rows and no samples yet.
    pub fn new(num_constraints: usize) -> Self {
        Self {
            rows: vec![Bitset::new(); num_constraints],
            columns: 0,
            uncovered: Bitset::new(),
        }
    }

    /// Number of constraint rows.
    pub fn num_constraints(&self) -> usize {
        self.rows.len()
    }

    /// Number of sample columns added.
    pub fn num_samples(&self) -> usize {
        self.columns
    }

    /// Add a failing sample: `falsified` names the constraint rows the
    /// sample falsifies.
    pub fn add_sample(&mut self, falsified: &Bitset) {
        if falsified.is_empty() {
            return;
        }
        let column = self.columns;
        self.columns += 1;
        for c in falsified.iter() {
            if c < self.rows.len() {
                self.rows[c].set(column);
            }
        }
        self.uncovered.set(column);
    }

    /// Whether uncovered columns remain.
    pub fn has_remaining_samples(&self) -> bool {
        !self.uncovered.is_empty()
    }

    /// Number of currently uncovered columns a row would cover.
    pub fn covered_samples(&self, row: usize) -> usize {
        let mut covered = self.rows[row].clone();
        covered.intersect_with(&self.uncovered);
        covered.count()
    }

    /// The row covering the most uncovered columns; ties break toward the
    /// smaller constraint id.
    pub fn max_degree_constraint(&self) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for row in 0..self.rows.len() {
            let coverage = self.covered_samples(row);
            if coverage == 0 {
                continue;
            }
            if best.map_or(true, |(_, best_cov)| coverage > best_cov) {
                best = Some((row, coverage));
            }
        }
        best.map(|(row, _)| row)
    }

    /// Mark a row as selected, covering its columns.
    pub fn select_constraint(&mut self, row: usize) {
        let covered = self.rows[row].clone();
        self.uncovered.difference_with(&covered);
    }

    /// Drop duplicate columns (identical row membership), keeping one
    /// representative each.
    pub fn remove_duplicate_columns(&mut self) {
        let mut seen: FxHashSet<Bitset> = FxHashSet::default();
        for column in 0..self.columns {
            if !self.uncovered.test(column) {
                continue;
            }
            let signature: Bitset = (0..self.rows.len())
                .filter(|&r| self.rows[r].test(column))
                .collect();
            if !seen.insert(signature) {
                self.uncovered.clear(column);
                for row in &mut self.rows {
                    row.clear(column);
                }
            }
        }
    }

    /// Rows that are the only cover of some column. Selecting them first
    /// is always optimal.
    pub fn select_essential_constraints(&mut self) -> Vec<usize> {
        let mut essential: Vec<usize> = Vec::new();
        for column in self.uncovered.clone().iter() {
            let covering: Vec<usize> = (0..self.rows.len())
                .filter(|&r| self.rows[r].test(column))
                .collect();
            if let [only] = covering[..] {
                essential.push(only);
            }
        }
        essential.sort_unstable();
        essential.dedup();
        for &row in &essential {
            self.select_constraint(row);
        }
        essential
    }

    /// The rows still covering uncovered columns, with their remaining
    /// coverage.
    pub fn remaining_constraints(&self) -> Vec<(usize, Bitset)> {
        (0..self.rows.len())
            .filter_map(|row| {
                let mut covered = self.rows[row].clone();
                covered.intersect_with(&self.uncovered);
                if covered.is_empty() {
                    None
                } else {
                    Some((row, covered))
                }
            })
            .collect()
    }
}

/// Compute an infeasible subset (constraint row indices) under the given
/// heuristic. `weights[c]` is consulted by the weighted policies; ties
/// always break toward the lower constraint id.
pub fn generate_mis(
    graph: &ConflictGraph,
    heuristic: MisHeuristic,
    weights: &[f64],
) -> Vec<usize> {
    let mut cg = graph.clone();
    let mut mis: Vec<usize> = Vec::new();
    match heuristic {
        MisHeuristic::Trivial => {
            mis.extend(0..cg.num_constraints());
        }
        MisHeuristic::Greedy => {
            greedy(&mut cg, &mut mis);
        }
        MisHeuristic::GreedyPre => {
            cg.remove_duplicate_columns();
            mis.extend(cg.select_essential_constraints());
            greedy(&mut cg, &mut mis);
        }
        MisHeuristic::Hybrid => {
            mis.extend(cg.select_essential_constraints());
            cg.remove_duplicate_columns();
            while cg.remaining_constraints().len() > HYBRID_EXHAUSTIVE_LIMIT
                && cg.has_remaining_samples()
            {
                let Some(row) = cg.max_degree_constraint() else {
                    break;
                };
                mis.push(row);
                cg.select_constraint(row);
            }
            exhaustive_cover(&cg, None, &mut mis);
        }
        MisHeuristic::GreedyWeighted => {
            mis.extend(cg.select_essential_constraints());
            cg.remove_duplicate_columns();
            greedy_weighted(&mut cg, weights, &mut mis);
        }
        MisHeuristic::HybridWeighted => {
            mis.extend(cg.select_essential_constraints());
            cg.remove_duplicate_columns();
            while cg.remaining_constraints().len() > HYBRID_EXHAUSTIVE_LIMIT
                && cg.has_remaining_samples()
            {
                let Some(row) = pick_weighted(&cg, weights) else {
                    break;
                };
                mis.push(row);
                cg.select_constraint(row);
            }
            exhaustive_cover(&cg, Some(weights), &mut mis);
        }
    }
    mis.sort_unstable();
    mis.dedup();
    mis
}

fn greedy(cg: &mut ConflictGraph, mis: &mut Vec<usize>) {
    while cg.has_remaining_samples() {
        let Some(row) = cg.max_degree_constraint() else {
            break;
        };
        mis.push(row);
        cg.select_constraint(row);
    }
}

/// The row maximizing `coverage / weight`; equal scores break toward the
/// lower constraint id.
fn pick_weighted(cg: &ConflictGraph, weights: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for row in 0..cg.num_constraints() {
        let coverage = cg.covered_samples(row);
        if coverage == 0 {
            continue;
        }
        let weight = weights.get(row).copied().unwrap_or(1.0);
        let score = coverage as f64 / weight;
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((row, score));
        }
    }
    best.map(|(row, _)| row)
}

fn greedy_weighted(cg: &mut ConflictGraph, weights: &[f64], mis: &mut Vec<usize>) {
    while cg.has_remaining_samples() {
        let Some(row) = pick_weighted(cg, weights) else {
            break;
        };
        mis.push(row);
        cg.select_constraint(row);
    }
}

/// Optimal cover of the remaining columns by subset enumeration in
/// ascending cardinality (or ascending total weight when weights are
/// given). Only called with at most a handful of remaining rows.
fn exhaustive_cover(cg: &ConflictGraph, weights: Option<&[f64]>, mis: &mut Vec<usize>) {
    if !cg.has_remaining_samples() {
        return;
    }
    let remaining = cg.remaining_constraints();
    let n = remaining.len();
    let mut goal = Bitset::new();
    for (_, covered) in &remaining {
        goal.union_with(covered);
    }
    let mut best: Option<(Vec<usize>, f64, usize)> = None;
    for mask in 1u32..(1 << n) {
        let mut cover = Bitset::new();
        let mut chosen: Vec<usize> = Vec::new();
        let mut weight = 0.0;
        for (i, (row, covered)) in remaining.iter().enumerate() {
            if mask & (1 << i) != 0 {
                cover.union_with(covered);
                chosen.push(*row);
                weight += weights
                    .and_then(|w| w.get(*row).copied())
                    .unwrap_or(1.0);
            }
        }
        if !goal.is_subset_of(&cover) {
            continue;
        }
        let better = match (&best, weights) {
            (None, _) => true,
            (Some((_, _, best_len)), None) => chosen.len() < *best_len,
            (Some((_, best_weight, _)), Some(_)) => weight < *best_weight,
        };
        if better {
            best = Some((chosen, weight, mask.count_ones() as usize));
        }
    }
    if let Some((chosen, _, _)) = best {
        mis.extend(chosen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(indices: &[usize]) -> Bitset {
        Bitset::from_indices(indices.iter().copied())
    }

    /// Rows 0..3; row 1 covers both columns, rows 0 and 2 one each.
    fn diamond() -> ConflictGraph {
        let mut cg = ConflictGraph::new(3);
        cg.add_sample(&bits(&[0, 1]));
        cg.add_sample(&bits(&[1, 2]));
        cg
    }

    #[test]
    fn greedy_picks_the_covering_row() {
        let cg = diamond();
        let mis = generate_mis(&cg, MisHeuristic::Greedy, &[]);
        assert_eq!(mis, vec![1]);
    }

    #[test]
    fn trivial_returns_everything() {
        let cg = diamond();
        let mis = generate_mis(&cg, MisHeuristic::Trivial, &[]);
        assert_eq!(mis, vec![0, 1, 2]);
    }

    #[test]
    fn essential_rows_are_forced() {
        // Column 0 is covered only by row 2.
        let mut cg = ConflictGraph::new(3);
        cg.add_sample(&bits(&[2]));
        cg.add_sample(&bits(&[0, 1]));
        let mis = generate_mis(&cg, MisHeuristic::GreedyPre, &[]);
        assert!(mis.contains(&2));
        assert_eq!(mis.len(), 2);
    }

    #[test]
    fn hybrid_finds_minimum_cover() {
        // Greedy would pick row 0 (covers 2 columns) then need two more;
        // the optimum is rows 1 and 2.
        let mut cg = ConflictGraph::new(3);
        cg.add_sample(&bits(&[0, 1]));
        cg.add_sample(&bits(&[0, 2]));
        cg.add_sample(&bits(&[1]));
        cg.add_sample(&bits(&[2]));
        let mis = generate_mis(&cg, MisHeuristic::Hybrid, &[]);
        assert_eq!(mis, vec![1, 2]);
    }

    #[test]
    fn weighted_prefers_light_rows() {
        // Both rows cover the single column; row 1 is much lighter.
        let mut cg = ConflictGraph::new(2);
        cg.add_sample(&bits(&[0, 1]));
        let weights = [100.0, 1.0];
        let mis = generate_mis(&cg, MisHeuristic::GreedyWeighted, &weights);
        assert_eq!(mis, vec![1]);
    }

    #[test]
    fn weighted_ties_break_to_lower_id() {
        let mut cg = ConflictGraph::new(2);
        cg.add_sample(&bits(&[0, 1]));
        let weights = [2.0, 2.0];
        let mis = generate_mis(&cg, MisHeuristic::HybridWeighted, &weights);
        assert_eq!(mis, vec![0]);
    }

    #[test]
    fn duplicate_columns_collapse() {
        let mut cg = ConflictGraph::new(2);
        cg.add_sample(&bits(&[0, 1]));
        cg.add_sample(&bits(&[0, 1]));
        cg.remove_duplicate_columns();
        assert_eq!(cg.covered_samples(0), 1);
    }

    #[test]
    fn row_weight_formula() {
        let w = row_weight(4, 0.0);
        assert!((w - 13.0).abs() < 1e-9);
        let active = row_weight(4, 9.0);
        assert!((active - 4.0).abs() < 1e-9);
    }
}
