//! Per-level covering state.
//!
//! A level accumulates unsat intervals: regions of the current variable's
//! real line on which some constraint set is known to be violated. When
//! the intervals cover the whole line the level is refuted and the
//! covering is characterized one level down; otherwise a sample outside
//! the covering is produced for lifting.
//!
//! The covering, its status and the last sample outside are cached and
//! only recomputed when the interval set changes.

use num_rational::BigRational;
use rasat_core::{Bitset, PolyId, PolyPool};
use rasat_math::algebraic::number::{rational_above, rational_below, rational_between};
use rasat_math::{RealAlgebraicNumber, Var};
use tracing::trace;

use crate::onecell::{project_cell, CellRepresentation};

/// Status of a level's covering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoveringStatus {
    /// The intervals do not cover the line; a sample outside exists.
    Partial,
    /// The intervals cover the whole line.
    Full,
    /// Not computed yet.
    Unknown,
    /// Characterization failed (projection obstruction).
    Failed,
}

/// A region of the line on which the origins are violated.
#[derive(Debug, Clone)]
pub struct UnsatInterval {
    /// Lower endpoint; `None` is negative infinity.
    pub lower: Option<RealAlgebraicNumber>,
    /// Upper endpoint; `None` is positive infinity.
    pub upper: Option<RealAlgebraicNumber>,
    /// Whether the lower endpoint itself is excluded from the interval.
    pub lower_strict: bool,
    /// Whether the upper endpoint itself is excluded.
    pub upper_strict: bool,
    /// Constraint indices whose violation this interval witnesses.
    pub origins: Bitset,
    /// The cell representation justifying the interval, if one was
    /// derived.
    pub cell: Option<CellRepresentation>,
}

impl UnsatInterval {
    /// The point interval `[value, value]`.
    pub fn point(value: RealAlgebraicNumber, origins: Bitset) -> Self {
        Self {
            lower: Some(value.clone()),
            upper: Some(value),
            lower_strict: false,
            upper_strict: false,
            origins,
            cell: None,
        }
    }

    /// Whether the interval contains a value.
    pub fn contains(&self, value: &RealAlgebraicNumber) -> bool {
        if let Some(lower) = &self.lower {
            match value.cmp(lower) {
                std::cmp::Ordering::Less => return false,
                std::cmp::Ordering::Equal if self.lower_strict => return false,
                _ => {}
            }
        }
        if let Some(upper) = &self.upper {
            match value.cmp(upper) {
                std::cmp::Ordering::Greater => return false,
                std::cmp::Ordering::Equal if self.upper_strict => return false,
                _ => {}
            }
        }
        true
    }
}

/// Everything known about one level of the covering search.
#[derive(Debug, Default)]
pub struct LevelCovering {
    intervals: Vec<UnsatInterval>,
    status: Option<CoveringStatus>,
    sample_outside: Option<RealAlgebraicNumber>,
    used: Vec<usize>,
}

impl LevelCovering {
    /// An empty level.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all information.
    pub fn clear(&mut self) {
        self.intervals.clear();
        self.status = None;
        self.sample_outside = None;
        self.used.clear();
    }

    /// Number of stored intervals.
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Whether no interval is stored.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// The stored intervals.
    pub fn intervals(&self) -> &[UnsatInterval] {
        &self.intervals
    }

    /// Add an interval, invalidating the cached covering.
    pub fn add_interval(&mut self, interval: UnsatInterval) {
        self.intervals.push(interval);
        self.status = None;
        self.used.clear();
    }

    /// The last computed status.
    pub fn status(&self) -> CoveringStatus {
        self.status.unwrap_or(CoveringStatus::Unknown)
    }

    /// The sample outside the covering; only valid after a `Partial`
    /// result.
    pub fn sample_outside(&self) -> Option<&RealAlgebraicNumber> {
        self.sample_outside.as_ref()
    }

    /// Union of the origins of the intervals used by a full covering.
    pub fn covering_origins(&self) -> Bitset {
        let mut origins = Bitset::new();
        for &i in &self.used {
            origins.union_with(&self.intervals[i].origins);
        }
        origins
    }

    /// The intervals participating in the computed covering.
    pub fn used_intervals(&self) -> impl Iterator<Item = &UnsatInterval> {
        self.used.iter().map(|&i| &self.intervals[i])
    }

    /// Compute (or reuse) the covering: sorts the intervals and sweeps the
    /// line. On a partial covering a sample outside is produced, reusing
    /// the previous one when it still lies outside.
    pub fn compute_covering(&mut self) -> CoveringStatus {
        if let Some(status) = self.status {
            return status;
        }
        // Reuse the old sample if it is still outside every interval.
        if let Some(previous) = self.sample_outside.clone() {
            if self.intervals.iter().all(|iv| !iv.contains(&previous)) {
                trace!("covering: previous sample still outside");
                self.status = Some(CoveringStatus::Partial);
                return CoveringStatus::Partial;
            }
        }
        let mut order: Vec<usize> = (0..self.intervals.len()).collect();
        order.sort_by(|&a, &b| compare_lower(&self.intervals[a], &self.intervals[b]));
        // Sweep state: how far the line is covered, and whether that
        // endpoint itself is covered.
        let mut reach: Option<(RealAlgebraicNumber, bool)> = None;
        let mut started_at_minus_infinity = false;
        let mut used: Vec<usize> = Vec::new();
        for &i in &order {
            let interval = &self.intervals[i];
            let connects = match (&reach, &interval.lower) {
                (_, None) => true,
                (None, Some(_)) => false,
                (Some((value, inclusive)), Some(lower)) => match lower.cmp(value) {
                    std::cmp::Ordering::Less => true,
                    std::cmp::Ordering::Equal => *inclusive || !interval.lower_strict,
                    std::cmp::Ordering::Greater => false,
                },
            };
            if !connects {
                break;
            }
            if interval.lower.is_none() {
                started_at_minus_infinity = true;
            }
            match &interval.upper {
                None => {
                    // Covered all the way up.
                    used.push(i);
                    if started_at_minus_infinity {
                        self.used = used;
                        self.sample_outside = None;
                        self.status = Some(CoveringStatus::Full);
                        return CoveringStatus::Full;
                    }
                    // Only reachable when the sweep never started at
                    // negative infinity; handled below.
                    break;
                }
                Some(upper) => {
                    let extends = match &reach {
                        None => true,
                        Some((value, inclusive)) => match upper.cmp(value) {
                            std::cmp::Ordering::Greater => true,
                            std::cmp::Ordering::Equal => !inclusive && !interval.upper_strict,
                            std::cmp::Ordering::Less => false,
                        },
                    };
                    if extends {
                        reach = Some((upper.clone(), !interval.upper_strict));
                        used.push(i);
                    }
                }
            }
        }
        // Partial: find a point outside.
        let sample = if !started_at_minus_infinity {
            match self
                .intervals
                .iter()
                .filter_map(|iv| iv.lower.as_ref())
                .min()
            {
                Some(least) => RealAlgebraicNumber::Rational(rational_below(least)),
                None => RealAlgebraicNumber::Rational(BigRational::from_integer(0.into())),
            }
        } else {
            match &reach {
                Some((value, inclusive)) => {
                    if !inclusive {
                        value.clone()
                    } else {
                        // The next interval (if any) starts strictly above
                        // the reach, otherwise anything above works.
                        let next_lower = self
                            .intervals
                            .iter()
                            .filter_map(|iv| iv.lower.as_ref())
                            .filter(|l| *l > value)
                            .min();
                        match next_lower {
                            Some(next) => {
                                RealAlgebraicNumber::Rational(rational_between(value, next))
                            }
                            None => RealAlgebraicNumber::Rational(rational_above(value)),
                        }
                    }
                }
                None => RealAlgebraicNumber::Rational(BigRational::from_integer(0.into())),
            }
        };
        debug_assert!(self.intervals.iter().all(|iv| !iv.contains(&sample)));
        trace!(sample = %sample, "covering: partial, sample outside");
        self.used = used;
        self.sample_outside = Some(sample);
        self.status = Some(CoveringStatus::Partial);
        CoveringStatus::Partial
    }

    /// Characterize a full covering one level down: project the cell
    /// representations of the used intervals, producing the lower-level
    /// polynomials whose sign-invariance preserves the refutation.
    pub fn characterize(&self, polys: &mut PolyPool, var: Var) -> Vec<PolyId> {
        let mut out: Vec<PolyId> = Vec::new();
        for interval in self.used_intervals() {
            if let Some(cell) = &interval.cell {
                for id in project_cell(polys, var, cell) {
                    if !out.contains(&id) {
                        out.push(id);
                    }
                }
            }
        }
        out
    }
}

fn compare_lower(a: &UnsatInterval, b: &UnsatInterval) -> std::cmp::Ordering {
    match (&a.lower, &b.lower) {
        (None, None) => std::cmp::Ordering::Equal,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (Some(_), None) => std::cmp::Ordering::Greater,
        (Some(x), Some(y)) => x
            .cmp(y)
            .then_with(|| a.lower_strict.cmp(&b.lower_strict)),
    }
}
