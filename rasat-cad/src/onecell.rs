//! One-cell representations in the McCallum style.
//!
//! A local conflict at a sample is generalized to an open, connected cell:
//! a description of the current level (a section on a named root, or a
//! sector between named roots or infinities) together with an indexed
//! root ordering and the properties that must be projected one level down
//! for the description to stay invariant — sign-invariance of each
//! irreducible factor, order-invariance, partial delineation, and
//! well-definedness of each named root.

use rasat_core::{PolyId, PolyPool};
use rasat_math::{RealAlgebraicNumber, Var};

/// A root of a polynomial named by its position (1-based) in the
/// ascending list of real roots at the current assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexedRoot {
    /// The polynomial whose root is named.
    pub poly: PolyId,
    /// 1-based root index at the underlying assignment.
    pub index: usize,
}

/// One bound of a sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellBound {
    /// Unbounded below.
    NegInfinity,
    /// Unbounded above.
    PosInfinity,
    /// Bounded by a named root.
    Root(IndexedRoot),
}

/// Description of a cell at one level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellDescription {
    /// The point cell on a named root.
    Section(IndexedRoot),
    /// The open cell between two bounds.
    Sector(CellBound, CellBound),
}

/// An ordering constraint between two named roots that must hold for the
/// cell description to be stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootOrderingPair {
    /// The smaller root.
    pub lower: IndexedRoot,
    /// The larger root.
    pub upper: IndexedRoot,
}

/// Properties required of the lower levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    /// Sign-invariance of an (irreducible) polynomial.
    SgnInv(PolyId),
    /// Order-invariance of a polynomial.
    OrdInv(PolyId),
    /// Partial delineation of a polynomial over the cell.
    Pdel(PolyId),
    /// Well-definedness of a named root over the cell.
    RootWellDef(IndexedRoot),
}

/// A cell representation: description, root ordering, and the property
/// set to propagate.
#[derive(Debug, Clone)]
pub struct CellRepresentation {
    /// The level this cell lives at.
    pub level: Var,
    /// The shape of the cell.
    pub description: CellDescription,
    /// Ordering proofs between the named roots adjacent to the cell.
    pub ordering: Vec<RootOrderingPair>,
    /// Properties required one level down.
    pub properties: Vec<Property>,
}

/// Roots of one polynomial at the current assignment, tagged with their
/// indices.
#[derive(Debug, Clone)]
pub struct DelineatedPoly {
    /// The polynomial.
    pub poly: PolyId,
    /// Its real roots at the assignment, ascending.
    pub roots: Vec<RealAlgebraicNumber>,
}

/// Build the cell representation of `sample` with respect to the
/// delineated level polynomials.
///
/// The description picks, among all roots of all polynomials, the tightest
/// bounds enclosing the sample (or the section the sample lies on); the
/// ordering records how the chosen bounds relate to every other root so
/// the shape is reproducible; the properties request sign-invariance for
/// every level polynomial and well-definedness for every named root.
pub fn describe_cell(
    level: Var,
    sample: &RealAlgebraicNumber,
    delineated: &[DelineatedPoly],
) -> CellRepresentation {
    let mut below: Option<(RealAlgebraicNumber, IndexedRoot)> = None;
    let mut above: Option<(RealAlgebraicNumber, IndexedRoot)> = None;
    let mut section: Option<IndexedRoot> = None;
    for dp in delineated {
        for (i, root) in dp.roots.iter().enumerate() {
            let named = IndexedRoot {
                poly: dp.poly,
                index: i + 1,
            };
            match root.cmp(sample) {
                std::cmp::Ordering::Equal => section = Some(named),
                std::cmp::Ordering::Less => {
                    if below.as_ref().map_or(true, |(b, _)| root > b) {
                        below = Some((root.clone(), named));
                    }
                }
                std::cmp::Ordering::Greater => {
                    if above.as_ref().map_or(true, |(a, _)| root < a) {
                        above = Some((root.clone(), named));
                    }
                }
            }
        }
    }
    let description = match section {
        Some(root) => CellDescription::Section(root),
        None => CellDescription::Sector(
            below
                .as_ref()
                .map_or(CellBound::NegInfinity, |(_, r)| CellBound::Root(*r)),
            above
                .as_ref()
                .map_or(CellBound::PosInfinity, |(_, r)| CellBound::Root(*r)),
        ),
    };
    // Ordering proofs: every root below the cell is ordered against the
    // lower bound, every root above against the upper bound.
    let mut ordering = Vec::new();
    if let (Some((bv, br)), Some((av, ar))) = (&below, &above) {
        debug_assert!(bv < av);
        ordering.push(RootOrderingPair {
            lower: *br,
            upper: *ar,
        });
    }
    for dp in delineated {
        for (i, root) in dp.roots.iter().enumerate() {
            let named = IndexedRoot {
                poly: dp.poly,
                index: i + 1,
            };
            if let Some((bv, br)) = &below {
                if root < bv {
                    ordering.push(RootOrderingPair {
                        lower: named,
                        upper: *br,
                    });
                }
            }
            if let Some((av, ar)) = &above {
                if root > av {
                    ordering.push(RootOrderingPair {
                        lower: *ar,
                        upper: named,
                    });
                }
            }
        }
    }
    let mut properties: Vec<Property> = Vec::new();
    for dp in delineated {
        properties.push(Property::SgnInv(dp.poly));
        properties.push(Property::Pdel(dp.poly));
    }
    match &description {
        CellDescription::Section(root) => {
            properties.push(Property::RootWellDef(*root));
            properties.push(Property::OrdInv(root.poly));
        }
        CellDescription::Sector(lower, upper) => {
            for bound in [lower, upper] {
                if let CellBound::Root(root) = bound {
                    properties.push(Property::RootWellDef(*root));
                }
            }
        }
    }
    CellRepresentation {
        level,
        description,
        ordering,
        properties,
    }
}

/// Project the cell's properties one level down: discriminants and
/// leading coefficients for sign-invariance and delineation, resultants
/// between polynomials related by the root ordering or sharing the cell
/// boundary. Returns the non-constant lower-level polynomials.
pub fn project_cell(
    polys: &mut PolyPool,
    var: Var,
    repr: &CellRepresentation,
) -> Vec<PolyId> {
    let mut out: Vec<PolyId> = Vec::new();
    let mut push = |polys: &mut PolyPool, id: PolyId, out: &mut Vec<PolyId>| {
        if !polys.get(id).is_constant() && !out.contains(&id) {
            out.push(id);
        }
    };
    let mut level_polys: Vec<PolyId> = Vec::new();
    for property in &repr.properties {
        match property {
            Property::SgnInv(p) | Property::OrdInv(p) | Property::Pdel(p) => {
                if !level_polys.contains(p) {
                    level_polys.push(*p);
                }
            }
            Property::RootWellDef(root) => {
                if !level_polys.contains(&root.poly) {
                    level_polys.push(root.poly);
                }
            }
        }
    }
    for &p in &level_polys {
        let disc = polys.discriminant(p, var);
        push(polys, disc, &mut out);
        let ldcf = polys.leading_coeff(p, var);
        push(polys, ldcf, &mut out);
    }
    for pair in &repr.ordering {
        if pair.lower.poly != pair.upper.poly {
            let res = polys.resultant(pair.lower.poly, pair.upper.poly, var);
            push(polys, res, &mut out);
        }
    }
    // Boundary polynomials are related to every level polynomial.
    let bounds: Vec<PolyId> = match &repr.description {
        CellDescription::Section(root) => vec![root.poly],
        CellDescription::Sector(lower, upper) => [lower, upper]
            .into_iter()
            .filter_map(|b| match b {
                CellBound::Root(root) => Some(root.poly),
                _ => None,
            })
            .collect(),
    };
    for &bound in &bounds {
        for &p in &level_polys {
            if p != bound {
                let res = polys.resultant(bound, p, var);
                push(polys, res, &mut out);
            }
        }
    }
    out
}
