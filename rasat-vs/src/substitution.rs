//! Test candidate generation and substitution application.
//!
//! For a condition of degree at most two in the eliminated variable, the
//! candidates are the symbolic roots (with the coefficient side
//! conditions that make them roots), epsilon-shifted for strict
//! relations, plus minus infinity for non-equations and plus infinity in
//! integer branch-and-bound mode.
//!
//! Applying a substitution to a constraint produces a disjunction of
//! conjunctions of new constraints: the square-root sign-case rules for
//! normal substitutions, a derivative cascade for epsilon, and a
//! leading-coefficient cascade for the infinities.

use rasat_core::{Bitset, Relation};
use rasat_math::{Polynomial, Var};
use std::fmt;

use crate::sqrt_expr::{dnf_and, sign_cases, Dnf, SqrtExpr};

/// The kind of symbolic value substituted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstitutionType {
    /// The term itself.
    Normal,
    /// The term plus an infinitesimal.
    PlusEpsilon,
    /// Below every root.
    MinusInfinity,
    /// Above every root (integer branch-and-bound only).
    PlusInfinity,
    /// Refuted during construction.
    Invalid,
}

/// A substitution `var -> term` with side conditions and origins.
#[derive(Debug, Clone)]
pub struct Substitution {
    /// The eliminated variable.
    pub var: Var,
    /// Kind of the substituted value.
    pub kind: SubstitutionType,
    /// The symbolic term; absent for the infinities.
    pub term: Option<SqrtExpr>,
    /// Constraints that must hold for the term to be well defined (for
    /// example a nonzero denominator and a non-negative radicand).
    pub side_conditions: Vec<(Polynomial, Relation)>,
    /// Input constraints the generating condition descends from.
    pub origins: Bitset,
}

impl Substitution {
    /// A normal or epsilon substitution; the nonzero-denominator side
    /// condition is always recorded.
    pub fn with_term(
        var: Var,
        kind: SubstitutionType,
        term: SqrtExpr,
        mut side_conditions: Vec<(Polynomial, Relation)>,
        origins: Bitset,
    ) -> Self {
        debug_assert!(matches!(
            kind,
            SubstitutionType::Normal | SubstitutionType::PlusEpsilon
        ));
        if !side_conditions
            .iter()
            .any(|(p, rel)| *p == term.s && *rel == Relation::Neq)
        {
            side_conditions.push((term.s.clone(), Relation::Neq));
        }
        Self {
            var,
            kind,
            term: Some(term),
            side_conditions,
            origins,
        }
    }

    /// The minus-infinity substitution.
    pub fn minus_infinity(var: Var, origins: Bitset) -> Self {
        Self {
            var,
            kind: SubstitutionType::MinusInfinity,
            term: None,
            side_conditions: Vec::new(),
            origins,
        }
    }

    /// The plus-infinity substitution (integer mode).
    pub fn plus_infinity(var: Var, origins: Bitset) -> Self {
        Self {
            var,
            kind: SubstitutionType::PlusInfinity,
            term: None,
            side_conditions: Vec::new(),
            origins,
        }
    }
}

impl fmt::Display for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.term) {
            (SubstitutionType::MinusInfinity, _) => write!(f, "x{} -> -inf", self.var),
            (SubstitutionType::PlusInfinity, _) => write!(f, "x{} -> +inf", self.var),
            (SubstitutionType::PlusEpsilon, Some(t)) => {
                write!(f, "x{} -> {} + eps", self.var, t)
            }
            (_, Some(t)) => write!(f, "x{} -> {}", self.var, t),
            _ => write!(f, "x{} -> invalid", self.var),
        }
    }
}

/// Outcome of candidate generation for one condition.
#[derive(Debug, Clone)]
pub enum CandidateResult {
    /// The candidates, possibly empty.
    Candidates(Vec<Substitution>),
    /// Degree three or higher: defer the condition to a backend.
    TooHighDegree,
}

/// Generate the test candidates contributed by `poly ~ 0` for `var`.
pub fn test_candidates(
    poly: &Polynomial,
    relation: Relation,
    var: Var,
    origins: &Bitset,
) -> CandidateResult {
    let degree = poly.degree_in(var);
    let kind = if relation.is_strict() {
        SubstitutionType::PlusEpsilon
    } else {
        SubstitutionType::Normal
    };
    match degree {
        0 => CandidateResult::Candidates(Vec::new()),
        1 => {
            let coeffs = poly.coeffs_wrt(var);
            let b = coeffs[1].clone();
            let d = coeffs[0].clone();
            let term = SqrtExpr::fraction(-&d, b.clone());
            let side = vec![(b, Relation::Neq)];
            CandidateResult::Candidates(vec![Substitution::with_term(
                var,
                kind,
                term,
                side,
                origins.clone(),
            )])
        }
        2 => {
            let coeffs = poly.coeffs_wrt(var);
            let a = coeffs[2].clone();
            let b = coeffs[1].clone();
            let d = coeffs[0].clone();
            let mut out = Vec::new();
            // Degenerate linear case: a = 0, b != 0.
            let linear_term = SqrtExpr::fraction(-&d, b.clone());
            out.push(Substitution::with_term(
                var,
                kind,
                linear_term,
                vec![(a.clone(), Relation::Eq), (b.clone(), Relation::Neq)],
                origins.clone(),
            ));
            // Quadratic roots: a != 0, b^2 - 4ad >= 0.
            let disc = &(&b * &b) - &(&(&a * &d) * &Polynomial::from_int(4));
            let two_a = &a * &Polynomial::from_int(2);
            for sign in [1i64, -1] {
                let q = Polynomial::from_int(sign);
                let term = SqrtExpr::new(-&b, q, disc.clone(), two_a.clone());
                out.push(Substitution::with_term(
                    var,
                    kind,
                    term,
                    vec![(a.clone(), Relation::Neq), (disc.clone(), Relation::Geq)],
                    origins.clone(),
                ));
            }
            CandidateResult::Candidates(out)
        }
        _ => CandidateResult::TooHighDegree,
    }
}

/// Apply a substitution to `poly ~ 0`, yielding a DNF over the remaining
/// variables. An empty DNF is a refutation of the constraint under the
/// substitution.
pub fn apply(subst: &Substitution, poly: &Polynomial, relation: Relation) -> Dnf {
    let dnf = match subst.kind {
        SubstitutionType::Normal => apply_normal(subst, poly, relation),
        SubstitutionType::PlusEpsilon => apply_epsilon(subst, poly, relation),
        SubstitutionType::MinusInfinity => apply_infinity(poly, subst.var, relation, true),
        SubstitutionType::PlusInfinity => apply_infinity(poly, subst.var, relation, false),
        SubstitutionType::Invalid => Vec::new(),
    };
    simplify_dnf(dnf)
}

fn apply_normal(subst: &Substitution, poly: &Polynomial, relation: Relation) -> Dnf {
    let Some(term) = &subst.term else {
        return Vec::new();
    };
    if !poly.contains_var(subst.var) {
        return vec![vec![(poly.clone(), relation)]];
    }
    let (a, b, degree) = term.substitute_into(poly, subst.var);
    let order_relation = !matches!(relation, Relation::Eq | Relation::Neq);
    if degree % 2 == 1 && order_relation {
        // Odd denominator power: the sign of s decides the direction.
        let mut out = Vec::new();
        for conj in sign_cases(&a, &b, &term.r, relation) {
            let mut with_sign = conj;
            with_sign.push((term.s.clone(), Relation::Greater));
            out.push(with_sign);
        }
        for conj in sign_cases(&a, &b, &term.r, relation.mirrored()) {
            let mut with_sign = conj;
            with_sign.push((term.s.clone(), Relation::Less));
            out.push(with_sign);
        }
        out
    } else {
        sign_cases(&a, &b, &term.r, relation)
    }
}

fn apply_epsilon(subst: &Substitution, poly: &Polynomial, relation: Relation) -> Dnf {
    if !poly.contains_var(subst.var) {
        return vec![vec![(poly.clone(), relation)]];
    }
    let var = subst.var;
    // Derivative tower P, P', P'', ... at the substituted point.
    let mut derivatives = vec![poly.clone()];
    while derivatives
        .last()
        .map(|d| d.contains_var(var))
        .unwrap_or(false)
    {
        let next = derivatives.last().map(|d| d.derivative(var));
        match next {
            Some(d) if !d.is_zero() => derivatives.push(d),
            _ => break,
        }
    }
    let vanishing: Vec<Dnf> = derivatives
        .iter()
        .map(|d| apply_normal(subst, d, Relation::Eq))
        .collect();
    let strict_all_zero = || -> Dnf {
        // Every derivative vanishes at the point.
        let mut acc: Dnf = vec![Vec::new()];
        for zero in &vanishing {
            acc = dnf_and(&acc, zero);
        }
        acc
    };
    let cascade = |leaf_relation: Relation| -> Dnf {
        // First non-vanishing derivative decides the sign.
        let mut out: Dnf = Vec::new();
        let mut prefix: Dnf = vec![Vec::new()];
        for (k, d) in derivatives.iter().enumerate() {
            let leaf = apply_normal(subst, d, leaf_relation);
            out.extend(dnf_and(&prefix, &leaf));
            if k < derivatives.len() - 1 {
                prefix = dnf_and(&prefix, &vanishing[k]);
            }
        }
        out
    };
    match relation {
        Relation::Eq => strict_all_zero(),
        Relation::Neq => cascade(Relation::Neq),
        Relation::Less => cascade(Relation::Less),
        Relation::Greater => cascade(Relation::Greater),
        Relation::Leq => {
            let mut out = cascade(Relation::Less);
            out.extend(strict_all_zero());
            out
        }
        Relation::Geq => {
            let mut out = cascade(Relation::Greater);
            out.extend(strict_all_zero());
            out
        }
    }
}

/// Substitution of an infinity: the highest non-vanishing coefficient
/// decides, with the sign flipped for odd powers at minus infinity.
fn apply_infinity(poly: &Polynomial, var: Var, relation: Relation, minus: bool) -> Dnf {
    if !poly.contains_var(var) {
        return vec![vec![(poly.clone(), relation)]];
    }
    let coeffs = poly.coeffs_wrt(var);
    let all_zero = || -> Vec<(Polynomial, Relation)> {
        coeffs
            .iter()
            .map(|c| (c.clone(), Relation::Eq))
            .collect()
    };
    let dominant = |leaf_strict: Relation, leaf_flipped: Relation| -> Dnf {
        let mut out = Dnf::new();
        for k in (0..coeffs.len()).rev() {
            let mut conj: Vec<(Polynomial, Relation)> = coeffs[k + 1..]
                .iter()
                .map(|c| (c.clone(), Relation::Eq))
                .collect();
            let flip = minus && k % 2 == 1;
            let rel = if flip { leaf_flipped } else { leaf_strict };
            conj.push((coeffs[k].clone(), rel));
            out.push(conj);
        }
        out
    };
    match relation {
        Relation::Eq => vec![all_zero()],
        Relation::Neq => dominant(Relation::Neq, Relation::Neq),
        Relation::Less => dominant(Relation::Less, Relation::Greater),
        Relation::Greater => dominant(Relation::Greater, Relation::Less),
        Relation::Leq => {
            let mut out = dominant(Relation::Less, Relation::Greater);
            out.push(all_zero());
            out
        }
        Relation::Geq => {
            let mut out = dominant(Relation::Greater, Relation::Less);
            out.push(all_zero());
            out
        }
    }
}

/// Drop trivially true conjuncts and conjunctions containing a trivially
/// false constraint.
pub fn simplify_dnf(dnf: Dnf) -> Dnf {
    let mut out = Dnf::new();
    'conjunctions: for conj in dnf {
        let mut kept = Vec::with_capacity(conj.len());
        for (poly, rel) in conj {
            if let Some(value) = poly.constant_value() {
                let sign = rasat_math::polynomial::Sign::of_rational(&value);
                if rel.holds_on(sign) {
                    continue;
                }
                continue 'conjunctions;
            }
            kept.push((poly, rel));
        }
        out.push(kept);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;
    use num_rational::BigRational;

    fn q(n: i64) -> BigRational {
        BigRational::from_integer(BigInt::from(n))
    }

    fn x() -> Polynomial {
        Polynomial::variable(0)
    }

    fn y() -> Polynomial {
        Polynomial::variable(1)
    }

    fn c(n: i64) -> Polynomial {
        Polynomial::constant(q(n))
    }

    fn origins() -> Bitset {
        Bitset::from_indices([0])
    }

    /// A DNF over constant polynomials is decided by evaluation.
    fn dnf_holds(dnf: &Dnf) -> bool {
        let empty = rustc_hash::FxHashMap::default();
        dnf.iter().any(|conj| {
            conj.iter().all(|(poly, rel)| {
                poly.evaluate(&empty)
                    .map(|v| rel.holds_on(rasat_math::polynomial::Sign::of_rational(&v)))
                    .unwrap_or(false)
            })
        })
    }

    #[test]
    fn linear_candidate_shape() {
        // 2x + y = 0 contributes x -> -y/2 under b != 0.
        let poly = &x().scale(&q(2)) + &y();
        let CandidateResult::Candidates(cands) = test_candidates(&poly, Relation::Eq, 0, &origins())
        else {
            panic!("degree 1");
        };
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].kind, SubstitutionType::Normal);
        let term = cands[0].term.as_ref().expect("term");
        assert_eq!(term.p, -&y());
        assert_eq!(term.s, c(2));
        assert!(cands[0]
            .side_conditions
            .iter()
            .any(|(p, rel)| *p == c(2) && *rel == Relation::Neq));
    }

    #[test]
    fn strict_relations_get_epsilon() {
        let poly = &x() - &c(1);
        let CandidateResult::Candidates(cands) =
            test_candidates(&poly, Relation::Less, 0, &origins())
        else {
            panic!("degree 1");
        };
        assert_eq!(cands[0].kind, SubstitutionType::PlusEpsilon);
    }

    #[test]
    fn quadratic_produces_three_candidates() {
        // x^2 + x - 2 = 0
        let poly = &(&(&x() * &x()) + &x()) - &c(2);
        let CandidateResult::Candidates(cands) = test_candidates(&poly, Relation::Eq, 0, &origins())
        else {
            panic!("degree 2");
        };
        assert_eq!(cands.len(), 3);
        // One degenerate linear candidate, two radical candidates.
        let radical = cands
            .iter()
            .filter(|s| !s.term.as_ref().expect("term").is_polynomial_fraction())
            .count();
        assert_eq!(radical, 2);
    }

    #[test]
    fn cubic_is_too_high_degree() {
        let poly = x().pow(3);
        assert!(matches!(
            test_candidates(&poly, Relation::Eq, 0, &origins()),
            CandidateResult::TooHighDegree
        ));
    }

    #[test]
    fn normal_substitution_semantics() {
        // x -> 3 into x - 1 > 0: the DNF must hold.
        let subst = Substitution::with_term(
            0,
            SubstitutionType::Normal,
            SqrtExpr::from_polynomial(c(3)),
            Vec::new(),
            origins(),
        );
        let dnf = apply(&subst, &(&x() - &c(1)), Relation::Greater);
        assert!(dnf_holds(&dnf));
        let dnf_false = apply(&subst, &(&x() - &c(5)), Relation::Greater);
        assert!(!dnf_holds(&dnf_false));
    }

    #[test]
    fn normal_substitution_into_other_variable() {
        // x -> 3 into y - 1 > 0 leaves the constraint untouched.
        let subst = Substitution::with_term(
            0,
            SubstitutionType::Normal,
            SqrtExpr::from_polynomial(c(3)),
            Vec::new(),
            origins(),
        );
        let dnf = apply(&subst, &(&y() - &c(1)), Relation::Greater);
        assert_eq!(dnf, vec![vec![(&y() - &c(1), Relation::Greater)]]);
    }

    #[test]
    fn epsilon_satisfies_strict_bound_at_root() {
        // x -> 0 + eps into x > 0 holds (first derivative positive).
        let subst = Substitution::with_term(
            0,
            SubstitutionType::PlusEpsilon,
            SqrtExpr::from_polynomial(c(0)),
            Vec::new(),
            origins(),
        );
        let dnf = apply(&subst, &x(), Relation::Greater);
        assert!(dnf_holds(&dnf));
        // x -> 0 + eps into x < 0 fails.
        let dnf_false = apply(&subst, &x(), Relation::Less);
        assert!(!dnf_holds(&dnf_false));
        // And an equation never tolerates the infinitesimal.
        let dnf_eq = apply(&subst, &x(), Relation::Eq);
        assert!(!dnf_holds(&dnf_eq));
    }

    #[test]
    fn epsilon_respects_curvature() {
        // x -> 1 + eps into (x - 1)^2 > 0: second derivative positive.
        let square = &(&x() - &c(1)) * &(&x() - &c(1));
        let subst = Substitution::with_term(
            0,
            SubstitutionType::PlusEpsilon,
            SqrtExpr::from_polynomial(c(1)),
            Vec::new(),
            origins(),
        );
        let dnf = apply(&subst, &square, Relation::Greater);
        assert!(dnf_holds(&dnf));
        let dnf_false = apply(&subst, &square, Relation::Less);
        assert!(!dnf_holds(&dnf_false));
    }

    #[test]
    fn minus_infinity_on_linear() {
        // x < 0 holds at -inf; x > 0 does not.
        let subst = Substitution::minus_infinity(0, origins());
        assert!(dnf_holds(&apply(&subst, &x(), Relation::Less)));
        assert!(!dnf_holds(&apply(&subst, &x(), Relation::Greater)));
    }

    #[test]
    fn minus_infinity_on_even_power() {
        // x^2 > 0 holds at -inf, x^2 < 0 does not.
        let subst = Substitution::minus_infinity(0, origins());
        let square = &x() * &x();
        assert!(dnf_holds(&apply(&subst, &square, Relation::Greater)));
        assert!(!dnf_holds(&apply(&subst, &square, Relation::Less)));
    }

    #[test]
    fn plus_infinity_on_linear() {
        let subst = Substitution::plus_infinity(0, origins());
        assert!(dnf_holds(&apply(&subst, &x(), Relation::Greater)));
        assert!(!dnf_holds(&apply(&subst, &x(), Relation::Less)));
    }

    #[test]
    fn radical_substitution_satisfies_defining_equation() {
        // x -> sqrt(2) into x^2 - 2 = 0 holds.
        let sqrt2 = SqrtExpr::new(c(0), c(1), c(2), c(1));
        let subst = Substitution::with_term(
            0,
            SubstitutionType::Normal,
            sqrt2,
            vec![(c(2), Relation::Geq)],
            origins(),
        );
        let dnf = apply(&subst, &(&(&x() * &x()) - &c(2)), Relation::Eq);
        assert!(dnf_holds(&dnf));
        // And x > 0 holds at sqrt(2).
        let dnf_pos = apply(&subst, &x(), Relation::Greater);
        assert!(dnf_holds(&dnf_pos));
    }

    #[test]
    fn negative_discriminant_candidates_are_refuted_by_side_conditions() {
        // x^2 + 1 = 0: every root candidate carries a side condition that
        // is constant false, so the equality is refuted; the inequality
        // x^2 + 1 > 0 survives through the minus-infinity candidate.
        let poly = &(&x() * &x()) + &c(1);
        let CandidateResult::Candidates(cands) = test_candidates(&poly, Relation::Eq, 0, &origins())
        else {
            panic!("degree 2");
        };
        let empty = rustc_hash::FxHashMap::default();
        for cand in &cands {
            let side_fails = cand.side_conditions.iter().any(|(p, rel)| {
                p.evaluate(&empty)
                    .map(|v| !rel.holds_on(rasat_math::polynomial::Sign::of_rational(&v)))
                    .unwrap_or(false)
            });
            assert!(side_fails, "candidate {cand} should be refuted");
        }
        let minus_inf = Substitution::minus_infinity(0, origins());
        assert!(dnf_holds(&apply(&minus_inf, &poly, Relation::Greater)));
        assert!(!dnf_holds(&apply(&minus_inf, &poly, Relation::Eq)));
    }

    #[test]
    fn simplify_drops_trivial_parts() {
        let dnf: Dnf = vec![
            vec![(c(1), Relation::Greater), (x(), Relation::Eq)],
            vec![(c(-1), Relation::Greater), (y(), Relation::Eq)],
        ];
        let simplified = simplify_dnf(dnf);
        assert_eq!(simplified, vec![vec![(x(), Relation::Eq)]]);
    }
}
