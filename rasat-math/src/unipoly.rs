//! Dense univariate polynomials over exact rationals.
//!
//! This is the workhorse representation for root isolation: Sturm
//! sequences, root counting and bisection all operate on the dense
//! coefficient view. Multivariate polynomials are converted to this form
//! once all but one of their variables have been eliminated or assigned.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use std::fmt;

use crate::polynomial::Sign;

/// A dense univariate polynomial; `coeffs[i]` is the coefficient of `x^i`.
///
/// The coefficient vector never has trailing zeros; the zero polynomial is
/// the empty vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniPoly {
    coeffs: Vec<BigRational>,
}

/// Location of one isolated real root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsolatedRoot {
    /// The root is the given rational number.
    Exact(BigRational),
    /// Exactly one root lies in the open interval `(lower, upper)`;
    /// neither endpoint is a root.
    Bracket(BigRational, BigRational),
}

impl UniPoly {
    /// Create from coefficients, lowest degree first; trailing zeros are
    /// trimmed.
    pub fn new(mut coeffs: Vec<BigRational>) -> Self {
        while coeffs.last().is_some_and(Zero::is_zero) {
            coeffs.pop();
        }
        Self { coeffs }
    }

    /// The zero polynomial.
    pub fn zero() -> Self {
        Self { coeffs: Vec::new() }
    }

    /// A constant polynomial.
    pub fn constant(c: BigRational) -> Self {
        Self::new(vec![c])
    }

    /// The polynomial `x - r`.
    pub fn linear_root(r: BigRational) -> Self {
        Self::new(vec![-r, BigRational::one()])
    }

    /// Coefficients, lowest degree first.
    pub fn coeffs(&self) -> &[BigRational] {
        &self.coeffs
    }

    /// Whether this is the zero polynomial.
    pub fn is_zero(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// Whether this is a nonzero constant.
    pub fn is_constant(&self) -> bool {
        self.coeffs.len() <= 1
    }

    /// Degree; zero for constants (including the zero polynomial).
    pub fn degree(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }

    /// Leading coefficient, if nonzero.
    pub fn leading(&self) -> Option<&BigRational> {
        self.coeffs.last()
    }

    /// Evaluate by Horner's rule.
    pub fn evaluate(&self, x: &BigRational) -> BigRational {
        let mut acc = BigRational::zero();
        for c in self.coeffs.iter().rev() {
            acc = acc * x + c;
        }
        acc
    }

    /// Exact sign at a point.
    pub fn sign_at(&self, x: &BigRational) -> Sign {
        Sign::of_rational(&self.evaluate(x))
    }

    /// Formal derivative.
    #[must_use]
    pub fn derivative(&self) -> UniPoly {
        if self.coeffs.len() <= 1 {
            return UniPoly::zero();
        }
        UniPoly::new(
            self.coeffs
                .iter()
                .enumerate()
                .skip(1)
                .map(|(i, c)| c * BigRational::from_integer(BigInt::from(i)))
                .collect(),
        )
    }

    /// Negation.
    #[must_use]
    pub fn negated(&self) -> UniPoly {
        UniPoly {
            coeffs: self.coeffs.iter().map(|c| -c).collect(),
        }
    }

    /// Multiply by a scalar.
    #[must_use]
    pub fn scale(&self, factor: &BigRational) -> UniPoly {
        if factor.is_zero() {
            return UniPoly::zero();
        }
        UniPoly {
            coeffs: self.coeffs.iter().map(|c| c * factor).collect(),
        }
    }

    /// Polynomial sum.
    #[must_use]
    pub fn add(&self, other: &UniPoly) -> UniPoly {
        let n = self.coeffs.len().max(other.coeffs.len());
        let mut coeffs = vec![BigRational::zero(); n];
        for (i, c) in self.coeffs.iter().enumerate() {
            coeffs[i] += c;
        }
        for (i, c) in other.coeffs.iter().enumerate() {
            coeffs[i] += c;
        }
        UniPoly::new(coeffs)
    }

    /// Polynomial product.
    #[must_use]
    pub fn mul(&self, other: &UniPoly) -> UniPoly {
        if self.is_zero() || other.is_zero() {
            return UniPoly::zero();
        }
        let mut coeffs = vec![BigRational::zero(); self.coeffs.len() + other.coeffs.len() - 1];
        for (i, a) in self.coeffs.iter().enumerate() {
            for (j, b) in other.coeffs.iter().enumerate() {
                coeffs[i + j] += a * b;
            }
        }
        UniPoly::new(coeffs)
    }

    /// Euclidean division: returns `(quotient, remainder)`.
    pub fn divmod(&self, divisor: &UniPoly) -> (UniPoly, UniPoly) {
        assert!(!divisor.is_zero(), "division by the zero polynomial");
        if self.degree() < divisor.degree() || self.is_zero() {
            return (UniPoly::zero(), self.clone());
        }
        let mut rem = self.coeffs.clone();
        let dlead = divisor.leading().cloned().unwrap_or_else(BigRational::one);
        let dd = divisor.degree();
        let mut quot = vec![BigRational::zero(); rem.len() - dd];
        while rem.len() > dd && !rem.is_empty() {
            let rl = rem.last().cloned().unwrap_or_else(BigRational::zero);
            if rl.is_zero() {
                rem.pop();
                continue;
            }
            let shift = rem.len() - 1 - dd;
            let factor = rl / &dlead;
            for (i, dc) in divisor.coeffs.iter().enumerate() {
                let delta = dc * &factor;
                rem[shift + i] -= delta;
            }
            quot[shift] = factor;
            // Leading coefficient is now exactly zero.
            rem.pop();
        }
        (UniPoly::new(quot), UniPoly::new(rem))
    }

    /// Remainder of Euclidean division.
    #[must_use]
    pub fn rem(&self, divisor: &UniPoly) -> UniPoly {
        self.divmod(divisor).1
    }

    /// Monic greatest common divisor.
    #[must_use]
    pub fn gcd(&self, other: &UniPoly) -> UniPoly {
        let mut a = self.clone();
        let mut b = other.clone();
        while !b.is_zero() {
            let r = a.rem(&b);
            a = b;
            b = r;
        }
        a.monic()
    }

    /// Scale to leading coefficient one.
    #[must_use]
    pub fn monic(&self) -> UniPoly {
        match self.leading() {
            Some(l) if !l.is_one() => {
                let inv = BigRational::one() / l;
                self.scale(&inv)
            }
            _ => self.clone(),
        }
    }

    /// Square-free part `self / gcd(self, self')`, monic.
    #[must_use]
    pub fn square_free(&self) -> UniPoly {
        if self.degree() <= 1 {
            return self.monic();
        }
        let g = self.gcd(&self.derivative());
        if g.is_constant() {
            return self.monic();
        }
        self.divmod(&g).0.monic()
    }

    /// Sturm sequence `p, p', -rem(...), ...`.
    pub fn sturm_sequence(&self) -> Vec<UniPoly> {
        let mut seq = vec![self.clone(), self.derivative()];
        loop {
            let len = seq.len();
            if seq[len - 1].is_zero() {
                seq.pop();
                break;
            }
            let r = seq[len - 2].rem(&seq[len - 1]).negated();
            if r.is_zero() {
                break;
            }
            seq.push(r);
        }
        seq
    }

    /// Number of sign variations of the sequence at a point, ignoring
    /// zeros.
    pub fn sign_variations_at(seq: &[UniPoly], x: &BigRational) -> usize {
        let signs: Vec<Sign> = seq
            .iter()
            .map(|p| p.sign_at(x))
            .filter(|s| !s.is_zero())
            .collect();
        signs.windows(2).filter(|w| w[0] != w[1]).count()
    }

    /// Count distinct real roots in the open interval `(lower, upper)`.
    ///
    /// Both endpoints must be non-roots of the first sequence entry.
    pub fn count_roots_in(seq: &[UniPoly], lower: &BigRational, upper: &BigRational) -> usize {
        debug_assert!(lower < upper);
        let vl = Self::sign_variations_at(seq, lower);
        let vu = Self::sign_variations_at(seq, upper);
        vl.saturating_sub(vu)
    }

    /// A bound `B` such that all real roots lie in `(-B, B)` (Cauchy).
    pub fn root_bound(&self) -> BigRational {
        let Some(lead) = self.leading() else {
            return BigRational::one();
        };
        let lead = lead.abs();
        let mut max_ratio = BigRational::zero();
        for c in self.coeffs.iter().take(self.coeffs.len().saturating_sub(1)) {
            let ratio = c.abs() / &lead;
            if ratio > max_ratio {
                max_ratio = ratio;
            }
        }
        BigRational::one() + max_ratio
    }

    /// Isolate all distinct real roots into disjoint brackets (or exact
    /// rational points), ascending.
    pub fn isolate_real_roots(&self) -> Vec<IsolatedRoot> {
        if self.is_constant() {
            return Vec::new();
        }
        let p = self.square_free();
        if p.degree() == 1 {
            let root = -&p.coeffs()[0] / &p.coeffs()[1];
            return vec![IsolatedRoot::Exact(root)];
        }
        let seq = p.sturm_sequence();
        let bound = p.root_bound() + BigRational::one();
        let mut out = Vec::new();
        isolate_rec(&p, &seq, &(-bound.clone()), &bound, &mut out);
        out
    }
}

/// Recursive Sturm bisection over `(lower, upper)`; endpoints are
/// non-roots.
fn isolate_rec(
    p: &UniPoly,
    seq: &[UniPoly],
    lower: &BigRational,
    upper: &BigRational,
    out: &mut Vec<IsolatedRoot>,
) {
    let count = UniPoly::count_roots_in(seq, lower, upper);
    match count {
        0 => {}
        1 => out.push(IsolatedRoot::Bracket(lower.clone(), upper.clone())),
        _ => {
            let two = BigRational::from_integer(BigInt::from(2));
            let mid = (lower + upper) / &two;
            if p.sign_at(&mid).is_zero() {
                // Shrink a punctured neighbourhood of the exact root until
                // it contains no other root.
                let mut delta = (upper - lower) / &two;
                loop {
                    delta /= &two;
                    let ml = &mid - &delta;
                    let mu = &mid + &delta;
                    if p.sign_at(&ml).is_zero() || p.sign_at(&mu).is_zero() {
                        continue;
                    }
                    if UniPoly::count_roots_in(seq, &ml, &mu) == 1 {
                        isolate_rec(p, seq, lower, &ml, out);
                        out.push(IsolatedRoot::Exact(mid.clone()));
                        isolate_rec(p, seq, &mu, upper, out);
                        return;
                    }
                }
            }
            isolate_rec(p, seq, lower, &mid, out);
            isolate_rec(p, seq, &mid, upper, out);
        }
    }
}

impl fmt::Display for UniPoly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "0");
        }
        let mut first = true;
        for (i, c) in self.coeffs.iter().enumerate().rev() {
            if c.is_zero() {
                continue;
            }
            if !first {
                write!(f, " {} ", if c.is_negative() { "-" } else { "+" })?;
            } else if c.is_negative() {
                write!(f, "-")?;
            }
            first = false;
            let abs = c.abs();
            match i {
                0 => write!(f, "{abs}")?,
                1 if abs.is_one() => write!(f, "y")?,
                1 => write!(f, "{abs}*y")?,
                _ if abs.is_one() => write!(f, "y^{i}")?,
                _ => write!(f, "{abs}*y^{i}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(n: i64) -> BigRational {
        BigRational::from_integer(BigInt::from(n))
    }

    fn poly(coeffs: &[i64]) -> UniPoly {
        UniPoly::new(coeffs.iter().map(|&c| q(c)).collect())
    }

    #[test]
    fn divmod_reconstructs() {
        // x^3 - 2x + 1 = (x - 1)(x^2 + x - 1)
        let p = poly(&[1, -2, 0, 1]);
        let d = poly(&[-1, 1]);
        let (quot, rem) = p.divmod(&d);
        assert!(rem.is_zero());
        assert_eq!(quot, poly(&[-1, 1, 1]));
        assert_eq!(quot.mul(&d), p);
    }

    #[test]
    fn gcd_of_shared_factor() {
        // gcd((x-1)(x-2), (x-1)(x-3)) = x - 1 (monic).
        let a = poly(&[2, -3, 1]);
        let b = poly(&[3, -4, 1]);
        assert_eq!(a.gcd(&b), poly(&[-1, 1]));
    }

    #[test]
    fn square_free_removes_multiplicity() {
        // (x-1)^2 = x^2 - 2x + 1
        let p = poly(&[1, -2, 1]);
        assert_eq!(p.square_free(), poly(&[-1, 1]));
    }

    #[test]
    fn sturm_counts_roots_of_quadratic() {
        // x^2 - 2 has two roots in (-2, 2), one in (0, 2).
        let p = poly(&[-2, 0, 1]);
        let seq = p.sturm_sequence();
        assert_eq!(UniPoly::count_roots_in(&seq, &q(-2), &q(2)), 2);
        assert_eq!(UniPoly::count_roots_in(&seq, &q(0), &q(2)), 1);
        assert_eq!(UniPoly::count_roots_in(&seq, &q(2), &q(3)), 0);
    }

    #[test]
    fn no_real_roots() {
        // x^2 + 1
        let p = poly(&[1, 0, 1]);
        assert!(p.isolate_real_roots().is_empty());
    }

    #[test]
    fn isolates_sqrt2() {
        let p = poly(&[-2, 0, 1]);
        let roots = p.isolate_real_roots();
        assert_eq!(roots.len(), 2);
        match &roots[1] {
            IsolatedRoot::Bracket(l, u) => {
                assert!(*l >= q(0));
                assert!(*u <= q(4));
                assert!(p.sign_at(l) != p.sign_at(u));
            }
            IsolatedRoot::Exact(_) => panic!("sqrt(2) is irrational"),
        }
    }

    #[test]
    fn isolates_rational_roots_of_cubic() {
        // (x-1)(x-2)(x-3) = x^3 - 6x^2 + 11x - 6
        let p = poly(&[-6, 11, -6, 1]);
        let roots = p.isolate_real_roots();
        assert_eq!(roots.len(), 3);
        // Each bracket contains exactly one of 1, 2, 3.
        let targets = [q(1), q(2), q(3)];
        for (root, target) in roots.iter().zip(targets.iter()) {
            match root {
                IsolatedRoot::Exact(r) => assert_eq!(r, target),
                IsolatedRoot::Bracket(l, u) => {
                    assert!(l < target && target < u);
                }
            }
        }
    }

    #[test]
    fn root_bound_contains_roots() {
        let p = poly(&[-6, 11, -6, 1]);
        let b = p.root_bound();
        assert!(b > q(3));
    }
}
