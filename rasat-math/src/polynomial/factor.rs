//! Square-free factorization.
//!
//! Projection only needs a square-free basis: factors that are square-free
//! and pairwise coprime, with constant content stripped. Yun's algorithm
//! provides that with one gcd per multiplicity level. Univariate factors
//! are additionally split at their rational roots, which keeps projection
//! sets small for the common case of expanded linear products.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};

use super::gcd::{content_wrt, gcd, square_free_part};
use super::{Polynomial, Var};
use crate::unipoly::UniPoly;

/// Square-free decomposition of `p` with respect to its main variable:
/// returns pairwise-coprime square-free `(factor, multiplicity)` pairs with
/// `p = unit * prod factor_i^mult_i` over the primitive part of `p`.
pub fn square_free_decomposition(p: &Polynomial) -> Vec<(Polynomial, u32)> {
    let Some(var) = p.main_var() else {
        return Vec::new();
    };
    let deriv = p.derivative(var);
    let g = gcd(p, &deriv);
    if g.is_constant() {
        return vec![(p.integer_normalized().0, 1)];
    }
    yun(p, &deriv, &g, var).unwrap_or_else(|| vec![(square_free_part(p), 1)])
}

/// Yun's algorithm; `None` on an inexact division (the caller falls back
/// to the plain square-free part).
fn yun(
    p: &Polynomial,
    deriv: &Polynomial,
    g: &Polynomial,
    var: Var,
) -> Option<Vec<(Polynomial, u32)>> {
    let mut out = Vec::new();
    let mut w = p.try_div(g)?;
    let mut y = deriv.try_div(g)?;
    let mut mult = 1u32;
    loop {
        let z = &y - &w.derivative(var);
        if z.is_zero() {
            if !w.is_constant() {
                out.push((w.integer_normalized().0, mult));
            }
            return Some(out);
        }
        let gi = gcd(&w, &z);
        if !gi.is_constant() {
            out.push((gi.integer_normalized().0, mult));
        }
        w = w.try_div(&gi)?;
        y = z.try_div(&gi)?;
        if w.is_constant() {
            return Some(out);
        }
        mult += 1;
    }
}

/// The non-constant factors used by projection: square-free, pairwise
/// coprime, content-free, with univariate factors split at rational roots.
pub fn nonconst_factors(p: &Polynomial) -> Vec<Polynomial> {
    let mut out = Vec::new();
    collect_factors(p, &mut out);
    out.sort_by_key(Polynomial::structural_hash);
    out.dedup();
    out
}

fn collect_factors(p: &Polynomial, out: &mut Vec<Polynomial>) {
    let Some(var) = p.main_var() else {
        return;
    };
    let content = content_wrt(p, var);
    if !content.is_constant() {
        collect_factors(&content, out);
    }
    let primitive = p.try_div(&content).unwrap_or_else(|| p.clone());
    for (factor, _) in square_free_decomposition(&primitive) {
        if factor.is_constant() {
            continue;
        }
        if let Some(u) = factor.to_unipoly(var) {
            split_univariate(&factor, &u, var, out);
        } else {
            out.push(factor);
        }
    }
}

/// Split a square-free univariate factor at its rational roots.
fn split_univariate(factor: &Polynomial, u: &UniPoly, var: Var, out: &mut Vec<Polynomial>) {
    let mut rest = u.clone();
    let mut found_any = false;
    for root in rational_roots(u) {
        let linear = UniPoly::linear_root(root.clone());
        let (quot, rem) = rest.divmod(&linear);
        if rem.is_zero() {
            out.push(
                (&Polynomial::variable(var) - &Polynomial::constant(root))
                    .integer_normalized()
                    .0,
            );
            rest = quot;
            found_any = true;
        }
    }
    if !found_any {
        out.push(factor.clone());
        return;
    }
    if !rest.is_constant() {
        out.push(Polynomial::from_unipoly(var, &rest).integer_normalized().0);
    }
}

/// Rational roots of a univariate polynomial, via the rational root
/// theorem on the integer-normalized coefficients. Gives up (returns only
/// the zero root, if any) when the boundary coefficients are too large to
/// enumerate divisors for.
pub fn rational_roots(u: &UniPoly) -> Vec<BigRational> {
    if u.is_constant() {
        return Vec::new();
    }
    // Clear denominators.
    let mut denom_lcm = BigInt::one();
    for c in u.coeffs() {
        let g = gcd_int(&denom_lcm, c.denom());
        denom_lcm = &denom_lcm / &g * c.denom();
    }
    let ints: Vec<BigInt> = u
        .coeffs()
        .iter()
        .map(|c| c.numer() * (&denom_lcm / c.denom()))
        .collect();
    let mut roots = Vec::new();
    // Strip the power of x first: zero is a root iff the trailing
    // coefficient vanishes.
    let low = match ints.iter().position(|c| !c.is_zero()) {
        Some(i) => i,
        None => return roots,
    };
    if low > 0 {
        roots.push(BigRational::zero());
    }
    let trailing = ints[low].abs();
    let leading = ints[ints.len() - 1].abs();
    let (Some(trailing), Some(leading)) = (trailing.to_u64(), leading.to_u64()) else {
        return roots;
    };
    for num in divisors(trailing) {
        for den in divisors(leading) {
            let candidate = BigRational::new(BigInt::from(num), BigInt::from(den));
            for signed in [candidate.clone(), -candidate] {
                if u.evaluate(&signed).is_zero() && !roots.contains(&signed) {
                    roots.push(signed);
                }
            }
        }
    }
    roots.sort();
    roots
}

fn gcd_int(a: &BigInt, b: &BigInt) -> BigInt {
    let mut a = a.abs();
    let mut b = b.abs();
    while !b.is_zero() {
        let r = &a % &b;
        a = b;
        b = r;
    }
    a
}

fn divisors(n: u64) -> Vec<u64> {
    if n == 0 {
        return vec![1];
    }
    let mut out = Vec::new();
    let mut d = 1u64;
    while d.saturating_mul(d) <= n {
        if n % d == 0 {
            out.push(d);
            if d != n / d {
                out.push(n / d);
            }
        }
        d += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(n: i64) -> BigRational {
        BigRational::from_integer(BigInt::from(n))
    }

    fn x() -> Polynomial {
        Polynomial::variable(0)
    }

    fn y() -> Polynomial {
        Polynomial::variable(1)
    }

    fn linear(r: i64) -> Polynomial {
        &x() - &Polynomial::constant(q(r))
    }

    #[test]
    fn decomposes_multiplicities() {
        // (x-1)^2 (x-2): factor of multiplicity 2 is x-1, of 1 is x-2.
        let p = &(&linear(1) * &linear(1)) * &linear(2);
        let decomp = square_free_decomposition(&p);
        assert_eq!(decomp.len(), 2);
        assert!(decomp.contains(&(linear(2), 1)));
        assert!(decomp.contains(&(linear(1), 2)));
    }

    #[test]
    fn factors_expanded_cubic() {
        // x^3 - 6x^2 + 11x - 6 = (x-1)(x-2)(x-3)
        let p = &(&linear(1) * &linear(2)) * &linear(3);
        let factors = nonconst_factors(&p);
        assert_eq!(factors.len(), 3);
        assert!(factors.contains(&linear(1)));
        assert!(factors.contains(&linear(2)));
        assert!(factors.contains(&linear(3)));
    }

    #[test]
    fn keeps_irrational_factor_whole() {
        // (x-1)(x^2-2): rational root 1 splits off, x^2 - 2 stays.
        let sqrt2 = &(&x() * &x()) - &Polynomial::constant(q(2));
        let p = &linear(1) * &sqrt2;
        let factors = nonconst_factors(&p);
        assert_eq!(factors.len(), 2);
        assert!(factors.contains(&linear(1)));
        assert!(factors.contains(&sqrt2));
    }

    #[test]
    fn strips_multivariate_content() {
        // y * (x^2 - 2): content y is itself reported at its level.
        let sqrt2 = &(&x() * &x()) - &Polynomial::constant(q(2));
        let p = &y() * &sqrt2;
        // Main variable is y here; content w.r.t. y is x^2 - 2.
        let factors = nonconst_factors(&p);
        assert!(factors.contains(&y()));
        assert!(factors.contains(&sqrt2));
    }

    #[test]
    fn rational_roots_of_cubic() {
        let p = &(&linear(1) * &linear(2)) * &linear(3);
        let u = p.to_unipoly(0).unwrap();
        let roots = rational_roots(&u);
        assert_eq!(roots, vec![q(1), q(2), q(3)]);
    }

    #[test]
    fn rational_roots_with_zero_and_fraction() {
        // x * (2x - 1) has roots 0 and 1/2.
        let p = &x() * &(&x().scale(&q(2)) - &Polynomial::one());
        let u = p.to_unipoly(0).unwrap();
        let roots = rational_roots(&u);
        assert!(roots.contains(&BigRational::zero()));
        assert!(roots.contains(&BigRational::new(BigInt::from(1), BigInt::from(2))));
    }
}
