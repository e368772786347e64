//! Multivariate polynomial gcd via primitive pseudo-remainder sequences.
//!
//! The recursion views a polynomial in its main variable as a univariate
//! polynomial with coefficients in the ring of lower-level polynomials:
//! the gcd splits into the gcd of the contents and the gcd of the
//! primitive parts, the latter computed by a pseudo-remainder sequence
//! reduced to primitive form at every step.
//!
//! All results are normalized to integer coefficients with content one and
//! a positive leading coefficient.

use super::{Polynomial, Var};

/// Pseudo-remainder of `a` by `b` with respect to `var`: the remainder of
/// dividing `lc(b)^k * a` by `b` for the smallest `k` making the division
/// denominator-free. Requires `b` to have positive degree in `var`.
pub fn pseudo_rem(a: &Polynomial, b: &Polynomial, var: Var) -> Polynomial {
    let deg_b = b.degree_in(var);
    debug_assert!(deg_b > 0, "pseudo_rem needs a divisor of positive degree");
    let lc_b = b.leading_coeff_wrt(var);
    let mut r = a.clone();
    while !r.is_zero() && r.degree_in(var) >= deg_b {
        let deg_r = r.degree_in(var);
        let lc_r = r.leading_coeff_wrt(var);
        let shift = Polynomial::from_coeffs_wrt(var, &{
            let mut cs = vec![Polynomial::zero(); (deg_r - deg_b) as usize];
            cs.push(lc_r);
            cs
        });
        r = &(&r * &lc_b) - &(&shift * b);
    }
    r
}

/// Content of `p` with respect to `var`: the gcd of the coefficients of
/// the univariate view.
pub fn content_wrt(p: &Polynomial, var: Var) -> Polynomial {
    let mut acc = Polynomial::zero();
    for c in p.coeffs_wrt(var) {
        if c.is_zero() {
            continue;
        }
        acc = gcd(&acc, &c);
        if acc.constant_value().is_some() && !acc.is_zero() {
            return Polynomial::one();
        }
    }
    acc
}

/// Primitive part of `p` with respect to `var`.
pub fn primitive_part_wrt(p: &Polynomial, var: Var) -> Polynomial {
    if p.is_zero() {
        return Polynomial::zero();
    }
    let content = content_wrt(p, var);
    match p.try_div(&content) {
        Some(q) => q,
        // Content divides by construction.
        None => p.clone(),
    }
}

/// Greatest common divisor, normalized to integer content one and a
/// positive leading coefficient.
pub fn gcd(a: &Polynomial, b: &Polynomial) -> Polynomial {
    if a.is_zero() {
        return b.integer_normalized().0;
    }
    if b.is_zero() {
        return a.integer_normalized().0;
    }
    if a.is_constant() || b.is_constant() {
        return Polynomial::one();
    }
    let var = match (a.main_var(), b.main_var()) {
        (Some(u), Some(v)) => u.max(v),
        _ => return Polynomial::one(),
    };
    if !a.contains_var(var) {
        return gcd(a, &content_wrt(b, var));
    }
    if !b.contains_var(var) {
        return gcd(&content_wrt(a, var), b);
    }
    let ca = content_wrt(a, var);
    let cb = content_wrt(b, var);
    let c = gcd(&ca, &cb);
    let mut p = primitive_part_wrt(a, var);
    let mut q = primitive_part_wrt(b, var);
    if p.degree_in(var) < q.degree_in(var) {
        std::mem::swap(&mut p, &mut q);
    }
    loop {
        let r = pseudo_rem(&p, &q, var);
        if r.is_zero() {
            let g = primitive_part_wrt(&q, var);
            return (&c * &g).integer_normalized().0;
        }
        if r.degree_in(var) == 0 {
            return c.integer_normalized().0;
        }
        p = q;
        q = primitive_part_wrt(&r, var);
    }
}

/// Square-free part of `p` with respect to its main variable.
pub fn square_free_part(p: &Polynomial) -> Polynomial {
    let Some(var) = p.main_var() else {
        return p.integer_normalized().0;
    };
    if p.degree_in(var) <= 1 {
        return p.integer_normalized().0;
    }
    let g = gcd(p, &p.derivative(var));
    if g.is_constant() {
        return p.integer_normalized().0;
    }
    match p.try_div(&g) {
        Some(q) => q.integer_normalized().0,
        None => {
            // gcd is defined up to a unit; rescale so the division is exact.
            let (gn, _) = g.integer_normalized();
            p.try_div(&gn)
                .map(|q| q.integer_normalized().0)
                .unwrap_or_else(|| p.integer_normalized().0)
        }
    }
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

    #[test]
    fn gcd_univariate_shared_factor() {
        // gcd((x+1)(x+2), (x+1)(x+3)) = x + 1
        let f = &(&x() + &Polynomial::constant(q(1))) * &(&x() + &Polynomial::constant(q(2)));
        let g = &(&x() + &Polynomial::constant(q(1))) * &(&x() + &Polynomial::constant(q(3)));
        assert_eq!(gcd(&f, &g), &x() + &Polynomial::constant(q(1)));
    }

    #[test]
    fn gcd_coprime_is_one() {
        let f = &x() + &Polynomial::constant(q(1));
        let g = &x() + &Polynomial::constant(q(2));
        assert_eq!(gcd(&f, &g), Polynomial::one());
    }

    #[test]
    fn gcd_multivariate() {
        // gcd((x+y)*x, (x+y)*y) = x + y
        let common = &x() + &y();
        let f = &common * &x();
        let g = &common * &y();
        assert_eq!(gcd(&f, &g), common);
    }

    #[test]
    fn content_and_primitive_part() {
        // p = y*x^2 + y^2*x has content y w.r.t. x.
        let p = &(&y() * &x().pow(2)) + &(&y().pow(2) * &x());
        let c = content_wrt(&p, 0);
        assert_eq!(c, y());
        let pp = primitive_part_wrt(&p, 0);
        assert_eq!(&pp * &c, p);
    }

    #[test]
    fn square_free_part_strips_squares() {
        // (x+1)^2 * (x+2) -> (x+1)(x+2)
        let f1 = &x() + &Polynomial::constant(q(1));
        let f2 = &x() + &Polynomial::constant(q(2));
        let p = &(&f1 * &f1) * &f2;
        assert_eq!(square_free_part(&p), &f1 * &f2);
    }

    #[test]
    fn pseudo_rem_eliminates_leading_terms() {
        // prem(x^2, x + y) is a polynomial of degree 0 in x.
        let p = x().pow(2);
        let d = &x() + &y();
        let r = pseudo_rem(&p, &d, 0);
        assert_eq!(r.degree_in(0), 0);
        // lc(d)^2 * x^2 = q*(x+y) + y^2, so the remainder is y^2.
        assert_eq!(r, y().pow(2));
    }
}
