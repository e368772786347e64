//! Resultants and discriminants on the univariate-over-lower-ring view.
//!
//! `res(p, q, x)` eliminates `x` from the system `{p = 0, q = 0}`: it is a
//! polynomial in the remaining variables that vanishes exactly where `p`
//! and `q` share a root in `x` (or both leading coefficients vanish).
//!
//! Computed as the determinant of the Sylvester matrix by fraction-free
//! Bareiss elimination; every division along the way is exact in the
//! polynomial ring, so no coefficient growth beyond the final result.

use super::{Polynomial, Var};

/// Resultant of `p` and `q` with respect to `var`.
pub fn resultant(p: &Polynomial, q: &Polynomial, var: Var) -> Polynomial {
    if p.is_zero() || q.is_zero() {
        return Polynomial::zero();
    }
    let dp = p.degree_in(var) as usize;
    let dq = q.degree_in(var) as usize;
    match (dp, dq) {
        (0, 0) => Polynomial::one(),
        (0, _) => p.pow(dq as u32),
        (_, 0) => q.pow(dp as u32),
        _ => {
            let matrix = sylvester_matrix(p, q, var);
            bareiss_determinant(matrix)
        }
    }
}

/// Discriminant of `p` with respect to `var`:
/// `(-1)^(d(d-1)/2) * res(p, p') / lc(p)`.
pub fn discriminant(p: &Polynomial, var: Var) -> Polynomial {
    let d = p.degree_in(var);
    if d <= 1 {
        return Polynomial::one();
    }
    let res = resultant(p, &p.derivative(var), var);
    let lc = p.leading_coeff_wrt(var);
    let quotient = res.try_div(&lc).unwrap_or(res);
    if (u64::from(d) * u64::from(d - 1) / 2) % 2 == 1 {
        -&quotient
    } else {
        quotient
    }
}

/// The `(dp + dq) x (dp + dq)` Sylvester matrix of `p` and `q` in `var`,
/// with entries in the lower-level polynomial ring.
fn sylvester_matrix(p: &Polynomial, q: &Polynomial, var: Var) -> Vec<Vec<Polynomial>> {
    let pc = p.coeffs_wrt(var);
    let qc = q.coeffs_wrt(var);
    let dp = pc.len() - 1;
    let dq = qc.len() - 1;
    let n = dp + dq;
    let mut matrix = vec![vec![Polynomial::zero(); n]; n];
    for (row, matrix_row) in matrix.iter_mut().enumerate().take(dq) {
        for (k, c) in pc.iter().rev().enumerate() {
            matrix_row[row + k] = c.clone();
        }
    }
    for (row, matrix_row) in matrix.iter_mut().enumerate().skip(dq) {
        let shift = row - dq;
        for (k, c) in qc.iter().rev().enumerate() {
            matrix_row[shift + k] = c.clone();
        }
    }
    matrix
}

/// Fraction-free determinant (Bareiss). All intermediate divisions are by
/// the previous pivot and exact.
fn bareiss_determinant(mut m: Vec<Vec<Polynomial>>) -> Polynomial {
    let n = m.len();
    if n == 0 {
        return Polynomial::one();
    }
    let mut negate = false;
    let mut prev = Polynomial::one();
    for k in 0..n - 1 {
        if m[k][k].is_zero() {
            let Some(swap) = (k + 1..n).find(|&r| !m[r][k].is_zero()) else {
                return Polynomial::zero();
            };
            m.swap(k, swap);
            negate = !negate;
        }
        for i in k + 1..n {
            for j in k + 1..n {
                let numerator = &(&m[k][k] * &m[i][j]) - &(&m[i][k] * &m[k][j]);
                m[i][j] = numerator.try_div(&prev).unwrap_or(numerator);
            }
            m[i][k] = Polynomial::zero();
        }
        prev = m[k][k].clone();
    }
    let det = m[n - 1][n - 1].clone();
    if negate {
        -&det
    } else {
        det
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

    fn var(v: u32) -> Polynomial {
        Polynomial::variable(v)
    }

    #[test]
    fn resultant_of_linear_pair() {
        // res_x(x - a, x - b) = a - b
        let p = &var(0) - &var(1);
        let r = &var(0) - &var(2);
        let res = resultant(&p, &r, 0);
        assert_eq!(res, &var(1) - &var(2));
    }

    #[test]
    fn resultant_detects_common_root() {
        // res_x((x-1)(x-2), (x-1)(x-3)) = 0
        let f = &(&var(0) - &Polynomial::constant(q(1))) * &(&var(0) - &Polynomial::constant(q(2)));
        let g = &(&var(0) - &Polynomial::constant(q(1))) * &(&var(0) - &Polynomial::constant(q(3)));
        assert!(resultant(&f, &g, 0).is_zero());
    }

    #[test]
    fn resultant_of_coprime_is_nonzero() {
        let f = &var(0) - &Polynomial::constant(q(1));
        let g = &var(0) - &Polynomial::constant(q(2));
        let res = resultant(&f, &g, 0);
        assert_eq!(res.constant_value(), Some(q(-1)));
    }

    #[test]
    fn resultant_eliminates_into_lower_ring() {
        // res_x(x*y - 1, x + y) = y^2 + 1
        let p = &(&var(0) * &var(1)) - &Polynomial::one();
        let s = &var(0) + &var(1);
        let res = resultant(&p, &s, 0);
        let expected = &var(1).pow(2) + &Polynomial::one();
        assert_eq!(res, expected);
    }

    #[test]
    fn discriminant_of_symbolic_quadratic() {
        // disc_x(x^2 + b*x + c) = b^2 - 4c, with b = x1, c = x2.
        let p = &(&var(0).pow(2) + &(&var(1) * &var(0))) + &var(2);
        let disc = discriminant(&p, 0);
        let expected = &var(1).pow(2) - &var(2).scale(&q(4));
        assert_eq!(disc, expected);
    }

    #[test]
    fn discriminant_sign_of_depressed_cubic() {
        // disc(x^3 + px + q) = -4p^3 - 27q^2; for x^3 - x: p=-1, q=0 -> 4.
        let p = &var(0).pow(3) - &var(0);
        let disc = discriminant(&p, 0);
        assert_eq!(disc.constant_value(), Some(q(4)));
    }

    #[test]
    fn discriminant_of_linear_is_one() {
        let p = &var(0) + &Polynomial::one();
        assert_eq!(discriminant(&p, 0), Polynomial::one());
    }
}
