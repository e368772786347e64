//! Property-based tests for the polynomial ring and root isolation.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::identities::Zero;
use proptest::prelude::*;
use rasat_math::polynomial::gcd;
use rasat_math::{Monomial, Polynomial, RealAlgebraicNumber, UniPoly};
use rustc_hash::FxHashMap;

fn small_rational() -> impl Strategy<Value = BigRational> {
    (-20i64..=20, 1i64..=5).prop_map(|(n, d)| BigRational::new(BigInt::from(n), BigInt::from(d)))
}

/// Sparse polynomials over at most three variables with small degrees.
fn small_polynomial() -> impl Strategy<Value = Polynomial> {
    proptest::collection::vec(
        (small_rational(), 0u32..3, 0u32..3, 0u32..2),
        0..5,
    )
    .prop_map(|terms| {
        Polynomial::from_terms(terms.into_iter().map(|(c, dx, dy, dz)| {
            (
                c,
                Monomial::from_powers([(0, dx), (1, dy), (2, dz)]),
            )
        }))
    })
}

fn small_assignment() -> impl Strategy<Value = FxHashMap<u32, BigRational>> {
    (small_rational(), small_rational(), small_rational()).prop_map(|(a, b, c)| {
        let mut m = FxHashMap::default();
        m.insert(0u32, a);
        m.insert(1u32, b);
        m.insert(2u32, c);
        m
    })
}

proptest! {
    #[test]
    fn addition_commutes(p in small_polynomial(), q in small_polynomial()) {
        prop_assert_eq!(&p + &q, &q + &p);
    }

    #[test]
    fn multiplication_distributes(
        p in small_polynomial(),
        q in small_polynomial(),
        r in small_polynomial(),
    ) {
        let left = &p * &(&q + &r);
        let right = &(&p * &q) + &(&p * &r);
        prop_assert_eq!(left, right);
    }

    #[test]
    fn evaluation_is_a_ring_homomorphism(
        p in small_polynomial(),
        q in small_polynomial(),
        a in small_assignment(),
    ) {
        let sum = (&p + &q).evaluate(&a).unwrap();
        let expected = p.evaluate(&a).unwrap() + q.evaluate(&a).unwrap();
        prop_assert_eq!(sum, expected);
        let product = (&p * &q).evaluate(&a).unwrap();
        let expected = p.evaluate(&a).unwrap() * q.evaluate(&a).unwrap();
        prop_assert_eq!(product, expected);
    }

    #[test]
    fn substitution_composes_with_evaluation(
        p in small_polynomial(),
        q in small_polynomial(),
        a in small_assignment(),
    ) {
        // p[x0 -> q] evaluated at a equals p evaluated at a[x0 -> q(a)].
        let substituted = p.substitute_poly(0, &q).evaluate(&a).unwrap();
        let mut shifted = a.clone();
        shifted.insert(0, q.evaluate(&a).unwrap());
        prop_assert_eq!(substituted, p.evaluate(&shifted).unwrap());
    }

    #[test]
    fn normalization_preserves_roots(p in small_polynomial(), a in small_assignment()) {
        prop_assume!(!p.is_zero());
        let (normalized, _) = p.integer_normalized();
        let original = p.evaluate(&a).unwrap();
        let scaled = normalized.evaluate(&a).unwrap();
        // Same zero set, same-or-flipped sign consistently.
        prop_assert_eq!(original.is_zero(), scaled.is_zero());
    }

    #[test]
    fn gcd_divides_both(p in small_polynomial(), q in small_polynomial()) {
        prop_assume!(!p.is_zero() && !q.is_zero());
        let g = gcd::gcd(&p, &q);
        prop_assume!(!g.is_constant());
        prop_assert!(p.try_div(&g).is_some());
        prop_assert!(q.try_div(&g).is_some());
    }

    #[test]
    fn isolated_roots_are_disjoint_and_ordered(coeffs in proptest::collection::vec(-6i64..=6, 1..6)) {
        let poly = UniPoly::new(
            coeffs.into_iter().map(|c| BigRational::from_integer(BigInt::from(c))).collect(),
        );
        prop_assume!(!poly.is_zero());
        let roots = RealAlgebraicNumber::real_roots(&poly);
        for pair in roots.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
    }
}
