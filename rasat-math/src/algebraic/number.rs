//! Real algebraic numbers.
//!
//! A real algebraic number is either a rational, or a root of a
//! square-free univariate polynomial isolated by an open interval with
//! rational, non-root endpoints. Comparison, sign and rounding are exact:
//! intervals are refined by bisection until the answer is determined, with
//! gcd-based equality testing so that equal numbers are recognized instead
//! of refined forever.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Zero};
use std::cmp::Ordering;
use std::fmt;

use crate::interval::RatInterval;
use crate::polynomial::Sign;
use crate::unipoly::{IsolatedRoot, UniPoly};

/// An exact real algebraic number.
#[derive(Debug, Clone)]
pub enum RealAlgebraicNumber {
    /// A rational value.
    Rational(BigRational),
    /// The unique root of `poly` in the open interval `(lower, upper)`.
    ///
    /// `poly` is square-free and neither endpoint is a root.
    Root {
        /// Square-free defining polynomial.
        poly: UniPoly,
        /// Lower interval endpoint (not a root).
        lower: BigRational,
        /// Upper interval endpoint (not a root).
        upper: BigRational,
    },
}

impl RealAlgebraicNumber {
    /// A rational algebraic number.
    pub fn from_rational(value: BigRational) -> Self {
        Self::Rational(value)
    }

    /// A small integer constant.
    pub fn from_int(value: i64) -> Self {
        Self::Rational(BigRational::from_integer(BigInt::from(value)))
    }

    /// Construct from a square-free polynomial and an isolated root.
    pub fn from_isolated(poly: &UniPoly, root: IsolatedRoot) -> Self {
        match root {
            IsolatedRoot::Exact(value) => Self::Rational(value),
            IsolatedRoot::Bracket(lower, upper) => Self::Root {
                poly: poly.clone(),
                lower,
                upper,
            },
        }
    }

    /// All real roots of a univariate polynomial, ascending.
    pub fn real_roots(poly: &UniPoly) -> Vec<Self> {
        let square_free = poly.square_free();
        square_free
            .isolate_real_roots()
            .into_iter()
            .map(|root| Self::from_isolated(&square_free, root))
            .collect()
    }

    /// Whether the value is (known to be) rational.
    pub fn is_rational(&self) -> bool {
        matches!(self, Self::Rational(_))
    }

    /// The rational value, if this is one.
    pub fn to_rational(&self) -> Option<&BigRational> {
        match self {
            Self::Rational(value) => Some(value),
            Self::Root { .. } => None,
        }
    }

    /// Whether the value is an integer.
    pub fn is_integer(&self) -> bool {
        match self {
            Self::Rational(value) => value.is_integer(),
            Self::Root { .. } => false,
        }
    }

    /// An enclosing interval (a point for rationals).
    pub fn interval(&self) -> RatInterval {
        match self {
            Self::Rational(value) => RatInterval::point(value.clone()),
            Self::Root { lower, upper, .. } => RatInterval::new(lower.clone(), upper.clone()),
        }
    }

    /// Halve the isolating interval. Collapses to `Rational` when the
    /// bisection point happens to be the root.
    pub fn refine(&mut self) {
        let Self::Root { poly, lower, upper } = self else {
            return;
        };
        let mid = (&*lower + &*upper) / BigRational::from_integer(BigInt::from(2));
        match poly.sign_at(&mid) {
            Sign::Zero => {
                *self = Self::Rational(mid);
            }
            sign => {
                if sign == poly.sign_at(lower) {
                    *lower = mid;
                } else {
                    *upper = mid;
                }
            }
        }
    }

    /// Refine until the enclosing interval is narrower than `width`.
    pub fn refine_below(&mut self, width: &BigRational) {
        while let Self::Root { lower, upper, .. } = self {
            if &(&*upper - &*lower) < width {
                break;
            }
            self.refine();
        }
    }

    /// Exact sign.
    pub fn sign(&self) -> Sign {
        match self {
            Self::Rational(value) => Sign::of_rational(value),
            Self::Root { poly, lower, upper } => {
                if lower >= &BigRational::zero() {
                    return Sign::Positive;
                }
                if upper <= &BigRational::zero() {
                    return Sign::Negative;
                }
                if poly.sign_at(&BigRational::zero()).is_zero() {
                    // Zero is a root and lies inside the isolating interval,
                    // so the unique root there is zero itself.
                    return Sign::Zero;
                }
                let mut copy = self.clone();
                loop {
                    copy.refine();
                    match &copy {
                        Self::Rational(value) => return Sign::of_rational(value),
                        Self::Root { lower, upper, .. } => {
                            if lower >= &BigRational::zero() {
                                return Sign::Positive;
                            }
                            if upper <= &BigRational::zero() {
                                return Sign::Negative;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Exact comparison.
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Rational(a), Self::Rational(b)) => a.cmp(b),
            (Self::Rational(a), Self::Root { .. }) => {
                other.compare_with_rational(a).reverse()
            }
            (Self::Root { .. }, Self::Rational(b)) => self.compare_with_rational(b),
            (Self::Root { poly: pa, .. }, Self::Root { poly: pb, .. }) => {
                // Recognize equality through a shared factor before
                // refining, otherwise equal roots would refine forever.
                let common = pa.gcd(pb);
                let mut a = self.clone();
                let mut b = other.clone();
                loop {
                    match (&a, &b) {
                        (Self::Rational(x), Self::Rational(y)) => return x.cmp(y),
                        (Self::Rational(x), Self::Root { .. }) => {
                            return b.compare_with_rational(x).reverse();
                        }
                        (Self::Root { .. }, Self::Rational(y)) => {
                            return a.compare_with_rational(y);
                        }
                        _ => {}
                    }
                    let (al, au) = a.bounds();
                    let (bl, bu) = b.bounds();
                    if au <= bl {
                        return Ordering::Less;
                    }
                    if bu <= al {
                        return Ordering::Greater;
                    }
                    if !common.is_constant() && a.equals_via_common(&common, &b) {
                        return Ordering::Equal;
                    }
                    a.refine();
                    b.refine();
                }
            }
        }
    }

    /// Compare a `Root` with a rational value.
    fn compare_with_rational(&self, value: &BigRational) -> Ordering {
        let Self::Root { poly, lower, upper } = self else {
            // Only called on roots.
            return Ordering::Equal;
        };
        if value <= lower {
            return Ordering::Greater;
        }
        if value >= upper {
            return Ordering::Less;
        }
        if poly.sign_at(value).is_zero() {
            return Ordering::Equal;
        }
        let mut copy = self.clone();
        loop {
            copy.refine();
            match &copy {
                Self::Rational(root) => return root.cmp(value),
                Self::Root { lower, upper, .. } => {
                    if value <= lower {
                        return Ordering::Greater;
                    }
                    if value >= upper {
                        return Ordering::Less;
                    }
                }
            }
        }
    }

    fn bounds(&self) -> (BigRational, BigRational) {
        match self {
            Self::Rational(value) => (value.clone(), value.clone()),
            Self::Root { lower, upper, .. } => (lower.clone(), upper.clone()),
        }
    }

    /// Whether `self` and `other` are the same root of the shared factor
    /// `common` of their defining polynomials.
    fn equals_via_common(&self, common: &UniPoly, other: &Self) -> bool {
        if common.is_constant() {
            return false;
        }
        let (al, au) = self.bounds();
        let (bl, bu) = other.bounds();
        let lo = if al > bl { al } else { bl };
        let hi = if au < bu { au } else { bu };
        if lo >= hi {
            return false;
        }
        if common.sign_at(&lo).is_zero() || common.sign_at(&hi).is_zero() {
            return false;
        }
        let seq = common.sturm_sequence();
        UniPoly::count_roots_in(&seq, &lo, &hi) == 1
    }

    /// Largest integer not above the value.
    pub fn floor(&self) -> BigInt {
        match self {
            Self::Rational(value) => value.floor().to_integer(),
            Self::Root { .. } => {
                let mut copy = self.clone();
                loop {
                    match &copy {
                        Self::Rational(value) => return value.floor().to_integer(),
                        Self::Root { poly, lower, upper } => {
                            let lo_int = lower.ceil().to_integer();
                            let hi_int = upper.floor().to_integer();
                            // Integers strictly inside the open interval.
                            let mut inside = Vec::new();
                            let mut k = lo_int.clone();
                            while k <= hi_int {
                                let kq = BigRational::from_integer(k.clone());
                                if &kq > lower && &kq < upper {
                                    inside.push(k.clone());
                                }
                                k += BigInt::one();
                            }
                            match inside.len() {
                                0 => return lower.floor().to_integer(),
                                1 => {
                                    let kq = BigRational::from_integer(inside[0].clone());
                                    if poly.sign_at(&kq).is_zero() {
                                        return inside[0].clone();
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                    copy.refine();
                }
            }
        }
    }

    /// Smallest integer not below the value.
    pub fn ceil(&self) -> BigInt {
        -self.negated().floor()
    }

    /// The value `scale * self + offset` for rational `scale != 0` and
    /// `offset`: the defining polynomial is composed with the inverse
    /// affine map and the interval transformed along.
    #[must_use]
    pub fn affine(&self, scale: &BigRational, offset: &BigRational) -> Self {
        debug_assert!(!scale.is_zero());
        match self {
            Self::Rational(value) => Self::Rational(value * scale + offset),
            Self::Root { poly, lower, upper } => {
                // q(t) = p((t - offset) / scale).
                let inv = UniPoly::new(vec![
                    -(offset / scale),
                    BigRational::one() / scale,
                ]);
                let mut composed = UniPoly::zero();
                let mut power = UniPoly::constant(BigRational::one());
                for c in poly.coeffs() {
                    composed = composed.add(&power.scale(c));
                    power = power.mul(&inv);
                }
                let (mut lo, mut hi) = (lower * scale + offset, upper * scale + offset);
                if lo > hi {
                    std::mem::swap(&mut lo, &mut hi);
                }
                Self::Root {
                    poly: composed,
                    lower: lo,
                    upper: hi,
                }
            }
        }
    }

    /// The negated value.
    #[must_use]
    pub fn negated(&self) -> Self {
        match self {
            Self::Rational(value) => Self::Rational(-value),
            Self::Root { poly, lower, upper } => {
                let coeffs: Vec<BigRational> = poly
                    .coeffs()
                    .iter()
                    .enumerate()
                    .map(|(i, c)| if i % 2 == 1 { -c } else { c.clone() })
                    .collect();
                Self::Root {
                    poly: UniPoly::new(coeffs),
                    lower: -upper,
                    upper: -lower,
                }
            }
        }
    }

    /// Approximate value for heuristic ordering only.
    pub fn approx_f64(&self) -> f64 {
        fn to_f64(q: &BigRational) -> f64 {
            let numer: f64 = q.numer().to_string().parse().unwrap_or(f64::NAN);
            let denom: f64 = q.denom().to_string().parse().unwrap_or(f64::NAN);
            numer / denom
        }
        match self {
            Self::Rational(value) => to_f64(value),
            Self::Root { lower, upper, .. } => (to_f64(lower) + to_f64(upper)) / 2.0,
        }
    }
}

/// A rational number strictly between two distinct algebraic numbers.
pub fn rational_between(a: &RealAlgebraicNumber, b: &RealAlgebraicNumber) -> BigRational {
    debug_assert_eq!(a.compare(b), Ordering::Less);
    let mut a = a.clone();
    let mut b = b.clone();
    loop {
        let (_, au) = a.bounds();
        let (bl, _) = b.bounds();
        if au < bl {
            return (&au + &bl) / BigRational::from_integer(BigInt::from(2));
        }
        if let (RealAlgebraicNumber::Rational(x), RealAlgebraicNumber::Rational(y)) = (&a, &b) {
            return (x + y) / BigRational::from_integer(BigInt::from(2));
        }
        a.refine();
        b.refine();
    }
}

/// A rational number strictly below the given value.
pub fn rational_below(a: &RealAlgebraicNumber) -> BigRational {
    BigRational::from_integer(a.floor() - BigInt::one())
}

/// A rational number strictly above the given value.
pub fn rational_above(a: &RealAlgebraicNumber) -> BigRational {
    BigRational::from_integer(a.ceil() + BigInt::one())
}

impl PartialEq for RealAlgebraicNumber {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for RealAlgebraicNumber {}

impl PartialOrd for RealAlgebraicNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for RealAlgebraicNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl fmt::Display for RealAlgebraicNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rational(value) => write!(f, "{value}"),
            Self::Root { poly, lower, upper } => {
                write!(f, "root({poly}) in ({lower}, {upper})")
            }
        }
    }
}
