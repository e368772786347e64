//! Sparse multivariate polynomials over exact rationals.
//!
//! Polynomials are sums of `(coefficient, monomial)` terms kept sorted in
//! descending graded-lexicographic order. Monomials store their variables
//! as a sorted list of `(variable, power)` pairs with a cached total degree
//! and hash, so structural equality and hashing stay cheap even for large
//! polynomials.
//!
//! Variables are plain `u32` indices; the index of a variable is also its
//! position in the fixed variable order used by projection and lifting.
//! The *main variable* of a polynomial is its largest variable, and the
//! *level* of a polynomial is `main variable + 1` (constants sit at level
//! zero).

use num_bigint::{BigInt, Sign as IntSign};
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Mul, Neg, Sub};

pub mod factor;
pub mod gcd;
pub mod resultant;

/// Variable identifier; the numeric value is the position in the variable
/// order.
pub type Var = u32;

/// Marker for "no variable" (constant polynomials).
pub const NULL_VAR: Var = u32::MAX;

/// Exact sign of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sign {
    /// Strictly negative.
    Negative,
    /// Zero.
    Zero,
    /// Strictly positive.
    Positive,
}

impl Sign {
    /// Sign of a rational number.
    pub fn of_rational(q: &BigRational) -> Self {
        if q.is_zero() {
            Sign::Zero
        } else if q.is_negative() {
            Sign::Negative
        } else {
            Sign::Positive
        }
    }

    /// The opposite sign.
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Sign::Negative => Sign::Positive,
            Sign::Zero => Sign::Zero,
            Sign::Positive => Sign::Negative,
        }
    }

    /// Whether this sign is zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        matches!(self, Sign::Zero)
    }
}

/// A power of a single variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarPower {
    /// The variable.
    pub var: Var,
    /// The exponent, always positive.
    pub power: u32,
}

impl VarPower {
    /// Create a new variable power.
    #[inline]
    pub fn new(var: Var, power: u32) -> Self {
        Self { var, power }
    }
}

fn mix_hash(state: u64, value: u64) -> u64 {
    // 64-bit finalizer borrowed from splitmix64.
    let mut h = state ^ value.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    h = (h ^ (h >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    h = (h ^ (h >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    h ^ (h >> 31)
}

fn monomial_hash(vars: &[VarPower]) -> u64 {
    let mut h = 0xcbf2_9ce4_8422_2325u64;
    for vp in vars {
        h = mix_hash(h, (u64::from(vp.var) << 32) | u64::from(vp.power));
    }
    h
}

/// A product of variable powers; the unit monomial is the empty product.
#[derive(Clone, Eq)]
pub struct Monomial {
    /// Sorted by variable index, no duplicates, powers positive.
    vars: SmallVec<[VarPower; 4]>,
    total_degree: u32,
    hash: u64,
}

impl Monomial {
    /// The unit monomial `1`.
    #[inline]
    pub fn unit() -> Self {
        Self {
            vars: SmallVec::new(),
            total_degree: 0,
            hash: monomial_hash(&[]),
        }
    }

    /// A single variable to the first power.
    #[inline]
    pub fn from_var(var: Var) -> Self {
        Self::from_var_power(var, 1)
    }

    /// A single variable to a given power.
    pub fn from_var_power(var: Var, power: u32) -> Self {
        if power == 0 {
            return Self::unit();
        }
        let mut vars = SmallVec::new();
        vars.push(VarPower::new(var, power));
        Self {
            total_degree: power,
            hash: monomial_hash(&vars),
            vars,
        }
    }

    /// Build from arbitrary `(variable, power)` pairs; duplicates are
    /// merged and zero powers dropped.
    pub fn from_powers(powers: impl IntoIterator<Item = (Var, u32)>) -> Self {
        let mut merged: FxHashMap<Var, u32> = FxHashMap::default();
        for (var, power) in powers {
            if power > 0 {
                *merged.entry(var).or_insert(0) += power;
            }
        }
        let mut vars: SmallVec<[VarPower; 4]> = merged
            .into_iter()
            .map(|(v, p)| VarPower::new(v, p))
            .collect();
        vars.sort_by_key(|vp| vp.var);
        let total_degree = vars.iter().map(|vp| vp.power).sum();
        let hash = monomial_hash(&vars);
        Self {
            vars,
            total_degree,
            hash,
        }
    }

    /// Whether this is the unit monomial.
    #[inline]
    pub fn is_unit(&self) -> bool {
        self.vars.is_empty()
    }

    /// Total degree.
    #[inline]
    pub fn total_degree(&self) -> u32 {
        self.total_degree
    }

    /// The variable powers, sorted by variable.
    #[inline]
    pub fn vars(&self) -> &[VarPower] {
        &self.vars
    }

    /// Degree of a specific variable.
    pub fn degree(&self, var: Var) -> u32 {
        self.vars
            .iter()
            .find(|vp| vp.var == var)
            .map_or(0, |vp| vp.power)
    }

    /// Largest variable, or [`NULL_VAR`] for the unit monomial.
    pub fn max_var(&self) -> Var {
        self.vars.last().map_or(NULL_VAR, |vp| vp.var)
    }

    /// Whether the monomial mentions `var`.
    pub fn contains(&self, var: Var) -> bool {
        self.vars.iter().any(|vp| vp.var == var)
    }

    /// Product of two monomials.
    #[must_use]
    pub fn mul(&self, other: &Monomial) -> Monomial {
        if self.is_unit() {
            return other.clone();
        }
        if other.is_unit() {
            return self.clone();
        }
        let mut vars: SmallVec<[VarPower; 4]> = SmallVec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.vars.len() && j < other.vars.len() {
            match self.vars[i].var.cmp(&other.vars[j].var) {
                Ordering::Less => {
                    vars.push(self.vars[i]);
                    i += 1;
                }
                Ordering::Greater => {
                    vars.push(other.vars[j]);
                    j += 1;
                }
                Ordering::Equal => {
                    vars.push(VarPower::new(
                        self.vars[i].var,
                        self.vars[i].power + other.vars[j].power,
                    ));
                    i += 1;
                    j += 1;
                }
            }
        }
        vars.extend_from_slice(&self.vars[i..]);
        vars.extend_from_slice(&other.vars[j..]);
        Monomial {
            total_degree: self.total_degree + other.total_degree,
            hash: monomial_hash(&vars),
            vars,
        }
    }

    /// Quotient `self / other` if `other` divides `self`.
    #[must_use]
    pub fn try_div(&self, other: &Monomial) -> Option<Monomial> {
        if other.is_unit() {
            return Some(self.clone());
        }
        let mut vars: SmallVec<[VarPower; 4]> = SmallVec::new();
        let mut j = 0;
        for vp in &self.vars {
            if j < other.vars.len() && other.vars[j].var == vp.var {
                if vp.power < other.vars[j].power {
                    return None;
                }
                let rem = vp.power - other.vars[j].power;
                if rem > 0 {
                    vars.push(VarPower::new(vp.var, rem));
                }
                j += 1;
            } else if j < other.vars.len() && other.vars[j].var < vp.var {
                return None;
            } else {
                vars.push(*vp);
            }
        }
        if j < other.vars.len() {
            return None;
        }
        let total_degree = vars.iter().map(|vp| vp.power).sum();
        let hash = monomial_hash(&vars);
        Some(Monomial {
            vars,
            total_degree,
            hash,
        })
    }

    /// The monomial with `var` removed entirely.
    #[must_use]
    pub fn without(&self, var: Var) -> Monomial {
        if !self.contains(var) {
            return self.clone();
        }
        let vars: SmallVec<[VarPower; 4]> = self
            .vars
            .iter()
            .copied()
            .filter(|vp| vp.var != var)
            .collect();
        let total_degree = vars.iter().map(|vp| vp.power).sum();
        let hash = monomial_hash(&vars);
        Monomial {
            vars,
            total_degree,
            hash,
        }
    }
}

impl PartialEq for Monomial {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.vars == other.vars
    }
}

impl Hash for Monomial {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl PartialOrd for Monomial {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Monomial {
    /// Graded lexicographic order: total degree first, then exponents
    /// compared from the largest variable downwards.
    fn cmp(&self, other: &Self) -> Ordering {
        match self.total_degree.cmp(&other.total_degree) {
            Ordering::Equal => {}
            ord => return ord,
        }
        let mut i = self.vars.len();
        let mut j = other.vars.len();
        loop {
            match (i, j) {
                (0, 0) => return Ordering::Equal,
                (0, _) => return Ordering::Less,
                (_, 0) => return Ordering::Greater,
                _ => {}
            }
            let a = self.vars[i - 1];
            let b = other.vars[j - 1];
            match a.var.cmp(&b.var) {
                Ordering::Less => return Ordering::Less,
                Ordering::Greater => return Ordering::Greater,
                Ordering::Equal => match a.power.cmp(&b.power) {
                    Ordering::Equal => {
                        i -= 1;
                        j -= 1;
                    }
                    ord => return ord,
                },
            }
        }
    }
}

impl fmt::Debug for Monomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Monomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unit() {
            return write!(f, "1");
        }
        for (k, vp) in self.vars.iter().enumerate() {
            if k > 0 {
                write!(f, "*")?;
            }
            if vp.power == 1 {
                write!(f, "x{}", vp.var)?;
            } else {
                write!(f, "x{}^{}", vp.var, vp.power)?;
            }
        }
        Ok(())
    }
}

fn big_gcd(a: &BigInt, b: &BigInt) -> BigInt {
    let mut a = a.abs();
    let mut b = b.abs();
    while !b.is_zero() {
        let r = &a % &b;
        a = b;
        b = r;
    }
    a
}

fn big_lcm(a: &BigInt, b: &BigInt) -> BigInt {
    if a.is_zero() || b.is_zero() {
        return BigInt::zero();
    }
    (a * b).abs() / big_gcd(a, b)
}

/// A sparse multivariate polynomial with exact rational coefficients.
///
/// Terms are sorted in descending monomial order and never carry a zero
/// coefficient; the zero polynomial has no terms.
#[derive(Clone, Eq)]
pub struct Polynomial {
    terms: Vec<(BigRational, Monomial)>,
}

impl Polynomial {
    /// The zero polynomial.
    #[inline]
    pub fn zero() -> Self {
        Self { terms: Vec::new() }
    }

    /// The constant polynomial `1`.
    #[inline]
    pub fn one() -> Self {
        Self::constant(BigRational::one())
    }

    /// A constant polynomial.
    pub fn constant(value: BigRational) -> Self {
        if value.is_zero() {
            return Self::zero();
        }
        Self {
            terms: vec![(value, Monomial::unit())],
        }
    }

    /// A constant polynomial from an integer.
    pub fn from_int(value: i64) -> Self {
        Self::constant(BigRational::from_integer(BigInt::from(value)))
    }

    /// The polynomial `var`.
    pub fn variable(var: Var) -> Self {
        Self {
            terms: vec![(BigRational::one(), Monomial::from_var(var))],
        }
    }

    /// Build from arbitrary terms; merges duplicate monomials and drops
    /// zero coefficients.
    pub fn from_terms(terms: impl IntoIterator<Item = (BigRational, Monomial)>) -> Self {
        let mut collected: Vec<(BigRational, Monomial)> = terms.into_iter().collect();
        collected.sort_by(|a, b| b.1.cmp(&a.1));
        let mut merged: Vec<(BigRational, Monomial)> = Vec::with_capacity(collected.len());
        for (coeff, mono) in collected {
            if let Some(last) = merged.last_mut() {
                if last.1 == mono {
                    last.0 += coeff;
                    continue;
                }
            }
            merged.push((coeff, mono));
        }
        merged.retain(|(c, _)| !c.is_zero());
        Self { terms: merged }
    }

    /// The terms in descending monomial order.
    #[inline]
    pub fn terms(&self) -> &[(BigRational, Monomial)] {
        &self.terms
    }

    /// Whether this is the zero polynomial.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    /// Whether this polynomial is a constant (possibly zero).
    #[inline]
    pub fn is_constant(&self) -> bool {
        self.terms.is_empty() || (self.terms.len() == 1 && self.terms[0].1.is_unit())
    }

    /// Constant value if this polynomial is constant.
    pub fn constant_value(&self) -> Option<BigRational> {
        if self.terms.is_empty() {
            return Some(BigRational::zero());
        }
        if self.terms.len() == 1 && self.terms[0].1.is_unit() {
            return Some(self.terms[0].0.clone());
        }
        None
    }

    /// Whether every monomial has total degree at most one.
    pub fn is_linear(&self) -> bool {
        self.terms.iter().all(|(_, m)| m.total_degree() <= 1)
    }

    /// Total degree of the polynomial; zero for constants.
    pub fn total_degree(&self) -> u32 {
        self.terms
            .iter()
            .map(|(_, m)| m.total_degree())
            .max()
            .unwrap_or(0)
    }

    /// Degree in a specific variable.
    pub fn degree_in(&self, var: Var) -> u32 {
        self.terms
            .iter()
            .map(|(_, m)| m.degree(var))
            .max()
            .unwrap_or(0)
    }

    /// Number of terms.
    #[inline]
    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    /// The largest variable, or `None` for constants.
    pub fn main_var(&self) -> Option<Var> {
        self.terms
            .iter()
            .map(|(_, m)| m.max_var())
            .filter(|&v| v != NULL_VAR)
            .max()
    }

    /// Level of the polynomial: `main_var + 1`, or zero for constants.
    pub fn level(&self) -> usize {
        self.main_var().map_or(0, |v| v as usize + 1)
    }

    /// All variables, sorted ascending.
    pub fn vars(&self) -> Vec<Var> {
        let mut out: Vec<Var> = Vec::new();
        for (_, m) in &self.terms {
            for vp in m.vars() {
                if let Err(pos) = out.binary_search(&vp.var) {
                    out.insert(pos, vp.var);
                }
            }
        }
        out
    }

    /// Whether the polynomial mentions `var`.
    pub fn contains_var(&self, var: Var) -> bool {
        self.terms.iter().any(|(_, m)| m.contains(var))
    }

    /// Leading coefficient with respect to the graded-lex term order.
    pub fn leading_rational(&self) -> Option<&BigRational> {
        self.terms.first().map(|(c, _)| c)
    }

    /// Coefficients of the univariate view in `var`: index `i` holds the
    /// (lower-level) polynomial coefficient of `var^i`.
    pub fn coeffs_wrt(&self, var: Var) -> Vec<Polynomial> {
        let deg = self.degree_in(var) as usize;
        let mut buckets: Vec<Vec<(BigRational, Monomial)>> = vec![Vec::new(); deg + 1];
        for (coeff, mono) in &self.terms {
            let d = mono.degree(var) as usize;
            buckets[d].push((coeff.clone(), mono.without(var)));
        }
        buckets.into_iter().map(Polynomial::from_terms).collect()
    }

    /// Rebuild a polynomial from its univariate view in `var`.
    pub fn from_coeffs_wrt(var: Var, coeffs: &[Polynomial]) -> Polynomial {
        let mut terms: Vec<(BigRational, Monomial)> = Vec::new();
        for (i, coeff) in coeffs.iter().enumerate() {
            let power = Monomial::from_var_power(var, i as u32);
            for (c, m) in &coeff.terms {
                terms.push((c.clone(), m.mul(&power)));
            }
        }
        Polynomial::from_terms(terms)
    }

    /// Leading coefficient of the univariate view in `var`.
    pub fn leading_coeff_wrt(&self, var: Var) -> Polynomial {
        let deg = self.degree_in(var);
        Polynomial::from_terms(
            self.terms
                .iter()
                .filter(|(_, m)| m.degree(var) == deg)
                .map(|(c, m)| (c.clone(), m.without(var))),
        )
    }

    /// Partial derivative with respect to `var`.
    pub fn derivative(&self, var: Var) -> Polynomial {
        Polynomial::from_terms(self.terms.iter().filter_map(|(coeff, mono)| {
            let power = mono.degree(var);
            if power == 0 {
                return None;
            }
            let mut reduced: Vec<(Var, u32)> = mono
                .vars()
                .iter()
                .map(|vp| {
                    if vp.var == var {
                        (vp.var, vp.power - 1)
                    } else {
                        (vp.var, vp.power)
                    }
                })
                .collect();
            reduced.retain(|(_, p)| *p > 0);
            Some((
                coeff * BigRational::from_integer(BigInt::from(power)),
                Monomial::from_powers(reduced),
            ))
        }))
    }

    /// Substitute rational values for some variables.
    #[must_use]
    pub fn substitute_rational(&self, assignment: &FxHashMap<Var, BigRational>) -> Polynomial {
        if assignment.is_empty() {
            return self.clone();
        }
        Polynomial::from_terms(self.terms.iter().map(|(coeff, mono)| {
            let mut c = coeff.clone();
            let mut remaining: Vec<(Var, u32)> = Vec::new();
            for vp in mono.vars() {
                if let Some(value) = assignment.get(&vp.var) {
                    let mut p = BigRational::one();
                    for _ in 0..vp.power {
                        p *= value;
                    }
                    c *= p;
                } else {
                    remaining.push((vp.var, vp.power));
                }
            }
            (c, Monomial::from_powers(remaining))
        }))
    }

    /// Substitute a polynomial for a variable.
    #[must_use]
    pub fn substitute_poly(&self, var: Var, replacement: &Polynomial) -> Polynomial {
        if !self.contains_var(var) {
            return self.clone();
        }
        let coeffs = self.coeffs_wrt(var);
        // Horner evaluation in the replacement polynomial.
        let mut acc = coeffs.last().cloned().unwrap_or_else(Polynomial::zero);
        for c in coeffs.iter().rev().skip(1) {
            acc = &(&acc * replacement) + c;
        }
        acc
    }

    /// Evaluate fully under a rational assignment; `None` if a variable
    /// remains unassigned.
    pub fn evaluate(&self, assignment: &FxHashMap<Var, BigRational>) -> Option<BigRational> {
        self.substitute_rational(assignment).constant_value()
    }

    /// `self^exp` by repeated squaring.
    #[must_use]
    pub fn pow(&self, exp: u32) -> Polynomial {
        let mut result = Polynomial::one();
        let mut base = self.clone();
        let mut e = exp;
        while e > 0 {
            if e & 1 == 1 {
                result = &result * &base;
            }
            e >>= 1;
            if e > 0 {
                base = &base * &base;
            }
        }
        result
    }

    /// Multiply by a rational scalar.
    #[must_use]
    pub fn scale(&self, factor: &BigRational) -> Polynomial {
        if factor.is_zero() {
            return Polynomial::zero();
        }
        Polynomial {
            terms: self
                .terms
                .iter()
                .map(|(c, m)| (c * factor, m.clone()))
                .collect(),
        }
    }

    /// Normalize to integer coefficients with content one and a positive
    /// leading coefficient. Returns the normalized polynomial and whether
    /// the sign was flipped.
    pub fn integer_normalized(&self) -> (Polynomial, bool) {
        if self.is_zero() {
            return (Polynomial::zero(), false);
        }
        let mut denom_lcm = BigInt::one();
        for (c, _) in &self.terms {
            denom_lcm = big_lcm(&denom_lcm, c.denom());
        }
        let mut numer_gcd = BigInt::zero();
        for (c, _) in &self.terms {
            let scaled = c.numer() * (&denom_lcm / c.denom());
            numer_gcd = big_gcd(&numer_gcd, &scaled);
        }
        let factor = BigRational::new(denom_lcm, numer_gcd);
        let mut result = self.scale(&factor.abs());
        let flipped = result
            .leading_rational()
            .map(|c| c.is_negative())
            .unwrap_or(false);
        if flipped {
            result = -&result;
        }
        (result, flipped)
    }

    /// Exact division: `Some(q)` with `self = q * divisor`, or `None` if
    /// the division leaves a remainder.
    pub fn try_div(&self, divisor: &Polynomial) -> Option<Polynomial> {
        if divisor.is_zero() {
            return None;
        }
        if let Some(c) = divisor.constant_value() {
            return Some(self.scale(&(BigRational::one() / c)));
        }
        let (dc, dm) = &divisor.terms[0];
        let mut remainder = self.clone();
        let mut quotient: Vec<(BigRational, Monomial)> = Vec::new();
        while !remainder.is_zero() {
            let (rc, rm) = &remainder.terms[0];
            let qm = rm.try_div(dm)?;
            let qc = rc / dc;
            let scaled = divisor.mul_term(&qc, &qm);
            remainder = &remainder - &scaled;
            quotient.push((qc, qm));
        }
        Some(Polynomial::from_terms(quotient))
    }

    fn mul_term(&self, coeff: &BigRational, mono: &Monomial) -> Polynomial {
        Polynomial {
            terms: self
                .terms
                .iter()
                .map(|(c, m)| (c * coeff, m.mul(mono)))
                .collect(),
        }
    }

    /// Lift a dense univariate polynomial into the sparse representation,
    /// with `var` as its variable.
    pub fn from_unipoly(var: Var, u: &crate::unipoly::UniPoly) -> Polynomial {
        Polynomial::from_terms(
            u.coeffs()
                .iter()
                .enumerate()
                .map(|(i, c)| (c.clone(), Monomial::from_var_power(var, i as u32))),
        )
    }

    /// Convert to a dense univariate polynomial if only `var` occurs.
    pub fn to_unipoly(&self, var: Var) -> Option<crate::unipoly::UniPoly> {
        let mut coeffs = vec![BigRational::zero(); self.degree_in(var) as usize + 1];
        for (c, m) in &self.terms {
            if m.is_unit() {
                coeffs[0] += c;
            } else if m.vars().len() == 1 && m.vars()[0].var == var {
                coeffs[m.vars()[0].power as usize] += c;
            } else {
                return None;
            }
        }
        Some(crate::unipoly::UniPoly::new(coeffs))
    }

    /// Structural hash; equal polynomials hash equally.
    pub fn structural_hash(&self) -> u64 {
        let mut h = 0x517c_c1b7_2722_0a95u64;
        for (c, m) in &self.terms {
            let (sign, digits) = c.numer().to_u64_digits();
            for d in digits {
                h = mix_hash(h, d);
            }
            h = mix_hash(h, matches!(sign, IntSign::Minus) as u64);
            let (_, digits) = c.denom().to_u64_digits();
            for d in digits {
                h = mix_hash(h, d);
            }
            h = mix_hash(h, m.hash);
        }
        h
    }
}

impl PartialEq for Polynomial {
    fn eq(&self, other: &Self) -> bool {
        self.terms == other.terms
    }
}

impl Hash for Polynomial {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.structural_hash());
    }
}

impl Add for &Polynomial {
    type Output = Polynomial;

    fn add(self, rhs: &Polynomial) -> Polynomial {
        let mut terms: Vec<(BigRational, Monomial)> =
            Vec::with_capacity(self.terms.len() + rhs.terms.len());
        let (mut i, mut j) = (0, 0);
        while i < self.terms.len() && j < rhs.terms.len() {
            match self.terms[i].1.cmp(&rhs.terms[j].1) {
                Ordering::Greater => {
                    terms.push(self.terms[i].clone());
                    i += 1;
                }
                Ordering::Less => {
                    terms.push(rhs.terms[j].clone());
                    j += 1;
                }
                Ordering::Equal => {
                    let c = &self.terms[i].0 + &rhs.terms[j].0;
                    if !c.is_zero() {
                        terms.push((c, self.terms[i].1.clone()));
                    }
                    i += 1;
                    j += 1;
                }
            }
        }
        terms.extend_from_slice(&self.terms[i..]);
        terms.extend_from_slice(&rhs.terms[j..]);
        Polynomial { terms }
    }
}

impl Sub for &Polynomial {
    type Output = Polynomial;

    fn sub(self, rhs: &Polynomial) -> Polynomial {
        self + &(-rhs)
    }
}

impl Neg for &Polynomial {
    type Output = Polynomial;

    fn neg(self) -> Polynomial {
        Polynomial {
            terms: self.terms.iter().map(|(c, m)| (-c, m.clone())).collect(),
        }
    }
}

impl Mul for &Polynomial {
    type Output = Polynomial;

    fn mul(self, rhs: &Polynomial) -> Polynomial {
        if self.is_zero() || rhs.is_zero() {
            return Polynomial::zero();
        }
        let mut terms: Vec<(BigRational, Monomial)> =
            Vec::with_capacity(self.terms.len() * rhs.terms.len());
        for (ac, am) in &self.terms {
            for (bc, bm) in &rhs.terms {
                terms.push((ac * bc, am.mul(bm)));
            }
        }
        Polynomial::from_terms(terms)
    }
}

impl fmt::Debug for Polynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Polynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "0");
        }
        for (k, (c, m)) in self.terms.iter().enumerate() {
            if k > 0 {
                write!(f, " {} ", if c.is_negative() { "-" } else { "+" })?;
            } else if c.is_negative() {
                write!(f, "-")?;
            }
            let abs = c.abs();
            if m.is_unit() {
                write!(f, "{abs}")?;
            } else if abs.is_one() {
                write!(f, "{m}")?;
            } else {
                write!(f, "{abs}*{m}")?;
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

    fn x() -> Polynomial {
        Polynomial::variable(0)
    }

    fn y() -> Polynomial {
        Polynomial::variable(1)
    }

    #[test]
    fn monomial_ordering_is_graded_lex() {
        let x2 = Monomial::from_var_power(0, 2);
        let xy = Monomial::from_powers([(0, 1), (1, 1)]);
        let y2 = Monomial::from_var_power(1, 2);
        let x1 = Monomial::from_var(0);
        assert!(y2 > xy);
        assert!(xy > x2);
        assert!(x2 > x1);
        assert!(x1 > Monomial::unit());
    }

    #[test]
    fn monomial_mul_div_roundtrip() {
        let a = Monomial::from_powers([(0, 2), (2, 1)]);
        let b = Monomial::from_powers([(0, 1), (1, 3)]);
        let prod = a.mul(&b);
        assert_eq!(prod.try_div(&b), Some(a.clone()));
        assert_eq!(prod.try_div(&a), Some(b));
        assert_eq!(a.try_div(&Monomial::from_var(1)), None);
    }

    #[test]
    fn add_merges_and_cancels() {
        let p = &(&x() * &x()) + &x();
        let q_poly = &(-&(&x() * &x())) + &Polynomial::constant(q(3));
        let sum = &p + &q_poly;
        assert_eq!(sum, &x() + &Polynomial::constant(q(3)));
    }

    #[test]
    fn mul_expands_binomial() {
        // (x + y)^2 = x^2 + 2xy + y^2
        let p = &x() + &y();
        let sq = &p * &p;
        assert_eq!(sq.num_terms(), 3);
        assert_eq!(sq.degree_in(0), 2);
        assert_eq!(sq.degree_in(1), 2);
        let xy = Polynomial::from_terms([(q(2), Monomial::from_powers([(0, 1), (1, 1)]))]);
        let expected = &(&(&x() * &x()) + &xy) + &(&y() * &y());
        assert_eq!(sq, expected);
    }

    #[test]
    fn univariate_view_roundtrip() {
        // p = y*x^2 + (y + 1)*x + 3, main variable x0.
        let p = Polynomial::from_terms([
            (q(1), Monomial::from_powers([(0, 2), (1, 1)])),
            (q(1), Monomial::from_powers([(0, 1), (1, 1)])),
            (q(1), Monomial::from_var(0)),
            (q(3), Monomial::unit()),
        ]);
        let coeffs = p.coeffs_wrt(0);
        assert_eq!(coeffs.len(), 3);
        assert_eq!(coeffs[0], Polynomial::constant(q(3)));
        assert_eq!(coeffs[2], y());
        assert_eq!(Polynomial::from_coeffs_wrt(0, &coeffs), p);
    }

    #[test]
    fn derivative_of_power() {
        let p = x().pow(3);
        let d = p.derivative(0);
        assert_eq!(d, Polynomial::from_terms([(q(3), Monomial::from_var_power(0, 2))]));
        assert!(p.derivative(1).is_zero());
    }

    #[test]
    fn substitution_evaluates() {
        // p = x^2 + y, x -> 3, y -> 4 gives 13.
        let p = &(&x() * &x()) + &y();
        let mut a = FxHashMap::default();
        a.insert(0u32, q(3));
        a.insert(1u32, q(4));
        assert_eq!(p.evaluate(&a), Some(q(13)));
    }

    #[test]
    fn substitute_poly_composes() {
        // p = x^2, x -> y + 1 gives y^2 + 2y + 1.
        let p = &x() * &x();
        let repl = &y() + &Polynomial::one();
        let composed = p.substitute_poly(0, &repl);
        assert_eq!(composed, &repl * &repl);
        assert!(!composed.contains_var(0));
    }

    #[test]
    fn integer_normalization_strips_content_and_sign() {
        // -4/6 x + 2 normalizes to x - 3 (leading coefficient positive).
        let p = &x().scale(&BigRational::new(BigInt::from(-4), BigInt::from(6)))
            + &Polynomial::constant(q(2));
        let (n, flipped) = p.integer_normalized();
        assert!(flipped);
        assert_eq!(n, &x() - &Polynomial::constant(q(3)));
    }

    #[test]
    fn exact_division() {
        let p = &x() + &y();
        let prod = &p * &p;
        assert_eq!(prod.try_div(&p), Some(p.clone()));
        assert_eq!(prod.try_div(&(&x() - &y())), None);
    }

    #[test]
    fn level_and_main_var() {
        assert_eq!(Polynomial::one().level(), 0);
        assert_eq!(x().level(), 1);
        let p = &(&x() * &y()) + &Polynomial::one();
        assert_eq!(p.main_var(), Some(1));
        assert_eq!(p.level(), 2);
    }

    #[test]
    fn to_unipoly() {
        let p = &(&x() * &x()) - &Polynomial::constant(q(2));
        let u = p.to_unipoly(0).unwrap();
        assert_eq!(u.degree(), 2);
        assert!((&(&x() * &y())).to_unipoly(0).is_none());
    }

    #[test]
    fn structural_hash_matches_equality() {
        let a = &(&x() + &y()) * &(&x() - &y());
        let b = &(&x() * &x()) - &(&y() * &y());
        assert_eq!(a, b);
        assert_eq!(a.structural_hash(), b.structural_hash());
    }
}
