//! Exact arithmetic kernel for the rasat solver.
//!
//! This crate provides the algebra that everything else is built on:
//! sparse multivariate polynomials over arbitrary-precision rationals,
//! dense univariate polynomials with Sturm-sequence root isolation, and
//! exact real algebraic numbers together with sign evaluation of
//! polynomials under partial real-algebraic assignments.
//!
//! All decisions taken by the solver engines are exact; floating point
//! never influences a result, only heuristic orderings.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod algebraic;
pub mod interval;
pub mod polynomial;
pub mod unipoly;

pub use algebraic::eval::{self, RealAssignment, RootsResult};
pub use algebraic::number::RealAlgebraicNumber;
pub use interval::RatInterval;
pub use polynomial::{Monomial, Polynomial, Sign, Var, VarPower, NULL_VAR};
pub use unipoly::UniPoly;
