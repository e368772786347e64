//! Real algebraic numbers and exact evaluation.

pub mod eval;
pub mod number;
