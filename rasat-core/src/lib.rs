//! Shared data model for the rasat solver engines.
//!
//! This crate provides what the CAD and virtual substitution engines have
//! in common: hash-consed polynomial and constraint pools with canonical
//! identifiers, the formula arena, bitsets for evaluation bookkeeping,
//! assignments over real algebraic numbers, and the tri-valued answer
//! type.
//!
//! Pools hand out small copyable ids; every id is stable for the lifetime
//! of the pool and identical structures always intern to the same id.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod answer;
pub mod bitset;
pub mod cancel;
pub mod constraint;
pub mod formula;
pub mod model;
pub mod pool;

pub use answer::Answer;
pub use bitset::Bitset;
pub use cancel::CancellationFlag;
pub use constraint::{Constraint, Relation};
pub use formula::{FormulaId, FormulaKind, FormulaPool};
pub use model::Model;
pub use pool::{ConstraintId, ConstraintPool, PolyId, PolyPool};
