//! Virtual substitution engine for low-degree nonlinear arithmetic.
//!
//! The engine eliminates variables by substituting symbolic test
//! candidates — roots of linear and quadratic conditions, epsilon-shifted
//! points for strict relations, and minus infinity — into the remaining
//! conjunction, exploring the resulting disjunctive state tree with
//! conflict-set driven backtracking, variable-bound pruning and an
//! integer-aware branch-and-bound layer.
//!
//! Conditions whose degree in the elimination variable is too high are
//! flagged and left to a stronger backend (the CAD engine) by the module
//! dispatcher.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod bounds;
pub mod condition;
pub mod solver;
pub mod sqrt_expr;
pub mod state;
pub mod substitution;

pub use solver::{UnknownReason, VsConfig, VsError, VsOutcome, VsSolver, VsStats};
pub use sqrt_expr::SqrtExpr;
pub use substitution::{Substitution, SubstitutionType};
