//! Solver facade and module dispatcher for rasat.
//!
//! The dispatcher pipelines a fixed strategy: the equality-substitution
//! preprocessor rewrites the asserted conjunction, a cheap linear backend
//! look for early refutations on the de-linearized image, the virtual
//! substitution engine decides the low-degree residue, and the CAD engine
//! decides whatever VS defers. Integer problems go through a
//! branch-and-bound layer on top of both engines.
//!
//! Infeasible subsets are always reported in terms of the original
//! assertions; auxiliary variables introduced by de-linearization never
//! leak.
//!
//! # Examples
//!
//! ```
//! use rasat_solver::Solver;
//! use rasat_core::{Answer, Relation};
//! use rasat_math::Polynomial;
//!
//! let mut solver = Solver::new();
//! // x^2 - 2 = 0 and x > 0
//! let x = Polynomial::variable(0);
//! let two = Polynomial::from_int(2);
//! solver.assert_constraint(&(&x * &x) - &two, Relation::Eq);
//! solver.assert_constraint(x, Relation::Greater);
//! assert_eq!(solver.check().unwrap(), Answer::Sat);
//! let model = solver.model().expect("sat model");
//! assert!(model.get(0).is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod dispatch;
pub mod es;

pub use dispatch::{exit_code, Solver, SolverConfig, SolverError, SolverStats};
pub use es::{EsPreprocessor, EsRun};
