//! Custom summation function objects with derivative support.
//!
//! A [`Summation`] is a scalar function of N real arguments defined as a
//! sum of terms. All terms share one algebraic expression (over the
//! arguments, laid out as 3D points, plus named parameters); each term
//! supplies its own per-term parameter values. Values and first partial
//! derivatives are not computed here: every summation owns a private
//! [`tally_core`] context that hosts the expression as a compound
//! interaction over a handful of synthetic particles, and the context's
//! potential-energy and force passes supply the results. Results are
//! cached per argument vector, so optimizers that ask for a value and a
//! gradient at the same point trigger a single backend pass of each kind.

mod error;
mod evaluator;
mod summation;

pub use crate::error::{Error, Result};
pub use crate::summation::{Definition, Summation};
pub use tally_core::backend::{Backend, GradientMethod};
