//! The `tally_core` crate is the compute engine behind the Tally
//! summation library. It evaluates algebraic expressions over the
//! coordinates of a small particle system and produces potential
//! energies and forces, generically over plain floats and dual numbers.
//!
//! Key components:
//! - **Traits**: `Scalar` (numeric type abstraction), `Integrator`
//!   (time-stepping seam).
//! - **Expr**: tokenizer, parser, compiler, and stack VM for the
//!   expression language.
//! - **Dual**: forward-mode automatic differentiation.
//! - **Force**: the compound interaction definition (expression, global
//!   and per-group parameters, interaction groups).
//! - **Context**: the owning runtime object that turns positions into
//!   energies and forces.

pub mod backend;
pub mod context;
pub mod dual;
pub mod error;
pub mod expr;
pub mod force;
pub mod integrate;
pub mod system;
pub mod traits;
