use nalgebra::Vector3;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types the expression VM can operate on.
/// `f64` produces plain values; [`crate::dual::Dual`] carries one
/// directional derivative alongside the value.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A fixed-step time integrator over particle positions and velocities.
///
/// [`crate::context::Context`] evaluates forces at the current positions
/// and hands them to `step` once per step.
pub trait Integrator {
    /// Step size in engine time units.
    fn step_size(&self) -> f64;

    /// Advances positions and velocities by one step.
    /// All slices have one entry per particle.
    fn step(
        &mut self,
        masses: &[f64],
        forces: &[Vector3<f64>],
        positions: &mut [Vector3<f64>],
        velocities: &mut [Vector3<f64>],
    );
}
