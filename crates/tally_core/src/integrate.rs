use crate::traits::Integrator;
use nalgebra::Vector3;

/// Leapfrog Verlet integrator with a fixed step.
///
/// Velocities are kicked by the current forces, then positions drift with
/// the updated velocities. Symplectic, so energy stays bounded for the
/// small synthetic systems the contexts host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerletIntegrator {
    step_size: f64,
}

impl VerletIntegrator {
    pub fn new(step_size: f64) -> Self {
        Self { step_size }
    }
}

impl Integrator for VerletIntegrator {
    fn step_size(&self) -> f64 {
        self.step_size
    }

    fn step(
        &mut self,
        masses: &[f64],
        forces: &[Vector3<f64>],
        positions: &mut [Vector3<f64>],
        velocities: &mut [Vector3<f64>],
    ) {
        let dt = self.step_size;
        for i in 0..masses.len() {
            velocities[i] += forces[i] * (dt / masses[i]);
            positions[i] += velocities[i] * dt;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::VerletIntegrator;
    use crate::traits::Integrator;
    use nalgebra::Vector3;

    #[test]
    fn free_particle_drifts_linearly() {
        let mut integrator = VerletIntegrator::new(0.5);
        let masses = [2.0];
        let forces = [Vector3::zeros()];
        let mut positions = [Vector3::new(1.0, 0.0, 0.0)];
        let mut velocities = [Vector3::new(0.0, 2.0, 0.0)];

        for _ in 0..4 {
            integrator.step(&masses, &forces, &mut positions, &mut velocities);
        }
        assert_eq!(positions[0], Vector3::new(1.0, 4.0, 0.0));
        assert_eq!(velocities[0], Vector3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn constant_force_accelerates() {
        let mut integrator = VerletIntegrator::new(1.0);
        let masses = [1.0];
        let forces = [Vector3::new(1.0, 0.0, 0.0)];
        let mut positions = [Vector3::zeros()];
        let mut velocities = [Vector3::zeros()];

        integrator.step(&masses, &forces, &mut positions, &mut velocities);
        assert_eq!(velocities[0].x, 1.0);
        assert_eq!(positions[0].x, 1.0);
    }
}
