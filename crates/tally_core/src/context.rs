use crate::backend::{Backend, GradientMethod};
use crate::dual::Dual;
use crate::error::EngineError;
use crate::expr::{self, Program, Vm};
use crate::force::{CompoundForce, InteractionGroup};
use crate::system::ParticleSystem;
use crate::traits::Integrator;
use nalgebra::Vector3;

/// The compiled form of a force definition: the bytecode plus a snapshot
/// of the group table it was compiled against.
struct CompiledForce {
    program: Program,
    groups: Vec<InteractionGroup>,
    coords_per_group: usize,
}

/// The engine's runtime object. A context exclusively owns one particle
/// system, one force definition, one integrator, and one backend; they
/// are torn down together when the context is dropped.
///
/// Positions and velocities start at zero. Global parameter values are
/// seeded from the force's declared defaults and live here afterwards.
pub struct Context {
    system: ParticleSystem,
    force: CompoundForce,
    integrator: Box<dyn Integrator>,
    backend: Backend,
    compiled: CompiledForce,
    positions: Vec<Vector3<f64>>,
    velocities: Vec<Vector3<f64>>,
    global_names: Vec<String>,
    global_values: Vec<f64>,
    energy_evaluations: u64,
    force_evaluations: u64,
}

impl Context {
    pub fn new(
        system: ParticleSystem,
        force: CompoundForce,
        integrator: Box<dyn Integrator>,
        backend: Backend,
    ) -> Result<Self, EngineError> {
        let compiled = compile_force(&force, &system)?;
        let global_names = force
            .global_parameters()
            .iter()
            .map(|p| p.name.clone())
            .collect();
        let global_values = force
            .global_parameters()
            .iter()
            .map(|p| p.default_value)
            .collect();
        let count = system.len();
        Ok(Self {
            system,
            force,
            integrator,
            backend,
            compiled,
            positions: vec![Vector3::zeros(); count],
            velocities: vec![Vector3::zeros(); count],
            global_names,
            global_values,
            energy_evaluations: 0,
            force_evaluations: 0,
        })
    }

    pub fn system(&self) -> &ParticleSystem {
        &self.system
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// The backend's live property map (see [`Backend::properties`]).
    pub fn properties(&self) -> std::collections::BTreeMap<String, String> {
        self.backend.properties()
    }

    pub fn force(&self) -> &CompoundForce {
        &self.force
    }

    /// Mutable access to the owned force definition. Structural changes
    /// (new groups) require [`Context::reinitialize`]; value changes can
    /// be pushed with [`Context::refresh_group_parameters`].
    pub fn force_mut(&mut self) -> &mut CompoundForce {
        &mut self.force
    }

    pub fn positions(&self) -> &[Vector3<f64>] {
        &self.positions
    }

    pub fn set_positions(&mut self, positions: &[Vector3<f64>]) -> Result<(), EngineError> {
        if positions.len() != self.system.len() {
            return Err(EngineError::PositionCount {
                expected: self.system.len(),
                got: positions.len(),
            });
        }
        self.positions.copy_from_slice(positions);
        Ok(())
    }

    pub fn velocities(&self) -> &[Vector3<f64>] {
        &self.velocities
    }

    pub fn set_velocities(&mut self, velocities: &[Vector3<f64>]) -> Result<(), EngineError> {
        if velocities.len() != self.system.len() {
            return Err(EngineError::VelocityCount {
                expected: self.system.len(),
                got: velocities.len(),
            });
        }
        self.velocities.copy_from_slice(velocities);
        Ok(())
    }

    /// The sum of the expression over all groups at the current positions.
    pub fn potential_energy(&mut self) -> f64 {
        self.energy_evaluations += 1;
        self.energy_at(&self.positions)
    }

    /// Per-particle forces `F = -∇E` at the current positions, computed
    /// with the backend's gradient method.
    pub fn forces(&mut self) -> Vec<Vector3<f64>> {
        self.force_evaluations += 1;
        match self.backend.gradient() {
            GradientMethod::Dual => self.forces_dual(),
            GradientMethod::FiniteDifference { step } => self.forces_numerical(step),
        }
    }

    /// Total kinetic energy of the system at the current velocities.
    pub fn kinetic_energy(&self) -> f64 {
        self.system
            .masses()
            .iter()
            .zip(&self.velocities)
            .map(|(&m, v)| 0.5 * m * v.norm_squared())
            .sum()
    }

    /// How many times the potential energy has been computed. The caching
    /// layer above the engine is validated against this.
    pub fn energy_evaluation_count(&self) -> u64 {
        self.energy_evaluations
    }

    /// How many times forces have been computed.
    pub fn force_evaluation_count(&self) -> u64 {
        self.force_evaluations
    }

    pub fn parameter(&self, name: &str) -> Result<f64, EngineError> {
        self.global_index(name).map(|i| self.global_values[i])
    }

    pub fn set_parameter(&mut self, name: &str, value: f64) -> Result<(), EngineError> {
        let index = self.global_index(name)?;
        self.global_values[index] = value;
        Ok(())
    }

    fn global_index(&self, name: &str) -> Result<usize, EngineError> {
        self.global_names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| EngineError::UnknownParameter(name.to_string()))
    }

    /// Rebuilds the compiled program from the current force definition.
    /// Positions, velocities, and the live values of surviving global
    /// parameters are preserved; newly declared globals start at their
    /// defaults.
    pub fn reinitialize(&mut self) -> Result<(), EngineError> {
        let compiled = compile_force(&self.force, &self.system)?;
        let mut names = Vec::with_capacity(self.force.global_parameters().len());
        let mut values = Vec::with_capacity(self.force.global_parameters().len());
        for param in self.force.global_parameters() {
            let live = self
                .global_names
                .iter()
                .position(|n| *n == param.name)
                .map(|i| self.global_values[i]);
            names.push(param.name.clone());
            values.push(live.unwrap_or(param.default_value));
        }
        self.global_names = names;
        self.global_values = values;
        self.compiled = compiled;
        Ok(())
    }

    /// Pushes the force definition's current group parameter values into
    /// the compiled program without recompiling. Fails if the group
    /// layout changed since compilation; reinitialize instead.
    pub fn refresh_group_parameters(&mut self) -> Result<(), EngineError> {
        if self.force.num_groups() != self.compiled.groups.len() {
            return Err(EngineError::GroupLayoutChanged);
        }
        for (snapshot, group) in self.compiled.groups.iter_mut().zip(self.force.groups()) {
            if snapshot.particles != group.particles {
                return Err(EngineError::GroupLayoutChanged);
            }
            snapshot.values.clone_from(&group.values);
        }
        Ok(())
    }

    /// Runs the integrator for the given number of steps, evaluating
    /// forces at each one.
    pub fn advance(&mut self, steps: usize) {
        for _ in 0..steps {
            let forces = self.forces();
            self.integrator.step(
                self.system.masses(),
                &forces,
                &mut self.positions,
                &mut self.velocities,
            );
        }
    }

    fn energy_at(&self, positions: &[Vector3<f64>]) -> f64 {
        let mut stack = Vec::with_capacity(self.compiled.program.ops().len());
        let mut coords = vec![0.0; self.compiled.coords_per_group];
        let mut total = 0.0;
        for group in &self.compiled.groups {
            for (slot, coord) in coords.iter_mut().enumerate() {
                *coord = positions[group.particles[slot / 3]][slot % 3];
            }
            total += Vm::run(
                &self.compiled.program,
                &coords,
                &self.global_values,
                &group.values,
                &mut stack,
            );
        }
        total
    }

    fn forces_dual(&self) -> Vec<Vector3<f64>> {
        let coords_per_group = self.compiled.coords_per_group;
        let mut forces = vec![Vector3::zeros(); self.system.len()];
        let globals: Vec<Dual> = self.global_values.iter().map(|&v| Dual::constant(v)).collect();
        let mut stack = Vec::with_capacity(self.compiled.program.ops().len());
        let mut coords = vec![Dual::constant(0.0); coords_per_group];
        for group in &self.compiled.groups {
            let values: Vec<Dual> = group.values.iter().map(|&v| Dual::constant(v)).collect();
            for (slot, coord) in coords.iter_mut().enumerate() {
                *coord = Dual::constant(self.positions[group.particles[slot / 3]][slot % 3]);
            }
            for slot in 0..coords_per_group {
                coords[slot].dx = 1.0;
                let out = Vm::run(&self.compiled.program, &coords, &globals, &values, &mut stack);
                coords[slot].dx = 0.0;
                forces[group.particles[slot / 3]][slot % 3] -= out.dx;
            }
        }
        forces
    }

    fn forces_numerical(&self, step: f64) -> Vec<Vector3<f64>> {
        let mut forces = vec![Vector3::zeros(); self.system.len()];
        let mut positions = self.positions.clone();
        for i in 0..positions.len() {
            for axis in 0..3 {
                let original = positions[i][axis];
                positions[i][axis] = original + step;
                let above = self.energy_at(&positions);
                positions[i][axis] = original - step;
                let below = self.energy_at(&positions);
                positions[i][axis] = original;
                forces[i][axis] = -(above - below) / (2.0 * step);
            }
        }
        forces
    }
}

fn compile_force(
    force: &CompoundForce,
    system: &ParticleSystem,
) -> Result<CompiledForce, EngineError> {
    for group in force.groups() {
        for &particle in &group.particles {
            if particle >= system.len() {
                return Err(EngineError::ParticleIndex {
                    index: particle,
                    count: system.len(),
                });
            }
        }
        if group.values.len() != force.group_parameter_names().len() {
            return Err(EngineError::GroupValueCount {
                expected: force.group_parameter_names().len(),
                got: group.values.len(),
            });
        }
    }
    let globals: Vec<String> = force
        .global_parameters()
        .iter()
        .map(|p| p.name.clone())
        .collect();
    let program = expr::compile(
        force.expression(),
        force.particles_per_group(),
        &globals,
        force.group_parameter_names(),
    )?;
    Ok(CompiledForce {
        program,
        groups: force.groups().to_vec(),
        coords_per_group: 3 * force.particles_per_group(),
    })
}

#[cfg(test)]
mod tests {
    use super::Context;
    use crate::backend::{Backend, GradientMethod};
    use crate::error::EngineError;
    use crate::force::CompoundForce;
    use crate::integrate::VerletIntegrator;
    use crate::system::ParticleSystem;
    use nalgebra::Vector3;

    fn build(num_particles: usize, force: CompoundForce, backend: Backend) -> Context {
        let mut system = ParticleSystem::new();
        for _ in 0..num_particles {
            system.add_particle(1.0);
        }
        Context::new(
            system,
            force,
            Box::new(VerletIntegrator::new(0.01)),
            backend,
        )
        .expect("context builds")
    }

    fn assert_close(found: f64, expected: f64, tol: f64) {
        assert!(
            (found - expected).abs() <= tol,
            "expected {expected}, got {found}"
        );
    }

    #[test]
    fn energy_and_forces_of_a_squared_norm() {
        let mut force = CompoundForce::new(1, "x1^2+y1^2+z1^2");
        force.add_group(vec![0], vec![]).expect("one group");
        let mut context = build(1, force, Backend::reference());

        context
            .set_positions(&[Vector3::new(1.0, 2.0, 2.0)])
            .expect("positions fit");
        assert_close(context.potential_energy(), 9.0, 1e-12);

        let forces = context.forces();
        assert_close(forces[0].x, -2.0, 1e-12);
        assert_close(forces[0].y, -4.0, 1e-12);
        assert_close(forces[0].z, -4.0, 1e-12);
    }

    #[test]
    fn groups_accumulate_and_share_particles() {
        let mut force = CompoundForce::new(1, "k*x1");
        force.add_group_parameter("k").expect("declare k");
        force.add_group(vec![0], vec![2.0]).expect("group 0");
        force.add_group(vec![0], vec![3.0]).expect("group 1");
        let mut context = build(1, force, Backend::reference());

        context
            .set_positions(&[Vector3::new(2.0, 0.0, 0.0)])
            .expect("positions fit");
        assert_close(context.potential_energy(), 10.0, 1e-12);
        // dE/dx1 = 2 + 3 summed over groups.
        assert_close(context.forces()[0].x, -5.0, 1e-12);
    }

    #[test]
    fn global_parameters_are_live() {
        let mut force = CompoundForce::new(1, "a*x1");
        force.add_global_parameter("a", 2.0).expect("declare a");
        force.add_group(vec![0], vec![]).expect("one group");
        let mut context = build(1, force, Backend::reference());

        context
            .set_positions(&[Vector3::new(3.0, 0.0, 0.0)])
            .expect("positions fit");
        assert_close(context.potential_energy(), 6.0, 1e-12);

        context.set_parameter("a", 5.0).expect("a exists");
        assert_eq!(context.parameter("a"), Ok(5.0));
        assert_close(context.potential_energy(), 15.0, 1e-12);

        assert_eq!(
            context.parameter("b"),
            Err(EngineError::UnknownParameter("b".to_string()))
        );
    }

    #[test]
    fn gradient_methods_agree() {
        let expression = "sin(x1)*cos(y1)+exp(z1/4)+x1*y1";
        let mut force = CompoundForce::new(1, expression);
        force.add_group(vec![0], vec![]).expect("one group");
        let mut dual = build(1, force.clone(), Backend::reference());
        let mut numerical = build(
            1,
            force,
            Backend::with_gradient(GradientMethod::FiniteDifference { step: 1e-6 }),
        );

        let point = [Vector3::new(0.3, -0.7, 1.1)];
        dual.set_positions(&point).expect("positions fit");
        numerical.set_positions(&point).expect("positions fit");

        let exact = dual.forces();
        let approx = numerical.forces();
        for axis in 0..3 {
            assert_close(approx[0][axis], exact[0][axis], 1e-6);
        }
    }

    #[test]
    fn evaluation_counters_track_every_pass() {
        let mut force = CompoundForce::new(1, "x1");
        force.add_group(vec![0], vec![]).expect("one group");
        let mut context = build(1, force, Backend::reference());

        context.potential_energy();
        context.potential_energy();
        context.forces();
        assert_eq!(context.energy_evaluation_count(), 2);
        assert_eq!(context.force_evaluation_count(), 1);
    }

    #[test]
    fn refresh_pushes_values_but_not_layout() {
        let mut force = CompoundForce::new(1, "k*x1");
        force.add_group_parameter("k").expect("declare k");
        force.add_group(vec![0], vec![2.0]).expect("one group");
        let mut context = build(1, force, Backend::reference());
        context
            .set_positions(&[Vector3::new(1.0, 0.0, 0.0)])
            .expect("positions fit");
        assert_close(context.potential_energy(), 2.0, 1e-12);

        context
            .force_mut()
            .set_group_values(0, vec![7.0])
            .expect("replace values");
        // Not visible until refreshed.
        assert_close(context.potential_energy(), 2.0, 1e-12);
        context.refresh_group_parameters().expect("same layout");
        assert_close(context.potential_energy(), 7.0, 1e-12);

        context
            .force_mut()
            .add_group(vec![0], vec![1.0])
            .expect("new group");
        assert_eq!(
            context.refresh_group_parameters(),
            Err(EngineError::GroupLayoutChanged)
        );
        context.reinitialize().expect("recompile");
        assert_close(context.potential_energy(), 8.0, 1e-12);
    }

    #[test]
    fn reinitialize_preserves_live_parameter_values() {
        let mut force = CompoundForce::new(1, "a*x1");
        force.add_global_parameter("a", 1.0).expect("declare a");
        force.add_group(vec![0], vec![]).expect("one group");
        let mut context = build(1, force, Backend::reference());

        context.set_parameter("a", 9.0).expect("a exists");
        context.reinitialize().expect("recompile");
        assert_eq!(context.parameter("a"), Ok(9.0));
    }

    #[test]
    fn position_count_is_validated() {
        let mut force = CompoundForce::new(2, "x1+x2");
        force.add_group(vec![0, 1], vec![]).expect("one group");
        let mut context = build(2, force, Backend::reference());
        assert_eq!(
            context.set_positions(&[Vector3::zeros()]),
            Err(EngineError::PositionCount {
                expected: 2,
                got: 1
            })
        );
    }

    #[test]
    fn bad_definitions_fail_at_construction() {
        // Particle index beyond the system.
        let mut force = CompoundForce::new(1, "x1");
        force.add_group(vec![3], vec![]).expect("definition accepts it");
        let system = {
            let mut system = ParticleSystem::new();
            system.add_particle(1.0);
            system
        };
        let result = Context::new(
            system,
            force,
            Box::new(VerletIntegrator::new(0.01)),
            Backend::reference(),
        );
        assert!(matches!(
            result.err(),
            Some(EngineError::ParticleIndex { index: 3, count: 1 })
        ));

        // Unknown symbol in the expression.
        let mut force = CompoundForce::new(1, "x1+q");
        force.add_group(vec![0], vec![]).expect("group is fine");
        let system = {
            let mut system = ParticleSystem::new();
            system.add_particle(1.0);
            system
        };
        let result = Context::new(
            system,
            force,
            Box::new(VerletIntegrator::new(0.01)),
            Backend::reference(),
        );
        let err = anyhow::Error::from(result.err().expect("expression must fail"));
        assert!(
            format!("{err:#}").contains("unknown symbol"),
            "unexpected error: {err:#}"
        );
    }

    #[test]
    fn advancing_a_harmonic_well_conserves_energy() {
        let mut force = CompoundForce::new(1, "x1^2+y1^2+z1^2");
        force.add_group(vec![0], vec![]).expect("one group");
        let mut context = build(1, force, Backend::reference());
        context
            .set_positions(&[Vector3::new(1.0, 0.0, 0.0)])
            .expect("positions fit");

        let initial = context.potential_energy() + context.kinetic_energy();
        context.advance(200);
        let along_the_way = context.potential_energy() + context.kinetic_energy();
        assert_close(along_the_way, initial, 0.05 * initial);
        // The particle should actually have moved.
        assert!((context.positions()[0].x - 1.0).abs() > 1e-3);
    }
}
