use crate::error::{Error, Result};
use nalgebra::Vector3;
use tally_core::backend::Backend;
use tally_core::context::Context;
use tally_core::force::CompoundForce;
use tally_core::integrate::VerletIntegrator;
use tally_core::system::ParticleSystem;

/// Step size of the stub integrator. The context's construction contract
/// requires one; evaluation never advances it.
const STUB_STEP: f64 = 0.01;

/// Results of the most recent evaluation, keyed by the argument vector
/// they were computed at. `None` means dirty. Any structural change
/// (terms, parameters) empties both results and forces the next position
/// write through to the context even if the arguments repeat.
#[derive(Debug)]
struct Cache {
    arguments: Vec<f64>,
    value: Option<f64>,
    derivatives: Option<Vec<f64>>,
    structure_changed: bool,
}

impl Cache {
    fn new(num_args: usize) -> Self {
        // The context starts with zeroed positions, so the zero vector is
        // a faithful "last seen" key from the start.
        Self {
            arguments: vec![0.0; num_args],
            value: None,
            derivatives: None,
            structure_changed: false,
        }
    }

    fn invalidate_results(&mut self) {
        self.value = None;
        self.derivatives = None;
    }

    fn mark_structure_changed(&mut self) {
        self.structure_changed = true;
        self.invalidate_results();
    }
}

/// Owns the private context that hosts the summation's expression and
/// translates between flat argument vectors and 3D particle positions.
/// One evaluator per summation, never shared.
pub(crate) struct Evaluator {
    num_args: usize,
    particles: Vec<usize>,
    positions: Vec<Vector3<f64>>,
    cache: Cache,
    context: Context,
}

impl Evaluator {
    pub(crate) fn new(num_args: usize, force: CompoundForce, backend: Backend) -> Result<Self> {
        let num_particles = force.particles_per_group();
        let mut system = ParticleSystem::new();
        for _ in 0..num_particles {
            system.add_particle(1.0);
        }
        let context = Context::new(
            system,
            force,
            Box::new(VerletIntegrator::new(STUB_STEP)),
            backend,
        )?;
        Ok(Self {
            num_args,
            particles: (0..num_particles).collect(),
            positions: vec![Vector3::zeros(); num_particles],
            cache: Cache::new(num_args),
            context,
        })
    }

    pub(crate) fn context(&self) -> &Context {
        &self.context
    }

    /// Lays the flat argument vector out as 3D points: argument `i` goes
    /// to component `i % 3` of particle `i / 3`; unfilled components of a
    /// partially-covered final particle stay zero.
    ///
    /// Skips the context entirely when the arguments match the cached
    /// vector and nothing structural changed since they were pushed.
    fn set_positions(&mut self, arguments: &[f64]) -> Result<()> {
        if arguments == self.cache.arguments.as_slice() && !self.cache.structure_changed {
            return Ok(());
        }
        for (i, &argument) in arguments.iter().enumerate() {
            self.positions[i / 3][i % 3] = argument;
        }
        self.context.set_positions(&self.positions)?;
        self.cache.arguments.copy_from_slice(arguments);
        self.cache.invalidate_results();
        self.cache.structure_changed = false;
        Ok(())
    }

    pub(crate) fn evaluate(&mut self, arguments: &[f64]) -> Result<f64> {
        self.set_positions(arguments)?;
        let Self { cache, context, .. } = self;
        Ok(*cache
            .value
            .get_or_insert_with(|| context.potential_energy()))
    }

    /// The full first-derivative vector: forces are negative gradients of
    /// the energy, so `derivative[i] = -force[i / 3][i % 3]`.
    pub(crate) fn evaluate_derivatives(&mut self, arguments: &[f64]) -> Result<&[f64]> {
        self.set_positions(arguments)?;
        let num_args = self.num_args;
        let Self { cache, context, .. } = self;
        let derivatives = cache.derivatives.get_or_insert_with(|| {
            let forces = context.forces();
            (0..num_args).map(|i| -forces[i / 3][i % 3]).collect()
        });
        Ok(derivatives.as_slice())
    }

    pub(crate) fn num_terms(&self) -> usize {
        self.context.force().num_groups()
    }

    pub(crate) fn term(&self, index: usize) -> Result<Vec<f64>> {
        let force = self.context.force();
        let group = force.group(index).ok_or(Error::IndexOutOfRange {
            what: "term",
            index,
            count: force.num_groups(),
        })?;
        Ok(group.values.clone())
    }

    /// Appends a term. New groups change the context's data layout, so
    /// this takes the full reinitialization path.
    pub(crate) fn add_term(&mut self, values: &[f64]) -> Result<usize> {
        let particles = self.particles.clone();
        let index = self
            .context
            .force_mut()
            .add_group(particles, values.to_vec())?;
        self.context.reinitialize()?;
        self.cache.mark_structure_changed();
        Ok(index)
    }

    /// Replaces a term's values in place and pushes them with the cheap
    /// incremental refresh.
    pub(crate) fn set_term(&mut self, index: usize, values: &[f64]) -> Result<()> {
        let count = self.num_terms();
        if index >= count {
            return Err(Error::IndexOutOfRange {
                what: "term",
                index,
                count,
            });
        }
        self.context
            .force_mut()
            .set_group_values(index, values.to_vec())?;
        self.context.refresh_group_parameters()?;
        self.cache.mark_structure_changed();
        Ok(())
    }

    pub(crate) fn parameter(&self, name: &str) -> Result<f64> {
        self.context
            .parameter(name)
            .map_err(|_| Error::NoSuchParameter(name.to_string()))
    }

    /// Conservative invalidation: a parameter change cannot move
    /// positions, but it does invalidate both cached results.
    pub(crate) fn set_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        self.context
            .set_parameter(name, value)
            .map_err(|_| Error::NoSuchParameter(name.to_string()))?;
        self.cache.mark_structure_changed();
        Ok(())
    }
}
