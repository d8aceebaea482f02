use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// A named shared parameter with its declared default value. The live
/// value used during evaluation belongs to the context, not to this
/// definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalParameter {
    pub name: String,
    pub default_value: f64,
}

/// One interaction group: the particles the expression's coordinate
/// symbols refer to, plus this group's per-group parameter values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionGroup {
    pub particles: Vec<usize>,
    pub values: Vec<f64>,
}

/// A compound interaction definition: one algebraic expression evaluated
/// over a fixed number of particles per group, summed over all groups.
///
/// The expression may reference the coordinate symbols `x1, y1, z1, x2, ...`
/// of the group's particles, any global parameter by name, and any
/// per-group parameter by name. Groups are append-only; their parameter
/// values may be replaced in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundForce {
    particles_per_group: usize,
    expression: String,
    globals: Vec<GlobalParameter>,
    group_parameters: Vec<String>,
    groups: Vec<InteractionGroup>,
}

impl CompoundForce {
    pub fn new(particles_per_group: usize, expression: impl Into<String>) -> Self {
        Self {
            particles_per_group,
            expression: expression.into(),
            globals: Vec::new(),
            group_parameters: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn particles_per_group(&self) -> usize {
        self.particles_per_group
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Declares a global parameter and returns its index. Names must be
    /// unique across global and per-group parameters.
    pub fn add_global_parameter(
        &mut self,
        name: impl Into<String>,
        default_value: f64,
    ) -> Result<usize, EngineError> {
        let name = name.into();
        self.check_fresh_name(&name)?;
        self.globals.push(GlobalParameter {
            name,
            default_value,
        });
        Ok(self.globals.len() - 1)
    }

    /// Declares a per-group parameter slot and returns its index.
    pub fn add_group_parameter(&mut self, name: impl Into<String>) -> Result<usize, EngineError> {
        let name = name.into();
        self.check_fresh_name(&name)?;
        self.group_parameters.push(name);
        Ok(self.group_parameters.len() - 1)
    }

    fn check_fresh_name(&self, name: &str) -> Result<(), EngineError> {
        let taken = self.globals.iter().any(|p| p.name == name)
            || self.group_parameters.iter().any(|n| n == name);
        if taken {
            return Err(EngineError::DuplicateParameter(name.to_string()));
        }
        Ok(())
    }

    pub fn global_parameters(&self) -> &[GlobalParameter] {
        &self.globals
    }

    pub fn group_parameter_names(&self) -> &[String] {
        &self.group_parameters
    }

    /// Appends a group and returns its index. The particle count must
    /// match `particles_per_group` and the value count must match the
    /// declared per-group parameters.
    pub fn add_group(
        &mut self,
        particles: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<usize, EngineError> {
        if particles.len() != self.particles_per_group {
            return Err(EngineError::GroupParticleCount {
                expected: self.particles_per_group,
                got: particles.len(),
            });
        }
        self.check_values(&values)?;
        self.groups.push(InteractionGroup { particles, values });
        Ok(self.groups.len() - 1)
    }

    /// Replaces the parameter values of an existing group.
    pub fn set_group_values(&mut self, index: usize, values: Vec<f64>) -> Result<(), EngineError> {
        self.check_values(&values)?;
        let count = self.groups.len();
        let group = self
            .groups
            .get_mut(index)
            .ok_or(EngineError::GroupIndex { index, count })?;
        group.values = values;
        Ok(())
    }

    fn check_values(&self, values: &[f64]) -> Result<(), EngineError> {
        if values.len() != self.group_parameters.len() {
            return Err(EngineError::GroupValueCount {
                expected: self.group_parameters.len(),
                got: values.len(),
            });
        }
        Ok(())
    }

    pub fn group(&self, index: usize) -> Option<&InteractionGroup> {
        self.groups.get(index)
    }

    pub fn groups(&self) -> &[InteractionGroup] {
        &self.groups
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::CompoundForce;
    use crate::error::EngineError;

    #[test]
    fn parameter_names_must_be_unique() {
        let mut force = CompoundForce::new(1, "a*x1+b");
        force.add_global_parameter("a", 1.0).expect("first a");
        assert_eq!(
            force.add_global_parameter("a", 2.0),
            Err(EngineError::DuplicateParameter("a".to_string()))
        );
        force.add_group_parameter("b").expect("first b");
        assert_eq!(
            force.add_group_parameter("a"),
            Err(EngineError::DuplicateParameter("a".to_string()))
        );
    }

    #[test]
    fn group_values_are_validated() {
        let mut force = CompoundForce::new(2, "x1+x2");
        force.add_group_parameter("k").expect("declare k");

        assert_eq!(
            force.add_group(vec![0], vec![1.0]),
            Err(EngineError::GroupParticleCount {
                expected: 2,
                got: 1
            })
        );
        assert_eq!(
            force.add_group(vec![0, 1], vec![]),
            Err(EngineError::GroupValueCount {
                expected: 1,
                got: 0
            })
        );

        let index = force.add_group(vec![0, 1], vec![4.0]).expect("valid group");
        assert_eq!(index, 0);
        assert_eq!(
            force.set_group_values(3, vec![1.0]),
            Err(EngineError::GroupIndex { index: 3, count: 1 })
        );
        force.set_group_values(0, vec![5.0]).expect("replace values");
        assert_eq!(force.group(0).expect("group exists").values, vec![5.0]);
    }
}
