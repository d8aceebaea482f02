use crate::error::{Error, Result};
use crate::evaluator::Evaluator;
use serde::{Deserialize, Serialize};
use tally_core::backend::Backend;
use tally_core::force::CompoundForce;

/// A user-defined function of N arguments, evaluated as a sum of terms.
///
/// Every term shares one algebraic expression and the overall parameters;
/// each term supplies its own values for the per-term parameters. The
/// arguments are laid out as the 3D coordinates `x1, y1, z1, x2, ...` of
/// ceil(N/3) synthetic particles, so the expression may reference them by
/// those names. Evaluation and differentiation are delegated to a private
/// [`tally_core::context::Context`] hosting the expression as a compound
/// interaction; the context's force output supplies the gradient.
///
/// The following evaluates a Gaussian mixture over 3D space, one kernel
/// per term:
///
/// ```
/// use tally::{Backend, Summation};
///
/// let mut gaussians = Summation::new(
///     3,
///     "exp(-((x1-mux)^2+(y1-muy)^2+(z1-muz)^2)/(2*sigma^2))",
///     &[("sigma", 1.0)],
///     &["mux", "muy", "muz"],
///     Backend::reference(),
/// )?;
/// gaussians.add_term(&[0.0, 0.0, 0.0])?;
/// gaussians.add_term(&[1.0, 1.0, 1.0])?;
///
/// let value = gaussians.evaluate(&[0.5, 0.5, 0.5])?;
/// let slope = gaussians.evaluate_derivative(&[0.5, 0.5, 0.5], 0)?;
/// assert!(value > 0.0 && slope.abs() < 1e-12);
/// # Ok::<(), tally::Error>(())
/// ```
pub struct Summation {
    num_args: usize,
    expression: String,
    overall_parameters: Vec<(String, f64)>,
    per_term_parameters: Vec<String>,
    backend: Backend,
    evaluator: Evaluator,
}

impl Summation {
    /// Builds a summation with no terms yet.
    ///
    /// `overall_parameters` maps names to declared defaults (the live
    /// values can be changed later with [`Summation::set_parameter`]);
    /// `per_term_parameters` names the slots every term must fill.
    /// Duplicate names and inexpressible expressions are rejected.
    pub fn new(
        num_args: usize,
        expression: &str,
        overall_parameters: &[(&str, f64)],
        per_term_parameters: &[&str],
        backend: Backend,
    ) -> Result<Self> {
        if num_args == 0 {
            return Err(Error::NoArguments);
        }
        let num_particles = (num_args + 2) / 3;
        let mut force = CompoundForce::new(num_particles, expression);
        for &(name, default_value) in overall_parameters {
            force.add_global_parameter(name, default_value)?;
        }
        for &name in per_term_parameters {
            force.add_group_parameter(name)?;
        }
        let evaluator = Evaluator::new(num_args, force, backend)?;
        Ok(Self {
            num_args,
            expression: expression.to_string(),
            overall_parameters: overall_parameters
                .iter()
                .map(|&(name, value)| (name.to_string(), value))
                .collect(),
            per_term_parameters: per_term_parameters
                .iter()
                .map(|&name| name.to_string())
                .collect(),
            backend,
            evaluator,
        })
    }

    pub fn num_arguments(&self) -> usize {
        self.num_args
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The declared overall parameters with their default values, in
    /// declaration order. For live values see [`Summation::parameter`].
    pub fn overall_parameters(&self) -> &[(String, f64)] {
        &self.overall_parameters
    }

    pub fn per_term_parameters(&self) -> &[String] {
        &self.per_term_parameters
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// The value of the sum at the given arguments.
    pub fn evaluate(&mut self, arguments: &[f64]) -> Result<f64> {
        self.check_arguments(arguments)?;
        self.evaluator.evaluate(arguments)
    }

    /// The first partial derivative with respect to argument `which`.
    pub fn evaluate_derivative(&mut self, arguments: &[f64], which: usize) -> Result<f64> {
        self.check_arguments(arguments)?;
        if which >= self.num_args {
            return Err(Error::IndexOutOfRange {
                what: "argument",
                index: which,
                count: self.num_args,
            });
        }
        Ok(self.evaluator.evaluate_derivatives(arguments)?[which])
    }

    /// Derivative entry point taking a per-argument order vector: exactly
    /// one entry must be 1 and the rest 0, selecting the argument to
    /// differentiate against. Anything else (a higher order, several
    /// entries, or none at all) is an invalid-derivative-order error;
    /// only first derivatives exist here.
    pub fn evaluate_derivative_by_order(
        &mut self,
        arguments: &[f64],
        order: &[u32],
    ) -> Result<f64> {
        self.check_arguments(arguments)?;
        if order.len() != self.num_args {
            return Err(Error::Schema {
                what: "derivative orders",
                expected: self.num_args,
                got: order.len(),
            });
        }
        let mut which = None;
        let mut total = 0u32;
        for (index, &entry) in order.iter().enumerate() {
            total = total.saturating_add(entry);
            if total > 1 {
                return Err(Error::InvalidDerivativeOrder(
                    "orders sum past 1; only single first derivatives are supported".to_string(),
                ));
            }
            if entry == 1 {
                which = Some(index);
            }
        }
        let which = which.ok_or_else(|| {
            Error::InvalidDerivativeOrder("no argument selected for differentiation".to_string())
        })?;
        Ok(self.evaluator.evaluate_derivatives(arguments)?[which])
    }

    /// Appends a term and returns its index. Terms are append-only; the
    /// index is stable for the summation's lifetime.
    pub fn add_term(&mut self, values: &[f64]) -> Result<usize> {
        self.evaluator.add_term(values)
    }

    pub fn num_terms(&self) -> usize {
        self.evaluator.num_terms()
    }

    /// The per-term parameter values of one term.
    pub fn term(&self, index: usize) -> Result<Vec<f64>> {
        self.evaluator.term(index)
    }

    /// Replaces a term's parameter values in place.
    pub fn set_term(&mut self, index: usize, values: &[f64]) -> Result<()> {
        self.evaluator.set_term(index, values)
    }

    /// The live value of an overall parameter.
    pub fn parameter(&self, name: &str) -> Result<f64> {
        self.evaluator.parameter(name)
    }

    /// Sets the live value of an overall parameter. The declared default
    /// reported by [`Summation::overall_parameters`] is untouched.
    pub fn set_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        self.evaluator.set_parameter(name, value)
    }

    /// A deep, fully independent duplicate: same schema and backend, the
    /// same terms by value, and the source's *live* overall-parameter
    /// values (not its declared defaults).
    pub fn try_clone(&self) -> Result<Self> {
        let overall: Vec<(&str, f64)> = self
            .overall_parameters
            .iter()
            .map(|(name, value)| (name.as_str(), *value))
            .collect();
        let per_term: Vec<&str> = self
            .per_term_parameters
            .iter()
            .map(String::as_str)
            .collect();
        let mut copy = Summation::new(
            self.num_args,
            &self.expression,
            &overall,
            &per_term,
            self.backend,
        )?;
        for index in 0..self.num_terms() {
            copy.add_term(&self.term(index)?)?;
        }
        for (name, _) in &self.overall_parameters {
            copy.set_parameter(name, self.parameter(name)?)?;
        }
        Ok(copy)
    }

    /// A serializable description of this summation: schema, terms, and
    /// live parameter values. [`Summation::from_definition`] rebuilds an
    /// equivalent object.
    pub fn definition(&self) -> Result<Definition> {
        let terms = (0..self.num_terms())
            .map(|index| self.term(index))
            .collect::<Result<Vec<_>>>()?;
        let parameter_values = self
            .overall_parameters
            .iter()
            .map(|(name, _)| Ok((name.clone(), self.parameter(name)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Definition {
            num_arguments: self.num_args,
            expression: self.expression.clone(),
            overall_parameters: self.overall_parameters.clone(),
            per_term_parameters: self.per_term_parameters.clone(),
            terms,
            parameter_values,
        })
    }

    pub fn from_definition(definition: &Definition, backend: Backend) -> Result<Self> {
        let overall: Vec<(&str, f64)> = definition
            .overall_parameters
            .iter()
            .map(|(name, value)| (name.as_str(), *value))
            .collect();
        let per_term: Vec<&str> = definition
            .per_term_parameters
            .iter()
            .map(String::as_str)
            .collect();
        let mut summation = Summation::new(
            definition.num_arguments,
            &definition.expression,
            &overall,
            &per_term,
            backend,
        )?;
        for term in &definition.terms {
            summation.add_term(term)?;
        }
        for (name, value) in &definition.parameter_values {
            summation.set_parameter(name, *value)?;
        }
        Ok(summation)
    }

    /// How many times the private context actually recomputed the energy;
    /// lets callers confirm that repeated evaluations at one point are
    /// served from the cache.
    pub fn energy_evaluation_count(&self) -> u64 {
        self.evaluator.context().energy_evaluation_count()
    }

    fn check_arguments(&self, arguments: &[f64]) -> Result<()> {
        if arguments.len() != self.num_args {
            return Err(Error::Schema {
                what: "arguments",
                expected: self.num_args,
                got: arguments.len(),
            });
        }
        Ok(())
    }
}

/// The persistent description of a [`Summation`], minus the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub num_arguments: usize,
    pub expression: String,
    pub overall_parameters: Vec<(String, f64)>,
    pub per_term_parameters: Vec<String>,
    pub terms: Vec<Vec<f64>>,
    pub parameter_values: Vec<(String, f64)>,
}
