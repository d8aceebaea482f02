use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default central-difference step when none is configured.
pub const DEFAULT_FD_STEP: f64 = 1e-6;

/// How a context turns energies into forces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum GradientMethod {
    /// Forward-mode automatic differentiation: one dual-number pass per
    /// coordinate, exact to machine precision.
    Dual,
    /// Central finite differences of the energy with the given step.
    FiniteDifference { step: f64 },
}

/// Backend selector for a context, constructible from (and readable back
/// as) a string key/value property map.
///
/// Recognized properties: `gradient` (`"dual"` or `"finite_difference"`)
/// and `fd_step` (a positive step, only meaningful with
/// `finite_difference`). Unknown keys are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Backend {
    gradient: GradientMethod,
}

impl Default for Backend {
    fn default() -> Self {
        Self::reference()
    }
}

impl Backend {
    /// The reference backend: dual-number gradients.
    pub fn reference() -> Self {
        Self {
            gradient: GradientMethod::Dual,
        }
    }

    pub fn with_gradient(gradient: GradientMethod) -> Self {
        Self { gradient }
    }

    pub fn gradient(&self) -> GradientMethod {
        self.gradient
    }

    pub fn from_properties(properties: &BTreeMap<String, String>) -> Result<Self, EngineError> {
        let mut gradient = None;
        let mut fd_step = None;

        for (key, value) in properties {
            match key.as_str() {
                "gradient" => match value.as_str() {
                    "dual" => gradient = Some(GradientMethod::Dual),
                    "finite_difference" => {
                        gradient = Some(GradientMethod::FiniteDifference {
                            step: DEFAULT_FD_STEP,
                        })
                    }
                    other => {
                        return Err(EngineError::InvalidProperty {
                            key: key.clone(),
                            reason: format!(
                                "expected \"dual\" or \"finite_difference\", got {other:?}"
                            ),
                        })
                    }
                },
                "fd_step" => {
                    let step: f64 = value.parse().map_err(|_| EngineError::InvalidProperty {
                        key: key.clone(),
                        reason: format!("{value:?} is not a number"),
                    })?;
                    if !step.is_finite() || step <= 0.0 {
                        return Err(EngineError::InvalidProperty {
                            key: key.clone(),
                            reason: "the step must be positive and finite".to_string(),
                        });
                    }
                    fd_step = Some(step);
                }
                other => {
                    return Err(EngineError::InvalidProperty {
                        key: other.to_string(),
                        reason: "unknown property".to_string(),
                    })
                }
            }
        }

        let gradient = match (gradient, fd_step) {
            (Some(GradientMethod::FiniteDifference { .. }), Some(step)) => {
                GradientMethod::FiniteDifference { step }
            }
            (Some(method), None) => method,
            (None, None) => GradientMethod::Dual,
            (_, Some(_)) => {
                return Err(EngineError::InvalidProperty {
                    key: "fd_step".to_string(),
                    reason: "only meaningful with gradient = \"finite_difference\"".to_string(),
                })
            }
        };
        Ok(Self { gradient })
    }

    /// The live property map, suitable for reconstructing an equivalent
    /// backend with [`Backend::from_properties`].
    pub fn properties(&self) -> BTreeMap<String, String> {
        let mut properties = BTreeMap::new();
        match self.gradient {
            GradientMethod::Dual => {
                properties.insert("gradient".to_string(), "dual".to_string());
            }
            GradientMethod::FiniteDifference { step } => {
                properties.insert("gradient".to_string(), "finite_difference".to_string());
                properties.insert("fd_step".to_string(), step.to_string());
            }
        }
        properties
    }
}

#[cfg(test)]
mod tests {
    use super::{Backend, GradientMethod, DEFAULT_FD_STEP};
    use crate::error::EngineError;
    use std::collections::BTreeMap;

    fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_properties_give_the_reference_backend() {
        let backend = Backend::from_properties(&BTreeMap::new()).expect("valid");
        assert_eq!(backend, Backend::reference());
    }

    #[test]
    fn finite_difference_with_and_without_step() {
        let backend =
            Backend::from_properties(&props(&[("gradient", "finite_difference")])).expect("valid");
        assert_eq!(
            backend.gradient(),
            GradientMethod::FiniteDifference {
                step: DEFAULT_FD_STEP
            }
        );

        let backend = Backend::from_properties(&props(&[
            ("gradient", "finite_difference"),
            ("fd_step", "1e-4"),
        ]))
        .expect("valid");
        assert_eq!(
            backend.gradient(),
            GradientMethod::FiniteDifference { step: 1e-4 }
        );
    }

    #[test]
    fn properties_round_trip() {
        let backend = Backend::with_gradient(GradientMethod::FiniteDifference { step: 1e-5 });
        let rebuilt = Backend::from_properties(&backend.properties()).expect("valid");
        assert_eq!(rebuilt, backend);
    }

    #[test]
    fn invalid_properties_are_rejected() {
        assert!(matches!(
            Backend::from_properties(&props(&[("precision", "double")])),
            Err(EngineError::InvalidProperty { .. })
        ));
        assert!(matches!(
            Backend::from_properties(&props(&[("gradient", "symbolic")])),
            Err(EngineError::InvalidProperty { .. })
        ));
        assert!(matches!(
            Backend::from_properties(&props(&[("fd_step", "1e-4")])),
            Err(EngineError::InvalidProperty { .. })
        ));
        assert!(matches!(
            Backend::from_properties(&props(&[
                ("gradient", "finite_difference"),
                ("fd_step", "-1")
            ])),
            Err(EngineError::InvalidProperty { .. })
        ));
    }
}
