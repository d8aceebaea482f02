use crate::expr::ExprError;
use thiserror::Error;

/// Failures surfaced by the engine: expression compilation, definition
/// validation, and context operations. All are immediate and synchronous;
/// nothing is retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Expression(#[from] ExprError),
    #[error("duplicate parameter name {0:?}")]
    DuplicateParameter(String),
    #[error("a group expects {expected} particle indices, got {got}")]
    GroupParticleCount { expected: usize, got: usize },
    #[error("particle index {index} out of range for a system of {count} particles")]
    ParticleIndex { index: usize, count: usize },
    #[error("a group expects {expected} parameter values, got {got}")]
    GroupValueCount { expected: usize, got: usize },
    #[error("group index {index} out of range ({count} groups defined)")]
    GroupIndex { index: usize, count: usize },
    #[error("expected {expected} positions, got {got}")]
    PositionCount { expected: usize, got: usize },
    #[error("expected {expected} velocities, got {got}")]
    VelocityCount { expected: usize, got: usize },
    #[error("no global parameter named {0:?}")]
    UnknownParameter(String),
    #[error("the group layout changed; the context must be reinitialized")]
    GroupLayoutChanged,
    #[error("invalid backend property {key:?}: {reason}")]
    InvalidProperty { key: String, reason: String },
}
