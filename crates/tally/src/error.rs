use tally_core::error::EngineError;
use thiserror::Error;

/// Failures of the summation contract. Every failure is immediate and
/// synchronous; nothing is retried or recovered internally.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A term or argument index outside its valid range.
    #[error("{what} index {index} out of range ({count} defined)")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        count: usize,
    },
    /// A derivative-order vector that does not select exactly one first
    /// derivative. Higher derivatives are unsupported and fail here
    /// rather than returning wrong values.
    #[error("invalid derivative order: {0}")]
    InvalidDerivativeOrder(String),
    /// An overall-parameter name that was never declared.
    #[error("no overall parameter named {0:?}")]
    NoSuchParameter(String),
    /// A vector of the wrong length for the declared schema.
    #[error("expected {expected} {what}, got {got}")]
    Schema {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    /// Summations take at least one argument.
    #[error("a summation requires at least one argument")]
    NoArguments,
    /// A violation detected by the engine's own validation.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub type Result<T> = std::result::Result<T, Error>;
