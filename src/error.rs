//! Error types for network construction and training steps

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, NetworkError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    /// Activation name outside {relu, sigmoid, tanh}
    #[error("Unsupported activation function: {0}")]
    UnsupportedActivation(String),

    /// Layer sizes that cannot describe a network
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    /// Two arrays that must agree in shape do not
    #[error("Shape mismatch in {context}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// A batch with zero examples
    #[error("Batch must contain at least one example")]
    EmptyBatch,

    /// Configuration that could not be read or parsed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl NetworkError {
    pub(crate) fn shape(
        context: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    ) -> Self {
        NetworkError::ShapeMismatch {
            context,
            expected,
            found,
        }
    }
}
