pub mod activation;
pub mod config;
pub mod error;
pub mod gradients;
pub mod loss;
pub mod network;
pub mod optimizer;
// Re-export key types for easier access
pub use activation::Activation;
pub use config::{NetworkConfig, OptimizerConfig, TrainingConfig};
pub use error::{NetworkError, Result};
pub use gradients::{Gradients, LayerGradients};
pub use loss::{accuracy, cross_entropy, softmax};
pub use network::{FeedforwardNetwork, ForwardCache, LayerParams};
pub use optimizer::{Adagrad, Adam, AdamSlot, Momentum, OptimizerState, RmsProp, Sgd, UpdateRule};

// Guards every division and logarithm against zero
pub const EPSILON: f64 = 1e-9;
