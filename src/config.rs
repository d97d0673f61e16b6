//! Serde-backed configuration for networks and training runs.
//!
//! ```json
//! {
//!   "network": { "layers": [2, 3, 2], "activation": "relu" },
//!   "optimizer": { "kind": "adam", "learning_rate": 0.01 },
//!   "steps": 200,
//!   "seed": 7
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, Result};
use crate::optimizer::{Adagrad, Adam, Momentum, RmsProp, Sgd};

/// Topology and hidden-layer activation.
///
/// The activation stays a plain string here so that an unknown name is
/// reported as [`NetworkError::UnsupportedActivation`] when the network is
/// built, not as a parse failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub layers: Vec<usize>,
    pub activation: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            layers: vec![2, 3, 2],
            activation: "relu".to_string(),
        }
    }
}

/// Update rule and its hyperparameters; omitted fields take the rule's defaults
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OptimizerConfig {
    Sgd(Sgd),
    Momentum(Momentum),
    Adagrad(Adagrad),
    Rmsprop(RmsProp),
    Adam(Adam),
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Sgd(Sgd::new(0.1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub network: NetworkConfig,
    pub optimizer: OptimizerConfig,
    pub steps: usize,
    /// Seed for weight initialization; `None` draws from the thread RNG
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            optimizer: OptimizerConfig::default(),
            steps: 100,
            seed: None,
        }
    }
}

impl TrainingConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| NetworkError::InvalidConfig(e.to_string()))
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| NetworkError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&contents)
    }
}
