//! Elementwise activation functions and their derivatives.
//!
//! The set is closed: a name is resolved into an [`Activation`] once, when the
//! network is built, and every forward/backward call dispatches on the enum.

use std::fmt;
use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::NetworkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// max(0, x)
    Relu,
    /// 1 / (1 + exp(-x))
    Sigmoid,
    /// Hyperbolic tangent
    Tanh,
}

impl Activation {
    /// Apply the activation to every element of `x`
    pub fn activate(&self, x: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Relu => x.mapv(|v| v.max(0.0)),
            Activation::Sigmoid => x.mapv(sigmoid),
            Activation::Tanh => x.mapv(f64::tanh),
        }
    }

    /// Derivative of the activation, evaluated at the pre-activation `x`
    pub fn derivative(&self, x: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Relu => x.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Sigmoid => x.mapv(|v| {
                let s = sigmoid(v);
                s * (1.0 - s)
            }),
            Activation::Tanh => x.mapv(|v| {
                let t = v.tanh();
                1.0 - t * t
            }),
        }
    }

    /// Standard deviation multiplier for a weight matrix with `fan_in` inputs.
    ///
    /// He scaling (`sqrt(2 / fan_in)`) for relu, Xavier normal
    /// (`sqrt(1 / fan_in)`) for the saturating activations.
    pub fn init_scale(&self, fan_in: usize) -> f64 {
        let gain = match self {
            Activation::Relu => 2.0,
            Activation::Sigmoid | Activation::Tanh => 1.0,
        };
        (gain / fan_in as f64).sqrt()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Activation::Relu => "relu",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
        }
    }
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

impl FromStr for Activation {
    type Err = NetworkError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "relu" => Ok(Activation::Relu),
            "sigmoid" => Ok(Activation::Sigmoid),
            "tanh" => Ok(Activation::Tanh),
            other => Err(NetworkError::UnsupportedActivation(other.to_string())),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
