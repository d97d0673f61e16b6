//! Gradient map produced by one backward pass.
//!
//! Gradients are stored per layer in network order, so `layers()[0]` holds
//! `dW_1`/`db_1` and the last entry belongs to the output layer.

use ndarray::Array2;

/// Loss gradients for one layer's weight matrix and bias column
#[derive(Debug, Clone, PartialEq)]
pub struct LayerGradients {
    pub weight: Array2<f64>,
    pub bias: Array2<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    layers: Vec<LayerGradients>,
}

impl Gradients {
    pub fn new(layers: Vec<LayerGradients>) -> Self {
        Gradients { layers }
    }

    pub fn layers(&self) -> &[LayerGradients] {
        &self.layers
    }

    /// Gradients of layer `l`, counted from 1 like `W_l`
    pub fn layer(&self, l: usize) -> Option<&LayerGradients> {
        l.checked_sub(1).and_then(|i| self.layers.get(i))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// L2 norm across every weight and bias gradient
    pub fn global_norm(&self) -> f64 {
        self.layers
            .iter()
            .map(|g| {
                g.weight.iter().map(|v| v * v).sum::<f64>()
                    + g.bias.iter().map(|v| v * v).sum::<f64>()
            })
            .sum::<f64>()
            .sqrt()
    }
}
