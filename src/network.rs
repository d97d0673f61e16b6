use ndarray::{Array2, ArrayViewMut2, Axis};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use tracing::debug;

use crate::activation::Activation;
use crate::config::NetworkConfig;
use crate::error::{NetworkError, Result};
use crate::gradients::{Gradients, LayerGradients};
use crate::loss::{argmax_columns, cross_entropy, softmax};

/// Weight matrix and bias column of one layer.
///
/// `weight` has shape `(fan_out, fan_in)` and `bias` has shape `(fan_out, 1)`.
/// Both are fixed at initialization; outside the crate they can only be
/// mutated through views, which cannot change the shape.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerParams {
    pub(crate) weight: Array2<f64>,
    pub(crate) bias: Array2<f64>,
}

impl LayerParams {
    /// Random normal weights scaled by `scale`, zero bias
    fn init<R: Rng>(fan_in: usize, fan_out: usize, scale: f64, rng: &mut R) -> Self {
        let weight = Array2::from_shape_fn((fan_out, fan_in), |_| {
            let z: f64 = StandardNormal.sample(rng);
            z * scale
        });

        LayerParams {
            weight,
            bias: Array2::zeros((fan_out, 1)),
        }
    }

    pub fn weight(&self) -> &Array2<f64> {
        &self.weight
    }

    pub fn bias(&self) -> &Array2<f64> {
        &self.bias
    }

    pub fn fan_in(&self) -> usize {
        self.weight.ncols()
    }

    pub fn fan_out(&self) -> usize {
        self.weight.nrows()
    }

    pub fn len(&self) -> usize {
        self.weight.len() + self.bias.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Intermediate values of one forward pass, consumed by [`FeedforwardNetwork::backward`]
#[derive(Debug, Clone)]
pub struct ForwardCache {
    pre_activations: Vec<Array2<f64>>,
    activations: Vec<Array2<f64>>,
}

impl ForwardCache {
    /// `A_l` for layer `l` (1-based)
    pub fn pre_activation(&self, l: usize) -> Option<&Array2<f64>> {
        l.checked_sub(1).and_then(|i| self.pre_activations.get(i))
    }

    /// `H_l` for layer `l` (1-based); the last one holds the softmax output
    pub fn activation(&self, l: usize) -> Option<&Array2<f64>> {
        l.checked_sub(1).and_then(|i| self.activations.get(i))
    }

    pub fn output(&self) -> Option<&Array2<f64>> {
        self.activations.last()
    }

    pub fn len(&self) -> usize {
        self.activations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activations.is_empty()
    }
}

/// Fully-connected classifier: hidden layers share one activation, the output
/// layer is always softmax.
#[derive(Debug, Clone)]
pub struct FeedforwardNetwork {
    layer_sizes: Vec<usize>,
    activation: Activation,
    params: Vec<LayerParams>,
}

impl FeedforwardNetwork {
    /// Build a network with weights drawn from the thread-local RNG
    pub fn new(layer_sizes: &[usize], activation: &str) -> Result<Self> {
        Self::with_rng(layer_sizes, activation, &mut rand::rng())
    }

    /// Build a network drawing initial weights from `rng`.
    ///
    /// The activation name and topology are validated before anything is
    /// allocated.
    pub fn with_rng<R: Rng>(layer_sizes: &[usize], activation: &str, rng: &mut R) -> Result<Self> {
        let activation: Activation = activation.parse()?;
        validate_topology(layer_sizes)?;

        let params: Vec<LayerParams> = layer_sizes
            .windows(2)
            .map(|pair| {
                let (fan_in, fan_out) = (pair[0], pair[1]);
                LayerParams::init(fan_in, fan_out, activation.init_scale(fan_in), rng)
            })
            .collect();

        let network = FeedforwardNetwork {
            layer_sizes: layer_sizes.to_vec(),
            activation,
            params,
        };
        debug!(
            "Initialized network {} with {} parameters",
            network.describe(),
            network.num_parameters()
        );

        Ok(network)
    }

    pub fn from_config(config: &NetworkConfig) -> Result<Self> {
        Self::new(&config.layers, &config.activation)
    }

    pub fn layer_sizes(&self) -> &[usize] {
        &self.layer_sizes
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Number of weight/bias layers, `L`
    pub fn num_layers(&self) -> usize {
        self.params.len()
    }

    /// Parameters in layer order; index 0 holds `W_1`/`b_1`
    pub fn parameters(&self) -> &[LayerParams] {
        &self.params
    }

    /// Parameters of layer `l` (1-based)
    pub fn layer(&self, l: usize) -> Option<&LayerParams> {
        l.checked_sub(1).and_then(|i| self.params.get(i))
    }

    /// Mutable view of `W_l` (1-based)
    pub fn weight_mut(&mut self, l: usize) -> Option<ArrayViewMut2<'_, f64>> {
        l.checked_sub(1)
            .and_then(|i| self.params.get_mut(i))
            .map(|p| p.weight.view_mut())
    }

    /// Mutable view of `b_l` (1-based)
    pub fn bias_mut(&mut self, l: usize) -> Option<ArrayViewMut2<'_, f64>> {
        l.checked_sub(1)
            .and_then(|i| self.params.get_mut(i))
            .map(|p| p.bias.view_mut())
    }

    pub(crate) fn params_mut(&mut self) -> &mut [LayerParams] {
        &mut self.params
    }

    pub fn num_parameters(&self) -> usize {
        self.params.iter().map(LayerParams::len).sum()
    }

    /// Architecture summary, e.g. `2 -> 3 (relu) -> 2 (softmax)`
    pub fn describe(&self) -> String {
        let last = self.layer_sizes.len() - 1;
        self.layer_sizes
            .iter()
            .enumerate()
            .map(|(i, size)| match i {
                0 => size.to_string(),
                i if i == last => format!("{} (softmax)", size),
                _ => format!("{} ({})", size, self.activation),
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Forward pass over a batch with one example per column.
    ///
    /// Returns the class probabilities `H_L` together with the cache needed by
    /// [`backward`](Self::backward).
    pub fn forward(&self, input: &Array2<f64>) -> Result<(Array2<f64>, ForwardCache)> {
        self.check_input(input)?;

        let depth = self.params.len();
        let mut pre_activations = Vec::with_capacity(depth);
        let mut activations: Vec<Array2<f64>> = Vec::with_capacity(depth);

        for (i, layer) in self.params.iter().enumerate() {
            let prev = activations.last().unwrap_or(input);
            let pre = layer.weight.dot(prev) + &layer.bias;
            let post = if i + 1 == depth {
                softmax(&pre)
            } else {
                self.activation.activate(&pre)
            };
            pre_activations.push(pre);
            activations.push(post);
        }

        let output = activations[depth - 1].clone();
        let cache = ForwardCache {
            pre_activations,
            activations,
        };

        Ok((output, cache))
    }

    /// Predicted class index for each column of `input`
    pub fn predict(&self, input: &Array2<f64>) -> Result<Vec<usize>> {
        let (output, _) = self.forward(input)?;
        Ok(argmax_columns(&output))
    }

    /// Cross-entropy of the current parameters on one batch
    pub fn loss(&self, input: &Array2<f64>, labels: &Array2<f64>) -> Result<f64> {
        let (output, _) = self.forward(input)?;
        cross_entropy(labels, &output)
    }

    /// Backward pass for softmax + cross-entropy.
    ///
    /// `input` must be the batch passed to the `forward` call that produced
    /// `cache`. `labels` is reshaped to the output shape if it holds the same
    /// number of elements.
    pub fn backward(
        &self,
        input: &Array2<f64>,
        labels: &Array2<f64>,
        cache: &ForwardCache,
    ) -> Result<Gradients> {
        self.check_input(input)?;
        self.check_cache(cache, input.ncols())?;

        let depth = self.params.len();
        let output = &cache.activations[depth - 1];
        let labels = labels
            .to_shape(output.dim())
            .map_err(|_| NetworkError::shape("backward labels", output.dim(), labels.dim()))?;

        let scale = 1.0 / input.ncols() as f64;
        let mut grads = Vec::with_capacity(depth);

        // Softmax and cross-entropy derivatives cancel to H_L - Y
        let mut delta = output - &labels;

        for i in (0..depth).rev() {
            let prev = if i == 0 {
                input
            } else {
                &cache.activations[i - 1]
            };

            let weight = delta.dot(&prev.t()) * scale;
            let bias = delta.sum_axis(Axis(1)).insert_axis(Axis(1)) * scale;

            if i > 0 {
                let upstream = self.params[i].weight.t().dot(&delta);
                delta = self.activation.derivative(&cache.pre_activations[i - 1]) * &upstream;
            }

            grads.push(LayerGradients { weight, bias });
        }

        grads.reverse();
        Ok(Gradients::new(grads))
    }

    fn check_input(&self, input: &Array2<f64>) -> Result<()> {
        let expected_rows = self.layer_sizes[0];
        if input.nrows() != expected_rows {
            return Err(NetworkError::shape(
                "network input",
                (expected_rows, input.ncols()),
                input.dim(),
            ));
        }
        if input.ncols() == 0 {
            return Err(NetworkError::EmptyBatch);
        }
        Ok(())
    }

    fn check_cache(&self, cache: &ForwardCache, batch_size: usize) -> Result<()> {
        let depth = self.params.len();
        if cache.pre_activations.len() != depth || cache.activations.len() != depth {
            return Err(NetworkError::shape(
                "forward cache depth",
                (depth, depth),
                (cache.pre_activations.len(), cache.activations.len()),
            ));
        }

        for (i, (pre, post)) in cache
            .pre_activations
            .iter()
            .zip(&cache.activations)
            .enumerate()
        {
            let expected = (self.layer_sizes[i + 1], batch_size);
            if pre.dim() != expected {
                return Err(NetworkError::shape("forward cache", expected, pre.dim()));
            }
            if post.dim() != expected {
                return Err(NetworkError::shape("forward cache", expected, post.dim()));
            }
        }
        Ok(())
    }

    /// Ensure `grads` has one pair per layer, each shaped like its parameter
    pub(crate) fn check_gradients(&self, grads: &Gradients) -> Result<()> {
        if grads.len() != self.params.len() {
            return Err(NetworkError::shape(
                "gradient layers",
                (self.params.len(), 2),
                (grads.len(), 2),
            ));
        }
        for (params, g) in self.params.iter().zip(grads.layers()) {
            if g.weight.dim() != params.weight.dim() {
                return Err(NetworkError::shape(
                    "weight gradient",
                    params.weight.dim(),
                    g.weight.dim(),
                ));
            }
            if g.bias.dim() != params.bias.dim() {
                return Err(NetworkError::shape(
                    "bias gradient",
                    params.bias.dim(),
                    g.bias.dim(),
                ));
            }
        }
        Ok(())
    }
}

fn validate_topology(layer_sizes: &[usize]) -> Result<()> {
    if layer_sizes.len() < 2 {
        return Err(NetworkError::InvalidTopology(format!(
            "need an input and an output layer, got {} layer size(s)",
            layer_sizes.len()
        )));
    }
    if let Some(pos) = layer_sizes.iter().position(|&size| size == 0) {
        return Err(NetworkError::InvalidTopology(format!(
            "layer {} has zero units",
            pos
        )));
    }
    Ok(())
}
