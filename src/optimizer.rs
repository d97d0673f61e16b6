//! Parameter update rules.
//!
//! Each rule is a plain value holding its hyperparameters. The per-parameter
//! history it needs (velocity, squared-gradient accumulators, moment
//! estimates) lives in an [`OptimizerState`] that the caller creates once and
//! passes to every [`UpdateRule::update`] call.
//!
//! ```text
//! SGD:       p -= lr * g
//! Momentum:  v = mu * v + lr * g;               p -= v
//! Adagrad:   r += g^2;                          p -= lr * g / (sqrt(r) + eps)
//! RMSprop:   v = beta * v + (1 - beta) * g^2;   p -= lr * g / (sqrt(v) + eps)
//! Adam:      m = b1 * m + (1 - b1) * g
//!            v = b2 * v + (1 - b2) * g^2
//!            p -= lr * m_hat / (sqrt(v_hat) + eps),  m_hat = m / (1 - b1^t), v_hat = v / (1 - b2^t)
//! ```

use itertools::izip;
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::EPSILON;
use crate::error::{NetworkError, Result};
use crate::gradients::Gradients;
use crate::network::FeedforwardNetwork;

pub trait UpdateRule {
    /// Auxiliary state kept for a single parameter tensor
    type Slot;

    fn name(&self) -> &'static str;

    /// Zero-initialized slot for a tensor of the given shape
    fn zero_slot(&self, shape: (usize, usize)) -> Self::Slot;

    /// Update one tensor in place. `step` counts updates from 1.
    fn apply(&self, param: &mut Array2<f64>, grad: &Array2<f64>, slot: &mut Self::Slot, step: usize);

    /// Apply the rule to every weight and bias of `network`.
    ///
    /// Gradients and state are validated against the network first, so a
    /// mismatch leaves the parameters untouched.
    fn update(
        &self,
        network: &mut FeedforwardNetwork,
        grads: &Gradients,
        state: &mut OptimizerState<Self::Slot>,
    ) -> Result<()> {
        network.check_gradients(grads)?;
        state.check(network)?;

        state.step += 1;
        let step = state.step;

        for (params, g, weight_slot, bias_slot) in izip!(
            network.params_mut(),
            grads.layers(),
            state.weights.iter_mut(),
            state.biases.iter_mut()
        ) {
            self.apply(&mut params.weight, &g.weight, weight_slot, step);
            self.apply(&mut params.bias, &g.bias, bias_slot, step);
        }

        trace!("{} update, step {}", self.name(), step);
        Ok(())
    }
}

/// Caller-owned history for one update rule on one network
#[derive(Debug, Clone)]
pub struct OptimizerState<S> {
    weights: Vec<S>,
    biases: Vec<S>,
    shapes: Vec<((usize, usize), (usize, usize))>,
    step: usize,
}

impl<S> OptimizerState<S> {
    /// Zeroed slots shaped like every parameter of `network`
    pub fn new<R>(rule: &R, network: &FeedforwardNetwork) -> Self
    where
        R: UpdateRule<Slot = S> + ?Sized,
    {
        let shapes: Vec<_> = network
            .parameters()
            .iter()
            .map(|p| (p.weight().dim(), p.bias().dim()))
            .collect();
        debug!(
            "Allocated {} optimizer state for {} layers",
            rule.name(),
            shapes.len()
        );

        OptimizerState {
            weights: shapes.iter().map(|(w, _)| rule.zero_slot(*w)).collect(),
            biases: shapes.iter().map(|(_, b)| rule.zero_slot(*b)).collect(),
            shapes,
            step: 0,
        }
    }

    /// Number of updates applied so far
    pub fn step(&self) -> usize {
        self.step
    }

    /// Slot of `W_l` (1-based)
    pub fn weight_slot(&self, l: usize) -> Option<&S> {
        l.checked_sub(1).and_then(|i| self.weights.get(i))
    }

    /// Slot of `b_l` (1-based)
    pub fn bias_slot(&self, l: usize) -> Option<&S> {
        l.checked_sub(1).and_then(|i| self.biases.get(i))
    }

    /// Zero every slot and restart the step count
    pub fn reset<R>(&mut self, rule: &R)
    where
        R: UpdateRule<Slot = S> + ?Sized,
    {
        self.weights = self.shapes.iter().map(|(w, _)| rule.zero_slot(*w)).collect();
        self.biases = self.shapes.iter().map(|(_, b)| rule.zero_slot(*b)).collect();
        self.step = 0;
    }

    fn check(&self, network: &FeedforwardNetwork) -> Result<()> {
        let params = network.parameters();
        if self.shapes.len() != params.len() {
            return Err(NetworkError::shape(
                "optimizer state layers",
                (params.len(), 2),
                (self.shapes.len(), 2),
            ));
        }
        for ((weight_shape, bias_shape), p) in self.shapes.iter().zip(params) {
            if *weight_shape != p.weight().dim() {
                return Err(NetworkError::shape(
                    "optimizer weight state",
                    p.weight().dim(),
                    *weight_shape,
                ));
            }
            if *bias_shape != p.bias().dim() {
                return Err(NetworkError::shape(
                    "optimizer bias state",
                    p.bias().dim(),
                    *bias_shape,
                ));
            }
        }
        Ok(())
    }
}

/// Plain gradient descent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sgd {
    pub learning_rate: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }
}

impl Default for Sgd {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl UpdateRule for Sgd {
    type Slot = ();

    fn name(&self) -> &'static str {
        "sgd"
    }

    fn zero_slot(&self, _shape: (usize, usize)) -> Self::Slot {}

    fn apply(&self, param: &mut Array2<f64>, grad: &Array2<f64>, _slot: &mut (), _step: usize) {
        param.scaled_add(-self.learning_rate, grad);
    }
}

/// Gradient descent with a velocity term.
///
/// The same rule serves Nesterov-style training when the caller evaluates the
/// gradient at the look-ahead point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Momentum {
    pub learning_rate: f64,
    pub momentum: f64,
}

impl Momentum {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            momentum: 0.9,
        }
    }

    pub fn with_momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum;
        self
    }
}

impl Default for Momentum {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl UpdateRule for Momentum {
    type Slot = Array2<f64>;

    fn name(&self) -> &'static str {
        "momentum"
    }

    fn zero_slot(&self, shape: (usize, usize)) -> Self::Slot {
        Array2::zeros(shape)
    }

    fn apply(&self, param: &mut Array2<f64>, grad: &Array2<f64>, velocity: &mut Array2<f64>, _step: usize) {
        velocity.mapv_inplace(|v| v * self.momentum);
        velocity.scaled_add(self.learning_rate, grad);
        *param -= &*velocity;
    }
}

/// Per-coordinate learning rates from the running sum of squared gradients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Adagrad {
    pub learning_rate: f64,
}

impl Adagrad {
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }
}

impl Default for Adagrad {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl UpdateRule for Adagrad {
    type Slot = Array2<f64>;

    fn name(&self) -> &'static str {
        "adagrad"
    }

    fn zero_slot(&self, shape: (usize, usize)) -> Self::Slot {
        Array2::zeros(shape)
    }

    fn apply(&self, param: &mut Array2<f64>, grad: &Array2<f64>, accumulator: &mut Array2<f64>, _step: usize) {
        Zip::from(&mut *accumulator)
            .and(grad)
            .for_each(|r, &g| *r += g * g);

        let lr = self.learning_rate;
        Zip::from(param)
            .and(grad)
            .and(&*accumulator)
            .for_each(|p, &g, &r| *p -= lr * g / (r.sqrt() + EPSILON));
    }
}

/// Adagrad with an exponentially decaying accumulator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RmsProp {
    pub learning_rate: f64,
    pub beta: f64,
}

impl RmsProp {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta: 0.9,
        }
    }

    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }
}

impl Default for RmsProp {
    fn default() -> Self {
        Self::new(0.001)
    }
}

impl UpdateRule for RmsProp {
    type Slot = Array2<f64>;

    fn name(&self) -> &'static str {
        "rmsprop"
    }

    fn zero_slot(&self, shape: (usize, usize)) -> Self::Slot {
        Array2::zeros(shape)
    }

    fn apply(&self, param: &mut Array2<f64>, grad: &Array2<f64>, mean_square: &mut Array2<f64>, _step: usize) {
        let beta = self.beta;
        Zip::from(&mut *mean_square)
            .and(grad)
            .for_each(|v, &g| *v = beta * *v + (1.0 - beta) * g * g);

        let lr = self.learning_rate;
        Zip::from(param)
            .and(grad)
            .and(&*mean_square)
            .for_each(|p, &g, &v| *p -= lr * g / (v.sqrt() + EPSILON));
    }
}

/// First and second moment estimates for one tensor
#[derive(Debug, Clone, PartialEq)]
pub struct AdamSlot {
    pub m: Array2<f64>,
    pub v: Array2<f64>,
}

/// Adam with bias-corrected moment estimates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
        }
    }

    pub fn with_betas(mut self, beta1: f64, beta2: f64) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.001)
    }
}

impl UpdateRule for Adam {
    type Slot = AdamSlot;

    fn name(&self) -> &'static str {
        "adam"
    }

    fn zero_slot(&self, shape: (usize, usize)) -> Self::Slot {
        AdamSlot {
            m: Array2::zeros(shape),
            v: Array2::zeros(shape),
        }
    }

    fn apply(&self, param: &mut Array2<f64>, grad: &Array2<f64>, slot: &mut AdamSlot, step: usize) {
        let (lr, beta1, beta2) = (self.learning_rate, self.beta1, self.beta2);
        let t = step.max(1) as i32;
        let correction1 = 1.0 - beta1.powi(t);
        let correction2 = 1.0 - beta2.powi(t);

        Zip::from(param)
            .and(grad)
            .and(&mut slot.m)
            .and(&mut slot.v)
            .for_each(|p, &g, m, v| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / correction1;
                let v_hat = *v / correction2;
                *p -= lr * m_hat / (v_hat.sqrt() + EPSILON);
            });
    }
}
