use std::env;
use std::process::ExitCode;

use ffnn::{
    FeedforwardNetwork, OptimizerConfig, OptimizerState, Result, TrainingConfig, UpdateRule,
    accuracy, cross_entropy,
};
use ndarray::{Array2, array};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Optional JSON config path; defaults to the [2, 3, 2] relu network with SGD
    let config = match env::args().nth(1) {
        Some(path) => TrainingConfig::from_json_file(path)?,
        None => TrainingConfig::default(),
    };

    let mut network = match config.seed {
        Some(seed) => FeedforwardNetwork::with_rng(
            &config.network.layers,
            &config.network.activation,
            &mut StdRng::seed_from_u64(seed),
        )?,
        None => FeedforwardNetwork::from_config(&config.network)?,
    };

    info!("=== MODEL INFORMATION ===");
    info!("Network architecture: {}", network.describe());
    info!("Total parameters: {}", network.num_parameters());

    let (inputs, labels) = toy_batch();

    match config.optimizer {
        OptimizerConfig::Sgd(rule) => train(&mut network, &rule, &inputs, &labels, config.steps),
        OptimizerConfig::Momentum(rule) => train(&mut network, &rule, &inputs, &labels, config.steps),
        OptimizerConfig::Adagrad(rule) => train(&mut network, &rule, &inputs, &labels, config.steps),
        OptimizerConfig::Rmsprop(rule) => train(&mut network, &rule, &inputs, &labels, config.steps),
        OptimizerConfig::Adam(rule) => train(&mut network, &rule, &inputs, &labels, config.steps),
    }
}

/// Four linearly separable points in two classes, one example per column
fn toy_batch() -> (Array2<f64>, Array2<f64>) {
    let inputs = array![[1.0, 2.0, -1.0, -2.0], [1.0, 1.0, -1.0, -1.0]];
    let labels = array![[1.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 1.0]];
    (inputs, labels)
}

fn train<R: UpdateRule>(
    network: &mut FeedforwardNetwork,
    rule: &R,
    inputs: &Array2<f64>,
    labels: &Array2<f64>,
    steps: usize,
) -> Result<()> {
    info!("=== TRAINING ({}, {} steps) ===", rule.name(), steps);

    let mut state = OptimizerState::new(rule, network);

    for step in 1..=steps {
        let (output, cache) = network.forward(inputs)?;
        let loss = cross_entropy(labels, &output)?;
        let grads = network.backward(inputs, labels, &cache)?;
        rule.update(network, &grads, &mut state)?;

        if step == 1 || step % 10 == 0 {
            info!(
                "Step {}/{}: loss = {:.6}, grad norm = {:.6}",
                step,
                steps,
                loss,
                grads.global_norm()
            );
        }
    }

    let (output, _) = network.forward(inputs)?;
    info!(
        "Final loss = {:.6}, accuracy = {:.1}%",
        cross_entropy(labels, &output)?,
        accuracy(labels, &output)? * 100.0
    );
    info!("Predictions: {:?}", network.predict(inputs)?);

    Ok(())
}
