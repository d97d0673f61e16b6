use approx::assert_abs_diff_eq;
use ffnn::{
    Adagrad, Adam, FeedforwardNetwork, Gradients, LayerGradients, Momentum, NetworkError,
    OptimizerState, RmsProp, Sgd, UpdateRule,
};
use ndarray::{Array2, array};
use rand::SeedableRng;
use rand::rngs::StdRng;

const LR: f64 = 0.01;
const GRAD: f64 = 0.5;

/// Run `steps` updates of `rule` on the scalar parameter 1.0 under a constant gradient
fn scalar_trajectory<R: UpdateRule>(rule: &R, steps: usize) -> Vec<f64> {
    let mut param = array![[1.0]];
    let grad = array![[GRAD]];
    let mut slot = rule.zero_slot((1, 1));

    (1..=steps)
        .map(|step| {
            rule.apply(&mut param, &grad, &mut slot, step);
            param[[0, 0]]
        })
        .collect()
}

fn first_step<R: UpdateRule>(rule: &R) -> f64 {
    scalar_trajectory(rule, 1)[0] - 1.0
}

#[test]
fn test_first_step_moves_against_gradient() {
    let steps = [
        first_step(&Sgd::new(LR)),
        first_step(&Momentum::new(LR)),
        first_step(&Adagrad::new(LR)),
        first_step(&RmsProp::new(LR)),
        first_step(&Adam::new(LR)),
    ];
    for step in steps {
        assert!(step < 0.0, "step {} does not descend", step);
    }
}

#[test]
fn test_first_step_closed_forms() {
    // Plain and momentum descent: lr * g
    assert_abs_diff_eq!(first_step(&Sgd::new(LR)), -LR * GRAD, epsilon = 1e-12);
    assert_abs_diff_eq!(first_step(&Momentum::new(LR)), -LR * GRAD, epsilon = 1e-12);

    // Adagrad: r = g^2, so the step is lr * g / |g|
    assert_abs_diff_eq!(first_step(&Adagrad::new(LR)), -LR, epsilon = 1e-9);

    // RMSprop: v = (1 - beta) g^2, so the step is lr / sqrt(1 - beta)
    let rms = RmsProp::new(LR).with_beta(0.9);
    assert_abs_diff_eq!(first_step(&rms), -LR / 0.1_f64.sqrt(), epsilon = 1e-9);

    // Adam: bias correction makes m_hat = g and v_hat = g^2
    assert_abs_diff_eq!(first_step(&Adam::new(LR)), -LR, epsilon = 1e-9);
}

#[test]
fn test_first_step_magnitude_ordering() {
    let sgd = first_step(&Sgd::new(LR)).abs();
    let momentum = first_step(&Momentum::new(LR)).abs();
    let adagrad = first_step(&Adagrad::new(LR)).abs();
    let rmsprop = first_step(&RmsProp::new(LR)).abs();
    let adam = first_step(&Adam::new(LR)).abs();

    // With |g| < 1 the normalized rules step further than plain descent
    assert_abs_diff_eq!(sgd, momentum, epsilon = 1e-15);
    assert!(adagrad > sgd);
    assert_abs_diff_eq!(adam, adagrad, epsilon = 1e-9);
    assert!(rmsprop > adam);
}

#[test]
fn test_momentum_accumulates_velocity() {
    let trajectory = scalar_trajectory(&Momentum::new(LR).with_momentum(0.9), 2);
    let v1 = LR * GRAD;
    let v2 = 0.9 * v1 + LR * GRAD;
    assert_abs_diff_eq!(trajectory[0], 1.0 - v1, epsilon = 1e-12);
    assert_abs_diff_eq!(trajectory[1], 1.0 - v1 - v2, epsilon = 1e-12);
}

#[test]
fn test_adagrad_steps_shrink() {
    let trajectory = scalar_trajectory(&Adagrad::new(LR), 2);
    let second_step = trajectory[0] - trajectory[1];
    assert_abs_diff_eq!(second_step, LR * GRAD / (2.0 * GRAD * GRAD).sqrt(), epsilon = 1e-9);
    assert!(second_step < 1.0 - trajectory[0]);
}

#[test]
fn test_adam_constant_gradient_steps_are_uniform() {
    let trajectory = scalar_trajectory(&Adam::new(LR), 5);
    let mut previous = 1.0;
    for value in trajectory {
        assert_abs_diff_eq!(previous - value, LR, epsilon = 1e-8);
        previous = value;
    }
}

#[test]
fn test_zero_gradient_leaves_parameter() {
    let grad = array![[0.0]];

    let mut param = array![[1.5]];
    let rule = Adam::default();
    let mut slot = rule.zero_slot((1, 1));
    rule.apply(&mut param, &grad, &mut slot, 1);
    assert_eq!(param[[0, 0]], 1.5);

    let rule = RmsProp::default();
    let mut slot = rule.zero_slot((1, 1));
    rule.apply(&mut param, &grad, &mut slot, 1);
    assert_eq!(param[[0, 0]], 1.5);
}

fn network_and_gradients() -> (FeedforwardNetwork, Gradients) {
    let mut rng = StdRng::seed_from_u64(17);
    let network = FeedforwardNetwork::with_rng(&[2, 3, 2], "tanh", &mut rng).unwrap();
    let inputs = array![[0.5, -1.0, 1.5], [2.0, 0.0, -0.5]];
    let labels = array![[1.0, 0.0, 1.0], [0.0, 1.0, 0.0]];
    let (_, cache) = network.forward(&inputs).unwrap();
    let grads = network.backward(&inputs, &labels, &cache).unwrap();
    (network, grads)
}

#[test]
fn test_network_update_matches_tensor_rule() {
    let (mut network, grads) = network_and_gradients();
    let before = network.parameters().to_vec();
    let rule = Sgd::new(0.1);
    let mut state = OptimizerState::new(&rule, &network);

    rule.update(&mut network, &grads, &mut state).unwrap();
    assert_eq!(state.step(), 1);

    for ((old, new), g) in before.iter().zip(network.parameters()).zip(grads.layers()) {
        assert_eq!(new.weight(), &(old.weight() - &(&g.weight * 0.1)));
        assert_eq!(new.bias(), &(old.bias() - &(&g.bias * 0.1)));
    }
}

#[test]
fn test_state_slots_follow_parameter_shapes() {
    let (mut network, grads) = network_and_gradients();
    let rule = Adam::default();
    let mut state = OptimizerState::new(&rule, &network);

    for l in 1..=network.num_layers() {
        let params = network.layer(l).unwrap();
        assert_eq!(state.weight_slot(l).unwrap().m.dim(), params.weight().dim());
        assert_eq!(state.bias_slot(l).unwrap().v.dim(), params.bias().dim());
    }

    rule.update(&mut network, &grads, &mut state).unwrap();
    rule.update(&mut network, &grads, &mut state).unwrap();
    assert_eq!(state.step(), 2);
    assert!(state.weight_slot(1).unwrap().v.iter().any(|&v| v > 0.0));

    state.reset(&rule);
    assert_eq!(state.step(), 0);
    assert!(state.weight_slot(1).unwrap().v.iter().all(|&v| v == 0.0));
}

#[test]
fn test_update_rejects_mismatched_gradients() {
    let (mut network, _) = network_and_gradients();
    let before = network.parameters().to_vec();
    let rule = Momentum::default();
    let mut state = OptimizerState::new(&rule, &network);

    let missing = Gradients::new(Vec::new());
    assert!(matches!(
        rule.update(&mut network, &missing, &mut state),
        Err(NetworkError::ShapeMismatch { context: "gradient layers", .. })
    ));

    let wrong_shape = Gradients::new(vec![
        LayerGradients {
            weight: Array2::zeros((3, 2)),
            bias: Array2::zeros((3, 1)),
        },
        LayerGradients {
            weight: Array2::zeros((3, 2)),
            bias: Array2::zeros((2, 1)),
        },
    ]);
    assert_eq!(
        rule.update(&mut network, &wrong_shape, &mut state).unwrap_err(),
        NetworkError::ShapeMismatch {
            context: "weight gradient",
            expected: (2, 3),
            found: (3, 2),
        }
    );

    assert_eq!(network.parameters(), before.as_slice());
    assert_eq!(state.step(), 0);
}

#[test]
fn test_update_rejects_state_from_other_network() {
    let (mut network, grads) = network_and_gradients();
    let other = FeedforwardNetwork::new(&[2, 4, 2], "tanh").unwrap();
    let rule = RmsProp::default();
    let mut state = OptimizerState::new(&rule, &other);

    assert!(matches!(
        rule.update(&mut network, &grads, &mut state),
        Err(NetworkError::ShapeMismatch { context: "optimizer weight state", .. })
    ));
}
