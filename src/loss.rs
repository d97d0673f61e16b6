//! Softmax output and cross-entropy loss.
//!
//! Every array here is laid out with one example per column, so a batch of
//! `m` examples over `k` classes has shape `(k, m)`.

use ndarray::Array2;

use crate::EPSILON;
use crate::error::{NetworkError, Result};

/// Column-wise softmax.
///
/// Each column has its own maximum subtracted before exponentiating, so large
/// logits cannot overflow and every column sums to 1.
pub fn softmax(logits: &Array2<f64>) -> Array2<f64> {
    let mut result = logits.clone();

    for mut column in result.columns_mut() {
        let max_val = column.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
        column.mapv_inplace(|v| (v - max_val).exp());
        let sum_exp = column.sum();
        column /= sum_exp;
    }

    result
}

/// Mean cross-entropy over the batch: `-(1/m) * sum(Y * ln(Y_hat + eps))`.
///
/// `labels` may be one-hot or soft, but must match `predictions` in shape.
pub fn cross_entropy(labels: &Array2<f64>, predictions: &Array2<f64>) -> Result<f64> {
    if labels.dim() != predictions.dim() {
        return Err(NetworkError::shape(
            "cross_entropy",
            predictions.dim(),
            labels.dim(),
        ));
    }
    let batch_size = labels.ncols();
    if batch_size == 0 {
        return Err(NetworkError::EmptyBatch);
    }

    let log_probs = predictions.mapv(|p| (p + EPSILON).ln());
    let total = (labels * &log_probs).sum();

    Ok(-total / batch_size as f64)
}

/// Index of the largest entry in each column
pub fn argmax_columns(scores: &Array2<f64>) -> Vec<usize> {
    scores
        .columns()
        .into_iter()
        .map(|column| {
            column
                .iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |(best_idx, best), (i, &v)| {
                    if v > best { (i, v) } else { (best_idx, best) }
                })
                .0
        })
        .collect()
}

/// Fraction of examples whose predicted class matches the label's class
pub fn accuracy(labels: &Array2<f64>, predictions: &Array2<f64>) -> Result<f64> {
    if labels.dim() != predictions.dim() {
        return Err(NetworkError::shape(
            "accuracy",
            predictions.dim(),
            labels.dim(),
        ));
    }
    let batch_size = labels.ncols();
    if batch_size == 0 {
        return Err(NetworkError::EmptyBatch);
    }

    let correct = argmax_columns(labels)
        .into_iter()
        .zip(argmax_columns(predictions))
        .filter(|(truth, guess)| truth == guess)
        .count();

    Ok(correct as f64 / batch_size as f64)
}
