//! Linear models.

use crate::error::{Result, TabulaError};
use crate::format::{LinearMulticlassSpec, LinearSpec};
use ndarray::prelude::*;

/// Single-output linear model, used for regression and binary classification.
#[derive(Debug, Clone)]
pub struct Linear {
    pub bias: f32,
    pub weights: Array1<f32>,
    pub means: Array1<f32>,
}

impl Linear {
    pub fn from_spec(spec: LinearSpec, n_features: usize) -> Result<Self> {
        if spec.weights.len() != n_features || spec.means.len() != n_features {
            return Err(TabulaError::invalid_model(format!(
                "linear model has {} weights and {} means for {n_features} features",
                spec.weights.len(),
                spec.means.len()
            )));
        }
        if !spec.bias.is_finite() {
            return Err(TabulaError::invalid_model("linear model bias is not finite"));
        }
        Ok(Self {
            bias: spec.bias,
            weights: Array1::from(spec.weights),
            means: Array1::from(spec.means),
        })
    }

    /// Raw output for every row of `features`.
    pub fn predict(&self, features: ArrayView2<f32>) -> Array1<f32> {
        features.dot(&self.weights) + self.bias
    }

    /// Per-feature contributions of one row followed by the baseline.
    pub fn contributions(&self, example: ArrayView1<f32>) -> Vec<f32> {
        contributions(example, self.weights.view(), self.means.view(), self.bias)
    }
}

/// Multi-output linear model with one output per class.
#[derive(Debug, Clone)]
pub struct LinearMulticlass {
    pub biases: Array1<f32>,
    /// `n_features x n_classes`.
    pub weights: Array2<f32>,
    pub means: Array1<f32>,
}

impl LinearMulticlass {
    pub fn from_spec(spec: LinearMulticlassSpec, n_features: usize, n_classes: usize) -> Result<Self> {
        if spec.biases.len() != n_classes {
            return Err(TabulaError::invalid_model(format!(
                "linear model has {} biases for {n_classes} classes",
                spec.biases.len()
            )));
        }
        if spec.means.len() != n_features {
            return Err(TabulaError::invalid_model(format!(
                "linear model has {} means for {n_features} features",
                spec.means.len()
            )));
        }
        let weights = Array2::from_shape_vec((n_features, n_classes), spec.weights).map_err(|_| {
            TabulaError::invalid_model(format!(
                "linear model weights do not form a {n_features} x {n_classes} matrix"
            ))
        })?;
        Ok(Self {
            biases: Array1::from(spec.biases),
            weights,
            means: Array1::from(spec.means),
        })
    }

    /// Raw per-class outputs, `n_rows x n_classes`.
    pub fn predict(&self, features: ArrayView2<f32>) -> Array2<f32> {
        features.dot(&self.weights) + &self.biases
    }

    pub fn contributions(&self, example: ArrayView1<f32>, class_index: usize) -> Vec<f32> {
        contributions(
            example,
            self.weights.column(class_index),
            self.means.view(),
            self.biases[class_index],
        )
    }
}

/// `w_i * (x_i - mean_i)` per feature, then `bias + w . mean` as the baseline.
fn contributions(
    example: ArrayView1<f32>,
    weights: ArrayView1<f32>,
    means: ArrayView1<f32>,
    bias: f32,
) -> Vec<f32> {
    let mut values: Vec<f32> = example
        .iter()
        .zip(weights.iter().zip(means.iter()))
        .map(|(x, (w, mean))| w * (x - mean))
        .collect();
    values.push(bias + weights.dot(&means));
    values
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Numerically stable softmax over each row, in place.
pub fn softmax(mut logits: ArrayViewMut2<f32>) {
    for mut row in logits.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear() -> Linear {
        Linear::from_spec(
            LinearSpec {
                bias: 1.0,
                weights: vec![2.0, -1.0],
                means: vec![0.5, 1.0],
            },
            2,
        )
        .unwrap()
    }

    #[test]
    fn test_linear_predict() {
        let outputs = linear().predict(array![[1.0, 1.0], [0.0, 3.0]].view());
        assert_eq!(outputs.to_vec(), vec![2.0, -2.0]);
    }

    #[test]
    fn test_linear_contributions_sum_to_output() {
        let model = linear();
        let example = array![1.0, 1.0];
        let values = model.contributions(example.view());
        assert_eq!(values, vec![1.0, 0.0, 1.0]);
        let total: f32 = values.iter().sum();
        assert_eq!(total, model.predict(example.insert_axis(Axis(0)).view())[0]);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let spec = LinearSpec {
            bias: 0.0,
            weights: vec![1.0],
            means: vec![0.0],
        };
        assert!(Linear::from_spec(spec, 2).is_err());
        let spec = LinearMulticlassSpec {
            biases: vec![0.0, 0.0],
            weights: vec![1.0, 2.0, 3.0],
            means: vec![0.0, 0.0],
        };
        assert!(LinearMulticlass::from_spec(spec, 2, 2).is_err());
    }

    #[test]
    fn test_multiclass_predict() {
        let model = LinearMulticlass::from_spec(
            LinearMulticlassSpec {
                biases: vec![0.0, 1.0],
                weights: vec![1.0, 0.0, 0.0, 1.0],
                means: vec![0.0, 0.0],
            },
            2,
            2,
        )
        .unwrap();
        let logits = model.predict(array![[3.0, 4.0]].view());
        assert_eq!(logits.row(0).to_vec(), vec![3.0, 5.0]);
        assert_eq!(model.contributions(array![3.0, 4.0].view(), 1), vec![0.0, 4.0, 1.0]);
    }

    #[test]
    fn test_softmax_is_stable() {
        let mut logits = array![[1000.0, 1000.0], [0.0, f32::ln(3.0)]];
        softmax(logits.view_mut());
        assert_eq!(logits.row(0).to_vec(), vec![0.5, 0.5]);
        assert!((logits[[1, 1]] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_sigmoid() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(20.0) > 0.999);
        assert!(sigmoid(-20.0) < 0.001);
    }
}
