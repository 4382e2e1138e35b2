//! Toy quadratic regression model: pred = x·w1 + xᵀ W2 x / 10.

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use super::adam::{Adam, AdamConfig, AdamSlot};
use super::{Evaluation, TaskModel, TrainOutput};
use crate::data::Batch;
use crate::error::{LossCtlError, Result};
use crate::rl::config::TaskConfig;
use crate::rl::core::LossAction;

/// The second-order term is damped so training converges
const SECOND_ORDER_SCALE: f64 = 10.0;

const W1_INIT_STD: f64 = 0.1;
const W2_INIT_STD: f64 = 0.01;

/// Trainable parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadraticWeights {
    /// Shape [dim]
    pub w1: Array1<f64>,
    /// Shape [dim, dim]
    pub w2: Array2<f64>,
}

impl QuadraticWeights {
    /// Gaussian initialization, identical for identical seeds
    pub fn init(dim: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let w1 = Array1::from_shape_fn(dim, |_| {
            W1_INIT_STD * rng.sample::<f64, _>(StandardNormal)
        });
        let w2 = Array2::from_shape_fn((dim, dim), |_| {
            W2_INIT_STD * rng.sample::<f64, _>(StandardNormal)
        });
        Self { w1, w2 }
    }

    pub fn dim(&self) -> usize {
        self.w1.len()
    }

    fn num_params(&self) -> usize {
        self.w1.len() + self.w2.len()
    }

    /// Mean absolute value over every element
    fn mean_abs(&self) -> f64 {
        let total: f64 = self.w1.iter().chain(self.w2.iter()).map(|g| g.abs()).sum();
        total / self.num_params().max(1) as f64
    }

    fn abs_sum(&self) -> f64 {
        self.w1.iter().chain(self.w2.iter()).map(|w| w.abs()).sum()
    }
}

/// sign(0) = 0, unlike f64::signum
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Quadratic regressor trained with a single Adam optimizer whose moments
/// are shared between the MSE and the L1 objective
#[derive(Debug, Clone)]
pub struct QuadraticRegressor {
    weights: QuadraticWeights,
    lambda: f64,
    seed: u64,
    adam: Adam,
    slot_w1: AdamSlot<ndarray::Ix1>,
    slot_w2: AdamSlot<ndarray::Ix2>,
}

impl QuadraticRegressor {
    pub fn new(dim: usize, lambda: f64, lr: f64, seed: u64) -> Self {
        let weights = QuadraticWeights::init(dim, seed);
        let slot_w1 = AdamSlot::zeros_like(&weights.w1);
        let slot_w2 = AdamSlot::zeros_like(&weights.w2);
        Self {
            weights,
            lambda,
            seed,
            adam: Adam::new(AdamConfig::with_lr(lr)),
            slot_w1,
            slot_w2,
        }
    }

    pub fn from_config(config: &TaskConfig) -> Self {
        Self::new(
            config.dim_input_task,
            config.lambda_task,
            config.lr_task,
            config.init_seed,
        )
    }

    pub fn weights(&self) -> &QuadraticWeights {
        &self.weights
    }

    /// Replace the weights, e.g. from a checkpoint; optimizer state is reset
    pub fn load_weights(&mut self, weights: QuadraticWeights) -> Result<()> {
        if weights.dim() != self.weights.dim() || weights.w2.dim() != self.weights.w2.dim() {
            return Err(LossCtlError::ShapeMismatch {
                expected: format!("dim {}", self.weights.dim()),
                actual: format!("dim {}", weights.dim()),
            });
        }
        self.weights = weights;
        self.reset_optimizer();
        Ok(())
    }

    fn reset_optimizer(&mut self) {
        self.adam.reset();
        self.slot_w1 = AdamSlot::zeros_like(&self.weights.w1);
        self.slot_w2 = AdamSlot::zeros_like(&self.weights.w2);
    }

    fn check_batch(&self, batch: &Batch) -> Result<()> {
        if batch.input.ncols() != self.weights.dim() {
            return Err(LossCtlError::ShapeMismatch {
                expected: format!("{} input features", self.weights.dim()),
                actual: format!("{}", batch.input.ncols()),
            });
        }
        if batch.is_empty() {
            return Err(LossCtlError::Dataset("empty batch".to_string()));
        }
        Ok(())
    }

    pub fn predict(&self, input: &Array2<f64>) -> Array1<f64> {
        let first = input.dot(&self.weights.w1);
        let second = (input.dot(&self.weights.w2) * input).sum_axis(Axis(1));
        first + second / SECOND_ORDER_SCALE
    }

    fn mse(&self, batch: &Batch) -> (f64, Array1<f64>) {
        let residual = self.predict(&batch.input) - &batch.target;
        let loss = residual.mapv(|r| r * r).mean().unwrap_or(0.0);
        (loss, residual)
    }

    /// lambda * (Σ|w1| + Σ|W2|)
    pub fn l1_loss(&self) -> f64 {
        self.lambda * self.weights.abs_sum()
    }

    fn mse_gradients(&self, batch: &Batch) -> QuadraticWeights {
        let (_, residual) = self.mse(batch);
        let n = batch.len() as f64;
        let x = &batch.input;

        let g_w1 = x.t().dot(&residual) * (2.0 / n);
        let weighted = x * &residual.view().insert_axis(Axis(1));
        let g_w2 = weighted.t().dot(x) * (2.0 / (n * SECOND_ORDER_SCALE));

        QuadraticWeights { w1: g_w1, w2: g_w2 }
    }

    fn l1_gradients(&self) -> QuadraticWeights {
        QuadraticWeights {
            w1: self.weights.w1.mapv(|w| self.lambda * sign(w)),
            w2: self.weights.w2.mapv(|w| self.lambda * sign(w)),
        }
    }

    fn apply(&mut self, grads: &QuadraticWeights) {
        let lr_t = self.adam.begin_step();
        let config = *self.adam.config();
        self.slot_w1.apply(&mut self.weights.w1, &grads.w1, lr_t, &config);
        self.slot_w2.apply(&mut self.weights.w2, &grads.w2, lr_t, &config);
    }
}

impl TaskModel for QuadraticRegressor {
    fn train_step(&mut self, action: LossAction, batch: &Batch) -> Result<TrainOutput> {
        self.check_batch(batch)?;

        let grads = match action {
            LossAction::OptimizeMse => self.mse_gradients(batch),
            LossAction::OptimizeL1 => self.l1_gradients(),
        };
        self.apply(&grads);

        // Metrics are measured after the update, on the same batch
        let (mse_loss, _) = self.mse(batch);
        let mse_grads = self.mse_gradients(batch);
        let l1_grads = self.l1_gradients();

        Ok(TrainOutput {
            mse_loss,
            l1_loss: self.l1_loss(),
            mse_grad_magnitude: mse_grads.mean_abs(),
            l1_grad_magnitude: l1_grads.mean_abs(),
        })
    }

    fn evaluate(&self, batch: &Batch) -> Result<Evaluation> {
        self.check_batch(batch)?;
        let predictions = self.predict(&batch.input);
        let loss = (&predictions - &batch.target)
            .mapv(|r| r * r)
            .mean()
            .unwrap_or(0.0);
        Ok(Evaluation {
            loss,
            predictions,
            ground_truth: batch.target.clone(),
        })
    }

    fn reset(&mut self) {
        self.weights = QuadraticWeights::init(self.weights.dim(), self.seed);
        self.reset_optimizer();
    }

    fn export(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(&self.weights)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn batch() -> Batch {
        Batch {
            input: array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [2.0, -1.0]],
            target: array![1.0, -1.0, 0.5, 3.0],
        }
    }

    fn numeric_mse_grad(model: &QuadraticRegressor, batch: &Batch) -> QuadraticWeights {
        let h = 1e-6;
        let mut grads = QuadraticWeights {
            w1: Array1::zeros(model.weights.w1.raw_dim()),
            w2: Array2::zeros(model.weights.w2.raw_dim()),
        };
        for i in 0..model.weights.w1.len() {
            let mut plus = model.clone();
            plus.weights.w1[i] += h;
            let mut minus = model.clone();
            minus.weights.w1[i] -= h;
            grads.w1[i] = (plus.mse(batch).0 - minus.mse(batch).0) / (2.0 * h);
        }
        for idx in ndarray::indices(model.weights.w2.raw_dim()) {
            let mut plus = model.clone();
            plus.weights.w2[idx] += h;
            let mut minus = model.clone();
            minus.weights.w2[idx] -= h;
            grads.w2[idx] = (plus.mse(batch).0 - minus.mse(batch).0) / (2.0 * h);
        }
        grads
    }

    #[test]
    fn test_init_is_seeded() {
        assert_eq!(QuadraticWeights::init(4, 1), QuadraticWeights::init(4, 1));
        assert_ne!(QuadraticWeights::init(4, 1), QuadraticWeights::init(4, 2));
    }

    #[test]
    fn test_mse_gradient_matches_finite_differences() {
        let mut model = QuadraticRegressor::new(2, 0.2, 0.01, 3);
        model.weights.w1 = array![0.3, -0.4];
        model.weights.w2 = array![[0.5, -0.2], [0.1, 0.7]];

        let analytic = model.mse_gradients(&batch());
        let numeric = numeric_mse_grad(&model, &batch());
        for (a, n) in analytic.w1.iter().zip(numeric.w1.iter()) {
            assert!((a - n).abs() < 1e-5, "w1 grad {a} vs {n}");
        }
        for (a, n) in analytic.w2.iter().zip(numeric.w2.iter()) {
            assert!((a - n).abs() < 1e-5, "w2 grad {a} vs {n}");
        }
    }

    #[test]
    fn test_l1_loss_and_gradient() {
        let mut model = QuadraticRegressor::new(2, 0.5, 0.01, 3);
        model.weights.w1 = array![1.0, -2.0];
        model.weights.w2 = array![[0.0, 1.0], [-1.0, 0.0]];

        assert_eq!(model.l1_loss(), 0.5 * 5.0);
        let grads = model.l1_gradients();
        assert_eq!(grads.w1, array![0.5, -0.5]);
        assert_eq!(grads.w2, array![[0.0, 0.5], [-0.5, 0.0]]);
        // (0.5 * 4 nonzero entries) / 6 params
        assert!((grads.mean_abs() - 2.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_mse_steps_reduce_mse() {
        let mut model = QuadraticRegressor::new(2, 0.2, 0.05, 1);
        let before = model.evaluate(&batch()).unwrap().loss;
        let mut out = TrainOutput::default();
        for _ in 0..200 {
            out = model.train_step(LossAction::OptimizeMse, &batch()).unwrap();
        }
        assert!(out.mse_loss < before);
        assert!((model.evaluate(&batch()).unwrap().loss - out.mse_loss).abs() < 1e-12);
    }

    #[test]
    fn test_l1_steps_shrink_weights() {
        let mut model = QuadraticRegressor::new(3, 0.2, 0.001, 1);
        let before = model.l1_loss();
        for _ in 0..20 {
            model.train_step(LossAction::OptimizeL1, &batch_3d()).unwrap();
        }
        assert!(model.l1_loss() < before);
    }

    fn batch_3d() -> Batch {
        Batch {
            input: array![[1.0, 0.0, 2.0], [0.0, 1.0, -1.0]],
            target: array![1.0, 2.0],
        }
    }

    #[test]
    fn test_train_step_is_deterministic() {
        let mut a = QuadraticRegressor::new(3, 0.2, 0.01, 9);
        let mut b = a.clone();
        let out_a = a.train_step(LossAction::OptimizeMse, &batch_3d()).unwrap();
        let out_b = b.train_step(LossAction::OptimizeMse, &batch_3d()).unwrap();
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn test_reset_restores_initial_weights() {
        let mut model = QuadraticRegressor::new(3, 0.2, 0.01, 4);
        let initial = model.weights().clone();
        model.train_step(LossAction::OptimizeMse, &batch_3d()).unwrap();
        assert_ne!(model.weights(), &initial);
        model.reset();
        assert_eq!(model.weights(), &initial);
    }

    #[test]
    fn test_rejects_wrong_input_width() {
        let mut model = QuadraticRegressor::new(3, 0.2, 0.01, 4);
        let err = model.train_step(LossAction::OptimizeMse, &batch()).unwrap_err();
        assert!(matches!(err, LossCtlError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_export_and_load_weights() {
        let mut model = QuadraticRegressor::new(2, 0.2, 0.01, 4);
        model.train_step(LossAction::OptimizeMse, &batch()).unwrap();
        let exported = model.export().unwrap();

        let weights: QuadraticWeights = serde_json::from_value(exported).unwrap();
        let mut other = QuadraticRegressor::new(2, 0.2, 0.01, 99);
        other.load_weights(weights).unwrap();
        assert_eq!(other.weights(), model.weights());
    }

    #[test]
    fn test_weights_survive_json_text_exactly() {
        let mut model = QuadraticRegressor::new(2, 0.2, 0.01, 7);
        for _ in 0..3 {
            model.train_step(LossAction::OptimizeMse, &batch()).unwrap();
        }

        let text = serde_json::to_string(model.weights()).unwrap();
        let loaded: QuadraticWeights = serde_json::from_str(&text).unwrap();
        let bits = |w: &QuadraticWeights| {
            w.w1.iter()
                .chain(w.w2.iter())
                .map(|v| v.to_bits())
                .collect::<Vec<_>>()
        };
        assert_eq!(bits(&loaded), bits(model.weights()));
    }
}
