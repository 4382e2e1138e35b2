//! State Representation
//!
//! Encodes the recent training statistics of the task model into the
//! feature vector the controller's policy consumes.

use crate::rl::memory::MetricsHistory;

/// Total number of features in the state representation
pub const STATE_DIM: usize = 5;

/// Train losses at or below this are treated as zero when computing the
/// relative train/valid gap
pub const TRAIN_LOSS_EPSILON: f64 = 1e-6;

/// Trait for encoding training statistics into a feature vector
pub trait StateEncoder: Send + Sync {
    /// Encode the history and the current improvement baseline
    fn encode(&self, history: &MetricsHistory, improve_baseline: Option<f64>) -> Vec<f32>;

    /// Get the output dimension
    fn output_dim(&self) -> usize {
        STATE_DIM
    }
}

/// Encoder of the regression task statistics
///
/// Features, in order:
/// 1. relative gap between the latest validation and train loss
/// 2. log-scaled improvement baseline, around 1
/// 3. MSE loss clipped at 20 and centred
/// 4. L1 loss shifted by 1
/// 5. MSE gradient magnitude minus L1 gradient magnitude
#[derive(Debug, Clone, Copy, Default)]
pub struct LossStateEncoder;

impl LossStateEncoder {
    pub fn new() -> Self {
        Self
    }

    fn relative_gap(valid: f64, train: f64) -> f64 {
        if train > TRAIN_LOSS_EPSILON {
            (valid - train) / train
        } else {
            0.0
        }
    }
}

impl StateEncoder for LossStateEncoder {
    fn encode(&self, history: &MetricsHistory, improve_baseline: Option<f64>) -> Vec<f32> {
        let baseline = improve_baseline.unwrap_or(1.0);

        let rel_diff = Self::relative_gap(history.valid_loss.latest(), history.train_loss.latest());
        let log_baseline = 1.0 + (baseline.abs() + 1e-5).ln() / 12.0;
        let mse = (history.mse_loss.latest() / 20.0).min(1.0) - 0.5;
        let l1 = history.l1_loss.latest() - 1.0;
        let grads = history.grad_magnitudes;
        let grad_contrast = grads.mse - grads.l1;

        let features = vec![
            rel_diff as f32,
            log_baseline as f32,
            mse as f32,
            l1 as f32,
            grad_contrast as f32,
        ];
        debug_assert_eq!(features.len(), STATE_DIM);
        features
    }
}
