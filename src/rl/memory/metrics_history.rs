//! Metrics History
//!
//! Fixed-length sliding windows over recent training statistics.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Sliding window of scalar metrics with a fixed length
///
/// The window is pre-filled with zeros, so it always holds exactly
/// `capacity` values. Pushing evicts the oldest value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl MetricsWindow {
    /// Create a zero-filled window
    pub fn new(capacity: usize) -> Self {
        let mut values = VecDeque::with_capacity(capacity + 1);
        values.extend(std::iter::repeat(0.0).take(capacity));
        Self { values, capacity }
    }

    /// Append a value and drop the oldest one
    pub fn push(&mut self, value: f64) {
        if self.capacity == 0 {
            return;
        }
        self.values.pop_front();
        self.values.push_back(value);
    }

    /// Most recent value
    pub fn latest(&self) -> f64 {
        self.values.back().copied().unwrap_or(0.0)
    }

    /// Second most recent value
    pub fn previous(&self) -> f64 {
        self.values
            .len()
            .checked_sub(2)
            .and_then(|i| self.values.get(i))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Values oldest first
    pub fn to_vec(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }

    /// Refill with zeros
    pub fn reset(&mut self) {
        self.values.iter_mut().for_each(|v| *v = 0.0);
    }
}

/// Scalar metrics produced by one inner training step
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StepMetrics {
    pub mse_loss: f64,
    pub l1_loss: f64,
    pub mse_grad_magnitude: f64,
    pub l1_grad_magnitude: f64,
    pub valid_loss: f64,
    pub train_loss: f64,
}

/// Gradient magnitudes of the latest step, overwritten every step
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GradientMagnitudes {
    pub mse: f64,
    pub l1: f64,
}

/// Recent loss history of one episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsHistory {
    pub mse_loss: MetricsWindow,
    pub l1_loss: MetricsWindow,
    pub valid_loss: MetricsWindow,
    pub train_loss: MetricsWindow,
    pub grad_magnitudes: GradientMagnitudes,
}

impl MetricsHistory {
    pub fn new(num_pre_loss: usize) -> Self {
        Self {
            mse_loss: MetricsWindow::new(num_pre_loss),
            l1_loss: MetricsWindow::new(num_pre_loss),
            valid_loss: MetricsWindow::new(num_pre_loss),
            train_loss: MetricsWindow::new(num_pre_loss),
            grad_magnitudes: GradientMagnitudes::default(),
        }
    }

    /// Record the metrics of a completed step
    pub fn record(&mut self, metrics: &StepMetrics) {
        self.mse_loss.push(metrics.mse_loss);
        self.l1_loss.push(metrics.l1_loss);
        self.valid_loss.push(metrics.valid_loss);
        self.train_loss.push(metrics.train_loss);
        self.grad_magnitudes = GradientMagnitudes {
            mse: metrics.mse_grad_magnitude,
            l1: metrics.l1_grad_magnitude,
        };
    }

    pub fn reset(&mut self) {
        self.mse_loss.reset();
        self.l1_loss.reset();
        self.valid_loss.reset();
        self.train_loss.reset();
        self.grad_magnitudes = GradientMagnitudes::default();
    }

    /// Improvement of the validation loss over the last step (positive = better)
    pub fn valid_improvement(&self) -> f64 {
        self.valid_loss.previous() - self.valid_loss.latest()
    }
}
