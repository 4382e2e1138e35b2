//! Task models
//!
//! The model the controller steers. The episode loop only sees it through
//! [`TaskModel`]: one optimization step against a chosen loss, and a
//! validation pass.

pub mod adam;
pub mod quadratic;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::data::Batch;
use crate::error::Result;
use crate::rl::core::LossAction;

pub use adam::{Adam, AdamConfig, AdamSlot};
pub use quadratic::{QuadraticRegressor, QuadraticWeights};

/// Losses and gradient magnitudes measured on the training batch right
/// after an update
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainOutput {
    pub mse_loss: f64,
    pub l1_loss: f64,
    /// Mean absolute value of the MSE gradient over all parameters
    pub mse_grad_magnitude: f64,
    /// Mean absolute value of the L1 gradient over all parameters
    pub l1_grad_magnitude: f64,
}

/// Full-pass evaluation of a split
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub loss: f64,
    pub predictions: Array1<f64>,
    pub ground_truth: Array1<f64>,
}

/// Inner model trained under the controller's choice of loss
#[cfg_attr(test, mockall::automock)]
pub trait TaskModel: Send {
    /// Apply one optimizer update against `action`'s objective on `batch`
    fn train_step(&mut self, action: LossAction, batch: &Batch) -> Result<TrainOutput>;

    /// MSE of the model on `batch`
    fn evaluate(&self, batch: &Batch) -> Result<Evaluation>;

    /// Restore the initial weights and optimizer state
    fn reset(&mut self);

    /// Serialized weights for checkpointing
    fn export(&self) -> Result<serde_json::Value>;
}
