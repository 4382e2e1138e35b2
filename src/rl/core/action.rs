//! Action Space
//!
//! The controller picks which loss objective the task model optimizes next.

use serde::{Deserialize, Serialize};

use crate::error::{LossCtlError, Result};

/// Number of discrete actions
pub const NUM_ACTIONS: usize = 2;

/// Loss objective to optimize for one inner training step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LossAction {
    /// Step against the mean squared error
    OptimizeMse = 0,
    /// Step against the L1 weight regularizer
    OptimizeL1 = 1,
}

impl LossAction {
    /// Convert from action index
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::OptimizeMse),
            1 => Some(Self::OptimizeL1),
            _ => None,
        }
    }

    /// Convert to action index
    pub fn to_index(self) -> usize {
        self as usize
    }

    /// Decode a one-hot (or score) vector by argmax; ties pick the lower index
    pub fn from_one_hot(encoding: &[f32]) -> Result<Self> {
        if encoding.len() != NUM_ACTIONS {
            return Err(LossCtlError::ShapeMismatch {
                expected: format!("{NUM_ACTIONS} action entries"),
                actual: format!("{}", encoding.len()),
            });
        }

        let mut best = 0;
        for (i, v) in encoding.iter().enumerate() {
            if v.is_nan() {
                return Err(LossCtlError::InvalidAction("NaN in action encoding".to_string()));
            }
            if *v > encoding[best] {
                best = i;
            }
        }

        Self::from_index(best)
            .ok_or_else(|| LossCtlError::InvalidAction(format!("index {best} out of range")))
    }

    /// One-hot encoding of this action
    pub fn one_hot(self) -> [f32; NUM_ACTIONS] {
        let mut encoding = [0.0; NUM_ACTIONS];
        encoding[self.to_index()] = 1.0;
        encoding
    }

    /// Get all possible actions
    pub fn all() -> &'static [LossAction] {
        &[Self::OptimizeMse, Self::OptimizeL1]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OptimizeMse => "mse",
            Self::OptimizeL1 => "l1",
        }
    }
}
