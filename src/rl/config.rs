//! RL Configuration
//!
//! Configuration structs for the task model, reward shaping and the controller loop.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{LossCtlError, Result};

/// Which dataset split pair an episode trains and validates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskMode {
    /// Controller training: train_ctrl / valid_ctrl splits, no checkpoints
    Train,
    /// Controller evaluation: train_task / valid_task splits
    Test,
    /// Hand-designed or fixed schedules: train_task / valid_task splits
    Baseline,
}

impl TaskMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Test => "test",
            Self::Baseline => "baseline",
        }
    }

    /// Checkpoints are only written outside pure controller training
    pub fn saves_checkpoints(&self) -> bool {
        !matches!(self, Self::Train)
    }
}

impl FromStr for TaskMode {
    type Err = LossCtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train" => Ok(Self::Train),
            "test" => Ok(Self::Test),
            "baseline" => Ok(Self::Baseline),
            _ => {
                error!(mode = s, "Unexpected task mode");
                Err(LossCtlError::UnknownMode(s.to_string()))
            }
        }
    }
}

impl fmt::Display for TaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an episode decides it has converged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopStrategy {
    /// Stop once validation has not improved for `max_endurance_task` checks
    ExceedingEndurance,
    /// Only the hard `max_training_step` budget applies
    ExceedingTotalSteps,
}

impl FromStr for StopStrategy {
    type Err = LossCtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exceeding_endurance" => Ok(Self::ExceedingEndurance),
            "exceeding_total_steps" => Ok(Self::ExceedingTotalSteps),
            _ => {
                error!(strategy = s, "Unexpected stop strategy");
                Err(LossCtlError::UnknownStopStrategy(s.to_string()))
            }
        }
    }
}

/// Inner task model and episode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Active mode: train, test or baseline
    pub mode: String,
    /// Input dimension of the regression task
    pub dim_input_task: usize,
    /// Scale of the L1 regularization loss
    pub lambda_task: f64,
    /// Minibatch size for inner training steps
    pub batch_size: usize,
    /// Adam learning rate of the task model
    pub lr_task: f64,
    /// Steps between validation checks
    pub valid_frequency_task: usize,
    /// exceeding_endurance or exceeding_total_steps
    pub stop_strategy_task: String,
    /// Validation checks without improvement before the episode stops
    pub max_endurance_task: usize,
    /// Hard step budget per episode
    pub max_training_step: usize,
    /// How many recent training steps are recorded in the metrics history
    pub num_pre_loss: usize,
    /// Seed for weight initialization
    pub init_seed: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            mode: "train".to_string(),
            dim_input_task: 16,
            lambda_task: 0.2,
            batch_size: 200,
            lr_task: 0.0005,
            valid_frequency_task: 10,
            stop_strategy_task: "exceeding_endurance".to_string(),
            max_endurance_task: 100,
            max_training_step: 20_000,
            num_pre_loss: 2,
            init_seed: 1,
        }
    }
}

impl TaskConfig {
    pub fn task_mode(&self) -> Result<TaskMode> {
        self.mode.parse()
    }

    pub fn stop_strategy(&self) -> Result<StopStrategy> {
        self.stop_strategy_task.parse()
    }
}

/// Reward shaping configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RewardConfig {
    /// Decay of both the improvement and the reward baseline
    pub reward_baseline_decay: f64,
    /// Numerator of the terminal reward (reward_c / best_loss)
    pub reward_c: f64,
    /// Upper bound on the step reward magnitude and the advantage
    pub reward_max_value: f64,
    /// Scale applied to every step reward
    pub reward_step_ctrl: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            reward_baseline_decay: 0.8,
            reward_c: 20_000.0,
            // Guards against huge step rewards when the improvement baseline is tiny
            reward_max_value: 20.0,
            reward_step_ctrl: 1.0,
        }
    }
}

/// Outer controller loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// designed, mse, l1, random or epsilon_greedy
    pub name: String,
    /// Number of episodes to run
    pub total_episodes: usize,
    /// Episodes without a better terminal reward before the loop stops
    pub max_endurance_ctrl: usize,
    /// Exploration rate at the first episode
    pub epsilon_start_ctrl: f64,
    /// Exploration rate floor
    pub epsilon_end_ctrl: f64,
    /// Episodes over which epsilon decays linearly
    pub epsilon_decay_steps_ctrl: usize,
    /// Episodes run concurrently per batch
    pub parallel_rollouts: usize,
    /// Seed for exploration
    pub seed: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            name: "designed".to_string(),
            total_episodes: 400,
            max_endurance_ctrl: 50,
            epsilon_start_ctrl: 0.5,
            epsilon_end_ctrl: 0.1,
            epsilon_decay_steps_ctrl: 1,
            parallel_rollouts: 1,
            seed: 7,
        }
    }
}

/// Synthetic dataset configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory holding the split files
    pub data_dir: String,
    pub num_sample_train_ctrl: usize,
    pub num_sample_valid_ctrl: usize,
    pub num_sample_train_task: usize,
    pub num_sample_valid_task: usize,
    pub num_sample_test: usize,
    /// Mean of the additive target noise
    pub mean_noise: f64,
    /// Variance of the additive target noise
    pub var_noise: f64,
    /// Seed for generation and batch shuffling
    pub seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: "data/reg".to_string(),
            num_sample_train_ctrl: 200,
            num_sample_valid_ctrl: 200,
            num_sample_train_task: 200,
            num_sample_valid_task: 200,
            num_sample_test: 200,
            mean_noise: 0.0,
            var_noise: 2.0,
            seed: 1,
        }
    }
}

/// Task model checkpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Path for saving checkpoints
    pub checkpoint_dir: String,
    /// Maximum checkpoints to keep
    pub max_checkpoints: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: "./ckpts".to_string(),
            max_checkpoints: 5,
        }
    }
}
