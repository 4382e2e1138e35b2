//! Regression Environment for the Loss Controller
//!
//! Gym-like request/response interface: every `response(action)` trains the
//! task model for one step on the chosen loss and answers with the next
//! state, the step reward and whether the episode is over.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::episode::{EarlyStopConfig, EpisodeController, TerminationReason, Validation};
use crate::data::{Batch, DataSplits, Dataset, SplitPair};
use crate::error::{LossCtlError, Result};
use crate::rl::config::{RewardConfig, TaskConfig, TaskMode};
use crate::rl::core::{
    DecayedBaseline, LossAction, LossStateEncoder, RewardShaper, StateEncoder, TerminalReward,
};
use crate::rl::memory::{MetricsHistory, StepMetrics};
use crate::rl::training::CheckpointStore;
use crate::task::{Evaluation, TaskModel};

/// Result of taking a step in the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Encoded state after the step
    pub observation: Vec<f32>,
    /// Shaped step reward
    pub reward: f64,
    /// Whether the episode is over
    pub done: bool,
    /// Additional info
    pub info: StepInfo,
}

/// Additional step information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub step: usize,
    /// Full-pass validation loss after the update
    pub valid_loss: f64,
    /// MSE on the training batch after the update
    pub train_loss: f64,
    pub l1_loss: f64,
    /// Improvement the step reward was computed from
    pub improvement: f64,
    /// Set on validation steps
    pub validation: Option<Validation>,
    pub best_loss: Option<f64>,
    pub endurance: usize,
    pub termination: Option<TerminationReason>,
}

/// Environment wrapping one task model and the split pair of its mode
pub struct RegressionEnvironment {
    mode: TaskMode,
    batch_size: usize,
    model: Box<dyn TaskModel>,
    splits: SplitPair,
    test: Dataset,
    /// Validation split as one batch, evaluated after every step
    valid_batch: Batch,
    history: MetricsHistory,
    episode: EpisodeController,
    improve_baseline: DecayedBaseline,
    shaper: RewardShaper,
    encoder: LossStateEncoder,
    checkpoints: Option<Box<dyn CheckpointStore>>,
}

impl RegressionEnvironment {
    /// Create an environment; the mode's split pair is selected here once
    pub fn new(
        task: &TaskConfig,
        reward: RewardConfig,
        model: Box<dyn TaskModel>,
        splits: DataSplits,
    ) -> Result<Self> {
        let mode = task.task_mode()?;
        if task.num_pre_loss < 2 {
            return Err(LossCtlError::Validation(format!(
                "num_pre_loss must be at least 2, got {}",
                task.num_pre_loss
            )));
        }
        if task.batch_size == 0 {
            return Err(LossCtlError::Validation(
                "batch_size must be positive".to_string(),
            ));
        }
        if splits.dim() != task.dim_input_task {
            return Err(LossCtlError::ShapeMismatch {
                expected: format!("input dimension {}", task.dim_input_task),
                actual: format!("{}", splits.dim()),
            });
        }

        let early_stop = EarlyStopConfig::from_task(task)?;
        let (splits, test) = splits.select(mode);
        let valid_batch = splits.valid.full_batch();

        Ok(Self {
            mode,
            batch_size: task.batch_size,
            model,
            splits,
            test,
            valid_batch,
            history: MetricsHistory::new(task.num_pre_loss),
            episode: EpisodeController::new(early_stop),
            improve_baseline: DecayedBaseline::new(),
            shaper: RewardShaper::with_config(reward),
            encoder: LossStateEncoder::new(),
            checkpoints: None,
        })
    }

    /// Persist new best weights through `store` (ignored in train mode)
    pub fn with_checkpoints(mut self, store: Box<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// Replace the early-stop state machine, e.g. to install a collapse
    /// detector
    pub fn with_episode_controller(mut self, episode: EpisodeController) -> Self {
        self.episode = episode;
        self
    }

    /// Start a new episode and return the initial state
    pub fn reset(&mut self) -> Vec<f32> {
        self.model.reset();
        self.history.reset();
        self.episode.reset();
        self.improve_baseline.reset();
        self.observe()
    }

    fn observe(&self) -> Vec<f32> {
        self.encoder.encode(&self.history, self.improve_baseline.value())
    }

    /// Train one step on `action` and report the outcome
    pub fn response(&mut self, action: LossAction) -> Result<StepResult> {
        if self.episode.is_terminated() {
            return Err(LossCtlError::PreconditionViolation(format!(
                "response called on a terminated episode at step {}",
                self.episode.step()
            )));
        }

        let batch = self.splits.train.next_batch(self.batch_size);
        let output = self.model.train_step(action, &batch)?;
        let valid_loss = self.model.evaluate(&self.valid_batch)?.loss;

        let metrics = StepMetrics {
            mse_loss: output.mse_loss,
            l1_loss: output.l1_loss,
            mse_grad_magnitude: output.mse_grad_magnitude,
            l1_grad_magnitude: output.l1_grad_magnitude,
            valid_loss,
            train_loss: output.mse_loss,
        };
        self.history.record(&metrics);

        let step_reward = self
            .shaper
            .step_reward(&self.history, &mut self.improve_baseline);

        let outcome = self.episode.advance(|| Ok(valid_loss))?;

        if outcome.improved() && self.mode.saves_checkpoints() {
            if let Some(store) = self.checkpoints.as_mut() {
                let weights = self.model.export()?;
                store.save(outcome.step, &weights)?;
            }
        }

        if let Some(validation) = outcome.validation {
            debug!(
                step = outcome.step,
                valid_loss = validation.loss,
                improved = validation.improved,
                endurance = validation.endurance,
                "Validation"
            );
        }

        let observation = self.observe();
        let info = StepInfo {
            step: outcome.step,
            valid_loss,
            train_loss: metrics.train_loss,
            l1_loss: metrics.l1_loss,
            improvement: step_reward.improvement,
            validation: outcome.validation,
            best_loss: self.episode.best_loss(),
            endurance: self.episode.endurance(),
            termination: outcome.termination,
        };

        Ok(StepResult {
            observation,
            reward: step_reward.reward,
            done: outcome.is_terminal(),
            info,
        })
    }

    /// Terminal reward and advantage of the finished (or running) episode
    pub fn final_reward(&self, reward_baseline: &mut DecayedBaseline) -> Result<TerminalReward> {
        let terminal = self
            .shaper
            .terminal_reward(self.episode.best_performance(), reward_baseline)?;
        info!(
            step = self.episode.step(),
            best_loss = ?self.episode.best_loss(),
            reward = terminal.reward,
            advantage = terminal.advantage,
            "Episode reward"
        );
        Ok(terminal)
    }

    /// Evaluate the current model on the test split
    pub fn evaluate_test(&self) -> Result<Evaluation> {
        self.model.evaluate(&self.test.full_batch())
    }

    pub fn mode(&self) -> TaskMode {
        self.mode
    }

    pub fn history(&self) -> &MetricsHistory {
        &self.history
    }

    pub fn episode(&self) -> &EpisodeController {
        &self.episode
    }

    pub fn improve_baseline(&self) -> Option<f64> {
        self.improve_baseline.value()
    }

    pub fn model(&self) -> &dyn TaskModel {
        self.model.as_ref()
    }
}
