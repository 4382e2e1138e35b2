//! Episode lifecycle and early stopping
//!
//! Counts inner training steps, validates periodically, tracks the best
//! performance (negative validation loss) and decides when an episode ends.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LossCtlError, Result};
use crate::rl::config::{StopStrategy, TaskConfig};

/// Lifecycle phase of an episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodePhase {
    Running,
    Terminated,
}

/// Why an episode stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// Step counter exceeded `max_training_step`
    StepBudget,
    /// Validation did not improve for more than `max_endurance_task` checks
    Endurance,
    /// A collapse detector fired
    Collapse,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StepBudget => f.write_str("step_budget"),
            Self::Endurance => f.write_str("endurance"),
            Self::Collapse => f.write_str("collapse"),
        }
    }
}

/// Hook for detecting a degenerate episode, e.g. a policy that only ever
/// picks one action. No detection rule ships with the crate.
pub trait CollapseDetector: Send + fmt::Debug {
    fn is_collapsed(&mut self, episode: &EpisodeController) -> bool;

    /// Called when a new episode starts
    fn reset(&mut self) {}
}

/// Detector that never reports a collapse
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCollapse;

impl CollapseDetector for NoCollapse {
    fn is_collapsed(&mut self, _episode: &EpisodeController) -> bool {
        false
    }
}

/// Early stopping limits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarlyStopConfig {
    pub valid_frequency: usize,
    pub max_training_step: usize,
    pub max_endurance: usize,
    pub strategy: StopStrategy,
}

impl EarlyStopConfig {
    pub fn from_task(task: &TaskConfig) -> Result<Self> {
        if task.valid_frequency_task == 0 {
            return Err(LossCtlError::Validation(
                "valid_frequency_task must be positive".to_string(),
            ));
        }
        Ok(Self {
            valid_frequency: task.valid_frequency_task,
            max_training_step: task.max_training_step,
            max_endurance: task.max_endurance_task,
            strategy: task.stop_strategy()?,
        })
    }
}

/// Result of a periodic validation check
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub step: usize,
    pub loss: f64,
    /// Strictly better than every earlier check of this episode
    pub improved: bool,
    /// Endurance after this check
    pub endurance: usize,
}

/// What happened on one step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: usize,
    pub validation: Option<Validation>,
    pub termination: Option<TerminationReason>,
}

impl StepOutcome {
    pub fn is_terminal(&self) -> bool {
        self.termination.is_some()
    }

    /// A new best performance was recorded on this step
    pub fn improved(&self) -> bool {
        self.validation.map(|v| v.improved).unwrap_or(false)
    }
}

/// Episode state machine: Running until a stop condition fires, then
/// Terminated until [`EpisodeController::reset`]
#[derive(Debug)]
pub struct EpisodeController {
    config: EarlyStopConfig,
    phase: EpisodePhase,
    step: usize,
    endurance: usize,
    best_performance: Option<f64>,
    best_step: Option<usize>,
    collapse: bool,
    termination: Option<TerminationReason>,
    detector: Box<dyn CollapseDetector>,
}

impl EpisodeController {
    pub fn new(config: EarlyStopConfig) -> Self {
        Self::with_detector(config, Box::new(NoCollapse))
    }

    pub fn with_detector(config: EarlyStopConfig, detector: Box<dyn CollapseDetector>) -> Self {
        Self {
            config,
            phase: EpisodePhase::Running,
            step: 0,
            endurance: 0,
            best_performance: None,
            best_step: None,
            collapse: false,
            termination: None,
            detector,
        }
    }

    /// Start a fresh episode
    pub fn reset(&mut self) {
        self.phase = EpisodePhase::Running;
        self.step = 0;
        self.endurance = 0;
        self.best_performance = None;
        self.best_step = None;
        self.collapse = false;
        self.termination = None;
        self.detector.reset();
    }

    /// Register one completed inner training step
    ///
    /// `validate` runs a full validation pass and is only invoked on
    /// validation steps. Its error propagates unchanged and leaves the step
    /// counted but the check unrecorded.
    pub fn advance<F>(&mut self, validate: F) -> Result<StepOutcome>
    where
        F: FnOnce() -> Result<f64>,
    {
        if self.phase == EpisodePhase::Terminated {
            return Err(LossCtlError::PreconditionViolation(format!(
                "episode already terminated at step {}",
                self.step
            )));
        }

        self.step += 1;
        let step = self.step;

        let validation = if step % self.config.valid_frequency == 0 {
            let loss = validate()?;
            Some(self.record_validation(loss))
        } else {
            None
        };

        let termination = self.check_termination();
        if let Some(reason) = termination {
            self.phase = EpisodePhase::Terminated;
            self.termination = Some(reason);
            debug!(
                step,
                endurance = self.endurance,
                best_performance = ?self.best_performance,
                reason = %reason,
                "Episode terminated"
            );
        }

        Ok(StepOutcome {
            step,
            validation,
            termination,
        })
    }

    fn record_validation(&mut self, loss: f64) -> Validation {
        self.endurance += 1;
        let performance = -loss;

        let improved = match self.best_performance {
            None => !performance.is_nan(),
            Some(best) => performance > best,
        };

        if improved {
            self.best_performance = Some(performance);
            self.best_step = Some(self.step);
            self.endurance = 0;
        }

        Validation {
            step: self.step,
            loss,
            improved,
            endurance: self.endurance,
        }
    }

    fn check_termination(&mut self) -> Option<TerminationReason> {
        if self.step > self.config.max_training_step {
            return Some(TerminationReason::StepBudget);
        }

        match self.config.strategy {
            StopStrategy::ExceedingEndurance => {
                if self.endurance > self.config.max_endurance {
                    return Some(TerminationReason::Endurance);
                }
            }
            // Only the hard step budget applies
            StopStrategy::ExceedingTotalSteps => {}
        }

        // Detector is moved out so it can inspect the controller
        let mut detector = std::mem::replace(&mut self.detector, Box::new(NoCollapse));
        let collapsed = detector.is_collapsed(self);
        self.detector = detector;
        if collapsed {
            self.collapse = true;
            return Some(TerminationReason::Collapse);
        }

        None
    }

    pub fn phase(&self) -> EpisodePhase {
        self.phase
    }

    pub fn is_terminated(&self) -> bool {
        self.phase == EpisodePhase::Terminated
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn endurance(&self) -> usize {
        self.endurance
    }

    /// Best negative validation loss, absent until the first validation
    pub fn best_performance(&self) -> Option<f64> {
        self.best_performance
    }

    pub fn best_loss(&self) -> Option<f64> {
        self.best_performance.map(|p| -p)
    }

    pub fn best_step(&self) -> Option<usize> {
        self.best_step
    }

    pub fn collapsed(&self) -> bool {
        self.collapse
    }

    pub fn termination(&self) -> Option<TerminationReason> {
        self.termination
    }

    pub fn config(&self) -> &EarlyStopConfig {
        &self.config
    }
}
