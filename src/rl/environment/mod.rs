//! Regression Environment for Controller Episodes
//!
//! This module provides the gym-like environment in which a controller
//! steers the training of the task model, and the early-stopping state
//! machine that decides when an episode ends.

pub mod episode;
mod regression;

pub use episode::{
    CollapseDetector, EarlyStopConfig, EpisodeController, EpisodePhase, NoCollapse, StepOutcome,
    TerminationReason, Validation,
};
pub use regression::{RegressionEnvironment, StepInfo, StepResult};
