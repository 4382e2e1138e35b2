//! Reinforcement Learning Module
//!
//! Episodic control of the task model's training: a controller picks, at
//! every inner training step, whether the model optimizes its MSE or its L1
//! objective.
//!
//! # Features
//!
//! - **State Representation**: recent losses and gradient magnitudes encoded
//!   into five features
//! - **Action Space**: discrete (optimize MSE / optimize L1)
//! - **Rewards**: shaped step rewards and a terminal reward with a decayed
//!   baseline
//! - **Early Stopping**: step budget and validation endurance

pub mod config;
pub mod core;
pub mod environment;
pub mod memory;
pub mod policy;
pub mod training;

// Config exports
pub use config::{
    CheckpointConfig, ControllerConfig, DataConfig, RewardConfig, StopStrategy, TaskConfig,
    TaskMode,
};

// Core exports
pub use core::{
    DecayedBaseline, LossAction, LossStateEncoder, RewardShaper, StateEncoder, StepReward,
    TerminalReward, NUM_ACTIONS, STATE_DIM,
};

// Memory exports
pub use memory::{MetricsHistory, MetricsWindow, StepMetrics};

// Environment exports
pub use environment::{
    EpisodeController, RegressionEnvironment, StepInfo, StepResult, TerminationReason,
};

// Policy exports
pub use policy::{build_policy, DesignedPolicy, EpsilonGreedy, FixedPolicy, Policy, RandomPolicy};

// Training exports
pub use training::{
    run_episode, summarize_results, Checkpointer, EpisodeResult, TrainingLoop, TrainingSummary,
};
