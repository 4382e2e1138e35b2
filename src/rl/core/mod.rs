//! Core RL abstractions
//!
//! Fundamental types for state representation, actions, and rewards.

pub mod action;
pub mod reward;
pub mod state;

pub use action::{LossAction, NUM_ACTIONS};
pub use reward::{DecayedBaseline, RewardShaper, StepReward, TerminalReward};
pub use state::{LossStateEncoder, StateEncoder, STATE_DIM};
