//! Controller policies
//!
//! A policy maps the encoded state to the loss the task model optimizes
//! next. The policy-gradient update of a learned controller is out of scope;
//! the policies here are the hand-designed and exploratory ones used to run
//! and evaluate episodes.

pub mod exploration;

use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::error;

use crate::error::{LossCtlError, Result};
use crate::rl::config::ControllerConfig;
use crate::rl::core::{LossAction, NUM_ACTIONS};

pub use exploration::{EpsilonGreedy, EpsilonSchedule};

/// Action sampling contract of the controller
pub trait Policy: Send + std::fmt::Debug {
    fn sample(&mut self, state: &[f32]) -> LossAction;

    /// Called before the first step of an episode
    fn reset(&mut self) {}

    /// Called after the terminal reward of an episode is known
    fn end_episode(&mut self) {}

    fn name(&self) -> &str;
}

/// Alternates between the MSE and L1 objective, starting with L1
#[derive(Debug, Clone, Default)]
pub struct DesignedPolicy {
    step: usize,
}

impl DesignedPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Policy for DesignedPolicy {
    fn sample(&mut self, _state: &[f32]) -> LossAction {
        self.step += 1;
        if self.step % 2 == 0 {
            LossAction::OptimizeMse
        } else {
            LossAction::OptimizeL1
        }
    }

    fn reset(&mut self) {
        self.step = 0;
    }

    fn name(&self) -> &str {
        "designed"
    }
}

/// Always picks the same objective; the baseline controllers
#[derive(Debug, Clone, Copy)]
pub struct FixedPolicy {
    action: LossAction,
}

impl FixedPolicy {
    pub fn new(action: LossAction) -> Self {
        Self { action }
    }
}

impl Policy for FixedPolicy {
    fn sample(&mut self, _state: &[f32]) -> LossAction {
        self.action
    }

    fn name(&self) -> &str {
        self.action.name()
    }
}

/// Uniformly random objective
#[derive(Debug)]
pub struct RandomPolicy {
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Policy for RandomPolicy {
    fn sample(&mut self, _state: &[f32]) -> LossAction {
        let index = self.rng.gen_range(0..NUM_ACTIONS);
        LossAction::from_index(index).unwrap_or(LossAction::OptimizeMse)
    }

    fn name(&self) -> &str {
        "random"
    }
}

/// Policy kinds selectable by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Designed,
    Mse,
    L1,
    Random,
    EpsilonGreedy,
}

impl FromStr for PolicyKind {
    type Err = LossCtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "designed" => Ok(Self::Designed),
            "mse" => Ok(Self::Mse),
            "l1" => Ok(Self::L1),
            "random" => Ok(Self::Random),
            "epsilon_greedy" | "epsilon-greedy" => Ok(Self::EpsilonGreedy),
            other => {
                error!(controller = other, "Unknown controller");
                Err(LossCtlError::UnknownController(other.to_string()))
            }
        }
    }
}

/// Build the policy named in `config`; `worker` offsets the seed so
/// parallel rollouts explore independently
pub fn build_policy(config: &ControllerConfig, worker: u64) -> Result<Box<dyn Policy>> {
    let seed = config.seed.wrapping_add(worker);
    let policy: Box<dyn Policy> = match config.name.parse::<PolicyKind>()? {
        PolicyKind::Designed => Box::new(DesignedPolicy::new()),
        PolicyKind::Mse => Box::new(FixedPolicy::new(LossAction::OptimizeMse)),
        PolicyKind::L1 => Box::new(FixedPolicy::new(LossAction::OptimizeL1)),
        PolicyKind::Random => Box::new(RandomPolicy::new(seed)),
        PolicyKind::EpsilonGreedy => Box::new(EpsilonGreedy::new(
            DesignedPolicy::new(),
            EpsilonSchedule::from_config(config),
            seed,
        )),
    };
    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_designed_alternates_starting_with_l1() {
        let mut policy = DesignedPolicy::new();
        let actions: Vec<_> = (0..4).map(|_| policy.sample(&[0.0; 5])).collect();
        assert_eq!(
            actions,
            vec![
                LossAction::OptimizeL1,
                LossAction::OptimizeMse,
                LossAction::OptimizeL1,
                LossAction::OptimizeMse,
            ]
        );

        policy.reset();
        assert_eq!(policy.sample(&[0.0; 5]), LossAction::OptimizeL1);
    }

    #[test]
    fn test_fixed_policy() {
        let mut policy = FixedPolicy::new(LossAction::OptimizeMse);
        assert!((0..10).all(|_| policy.sample(&[1.0; 5]) == LossAction::OptimizeMse));
        assert_eq!(policy.name(), "mse");
    }

    #[test]
    fn test_build_policy_by_name() {
        for (name, expected) in [
            ("designed", "designed"),
            ("MSE", "mse"),
            ("l1", "l1"),
            ("random", "random"),
            ("epsilon_greedy", "epsilon_greedy(designed)"),
        ] {
            let config = ControllerConfig {
                name: name.to_string(),
                ..ControllerConfig::default()
            };
            assert_eq!(build_policy(&config, 0).unwrap().name(), expected);
        }
    }

    #[test]
    fn test_unknown_controller() {
        let config = ControllerConfig {
            name: "reinforce".to_string(),
            ..ControllerConfig::default()
        };
        let err = build_policy(&config, 0).unwrap_err();
        assert!(matches!(err, LossCtlError::UnknownController(ref n) if n == "reinforce"));
    }
}
