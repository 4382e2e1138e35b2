//! Epsilon-greedy exploration around a base policy.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::Policy;
use crate::rl::config::ControllerConfig;
use crate::rl::core::{LossAction, NUM_ACTIONS};

/// Linear epsilon decay, advanced once per finished episode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpsilonSchedule {
    start: f64,
    end: f64,
    steps: usize,
    step: usize,
}

impl EpsilonSchedule {
    pub fn new(start: f64, end: f64, steps: usize) -> Self {
        Self {
            start: start.clamp(0.0, 1.0),
            end: end.clamp(0.0, 1.0),
            steps: steps.max(1),
            step: 0,
        }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(
            config.epsilon_start_ctrl,
            config.epsilon_end_ctrl,
            config.epsilon_decay_steps_ctrl,
        )
    }

    pub fn value(&self) -> f64 {
        let progress = (self.step as f64 / self.steps as f64).min(1.0);
        self.start + (self.end - self.start) * progress
    }

    pub fn advance(&mut self) -> f64 {
        self.step = self.step.saturating_add(1);
        self.value()
    }

    pub fn step(&self) -> usize {
        self.step
    }
}

/// Takes a uniformly random action with probability epsilon, otherwise
/// defers to the wrapped policy
#[derive(Debug)]
pub struct EpsilonGreedy<P> {
    inner: P,
    schedule: EpsilonSchedule,
    rng: StdRng,
    name: String,
}

impl<P: Policy> EpsilonGreedy<P> {
    pub fn new(inner: P, schedule: EpsilonSchedule, seed: u64) -> Self {
        let name = format!("epsilon_greedy({})", inner.name());
        Self {
            inner,
            schedule,
            rng: StdRng::seed_from_u64(seed),
            name,
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.schedule.value()
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: Policy> Policy for EpsilonGreedy<P> {
    fn sample(&mut self, state: &[f32]) -> LossAction {
        // The base policy advances on every step so its own schedule is
        // unaffected by exploration
        let greedy = self.inner.sample(state);
        if self.rng.gen::<f64>() < self.schedule.value() {
            let index = self.rng.gen_range(0..NUM_ACTIONS);
            LossAction::from_index(index).unwrap_or(greedy)
        } else {
            greedy
        }
    }

    fn reset(&mut self) {
        self.inner.reset();
    }

    fn end_episode(&mut self) {
        self.schedule.advance();
        self.inner.end_episode();
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::policy::FixedPolicy;

    #[test]
    fn test_schedule_decays_linearly() {
        let mut schedule = EpsilonSchedule::new(0.5, 0.1, 4);
        assert!((schedule.value() - 0.5).abs() < 1e-12);
        assert!((schedule.advance() - 0.4).abs() < 1e-12);
        schedule.advance();
        schedule.advance();
        assert!((schedule.advance() - 0.1).abs() < 1e-12);
        // Stays at the floor
        assert!((schedule.advance() - 0.1).abs() < 1e-12);
        assert_eq!(schedule.step(), 5);
    }

    #[test]
    fn test_zero_decay_steps_treated_as_one() {
        let mut schedule = EpsilonSchedule::new(0.5, 0.1, 0);
        assert!((schedule.advance() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_zero_epsilon_is_greedy() {
        let schedule = EpsilonSchedule::new(0.0, 0.0, 1);
        let mut policy = EpsilonGreedy::new(FixedPolicy::new(LossAction::OptimizeL1), schedule, 3);
        for _ in 0..100 {
            assert_eq!(policy.sample(&[0.0; 5]), LossAction::OptimizeL1);
        }
    }

    #[test]
    fn test_full_epsilon_explores_both_actions() {
        let schedule = EpsilonSchedule::new(1.0, 1.0, 1);
        let mut policy = EpsilonGreedy::new(FixedPolicy::new(LossAction::OptimizeL1), schedule, 3);
        let mse = (0..200)
            .filter(|_| policy.sample(&[0.0; 5]) == LossAction::OptimizeMse)
            .count();
        assert!(mse > 50 && mse < 150, "mse picked {mse} times");
    }

    #[test]
    fn test_seeded_exploration_is_reproducible() {
        let schedule = EpsilonSchedule::new(0.5, 0.5, 1);
        let mut a = EpsilonGreedy::new(FixedPolicy::new(LossAction::OptimizeMse), schedule, 11);
        let mut b = EpsilonGreedy::new(FixedPolicy::new(LossAction::OptimizeMse), schedule, 11);
        let run_a: Vec<_> = (0..50).map(|_| a.sample(&[0.0; 5])).collect();
        let run_b: Vec<_> = (0..50).map(|_| b.sample(&[0.0; 5])).collect();
        assert_eq!(run_a, run_b);
    }

    #[test]
    fn test_end_episode_advances_schedule() {
        let schedule = EpsilonSchedule::new(0.5, 0.1, 1);
        let mut policy = EpsilonGreedy::new(FixedPolicy::new(LossAction::OptimizeMse), schedule, 1);
        assert!((policy.epsilon() - 0.5).abs() < 1e-12);
        policy.end_episode();
        assert!((policy.epsilon() - 0.1).abs() < 1e-12);
        assert_eq!(policy.name(), "epsilon_greedy(mse)");
    }
}
