//! Reward Functions
//!
//! Step rewards from the validation-loss trend and terminal rewards from the
//! best loss of an episode, both normalized by exponentially decayed baselines.

use serde::{Deserialize, Serialize};

// Re-export config
pub use crate::rl::config::RewardConfig;
use crate::error::{LossCtlError, Result};
use crate::rl::memory::MetricsHistory;

/// Improvement assumed on the first step of an episode, when there is
/// nothing to compare with yet
pub const BOOTSTRAP_IMPROVEMENT: f64 = 0.1;

/// Keeps the improvement ratio finite when the baseline is zero
const BASELINE_EPSILON: f64 = 1e-5;

/// Smallest best loss the terminal reward divides by
const MIN_TERMINAL_LOSS: f64 = 1e-12;

/// Exponential moving average that is absent until its first observation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DecayedBaseline {
    value: Option<f64>,
}

impl DecayedBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn is_initialized(&self) -> bool {
        self.value.is_some()
    }

    /// Fold in a new observation and return the updated baseline
    pub fn update(&mut self, observation: f64, decay: f64) -> f64 {
        let next = match self.value {
            None => observation,
            Some(old) => decay * old + (1.0 - decay) * observation,
        };
        self.value = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}

/// Step reward and the quantities it was derived from
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StepReward {
    /// Validation loss improvement of this step (positive = better)
    pub improvement: f64,
    /// Improvement baseline after this step
    pub baseline: f64,
    /// Shaped reward handed to the controller
    pub reward: f64,
}

/// Terminal reward of an episode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerminalReward {
    /// reward_c / best loss
    pub reward: f64,
    /// Reward minus the controller baseline, clipped to reward_max_value
    pub advantage: f64,
}

/// Shapes the step and terminal rewards of the regression task
#[derive(Debug, Clone, Copy)]
pub struct RewardShaper {
    config: RewardConfig,
}

impl RewardShaper {
    /// Create with custom config
    pub fn with_config(config: RewardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Reward for the step just recorded in `history`
    ///
    /// `improve_baseline` is episode scoped; while it is unset the step uses
    /// [`BOOTSTRAP_IMPROVEMENT`] instead of the history.
    pub fn step_reward(
        &self,
        history: &MetricsHistory,
        improve_baseline: &mut DecayedBaseline,
    ) -> StepReward {
        let improvement = if improve_baseline.is_initialized() {
            history.valid_improvement()
        } else {
            BOOTSTRAP_IMPROVEMENT
        };
        self.shape_improvement(improvement, improve_baseline)
    }

    /// Square-root compression of the improvement relative to its baseline,
    /// clipped and signed like the improvement
    pub fn shape_improvement(
        &self,
        improvement: f64,
        improve_baseline: &mut DecayedBaseline,
    ) -> StepReward {
        let baseline = improve_baseline.update(improvement, self.config.reward_baseline_decay);

        let magnitude = (improvement.abs() / (baseline.abs() + BASELINE_EPSILON))
            .sqrt()
            .min(self.config.reward_max_value);
        let sign = if improvement >= 0.0 { 1.0 } else { -1.0 };

        StepReward {
            improvement,
            baseline,
            reward: magnitude * sign * self.config.reward_step_ctrl,
        }
    }

    /// Terminal reward and advantage from the best performance of an episode
    ///
    /// `reward_baseline` is controller scoped and survives across episodes.
    /// Fails when no validation has produced a best performance yet.
    pub fn terminal_reward(
        &self,
        best_performance: Option<f64>,
        reward_baseline: &mut DecayedBaseline,
    ) -> Result<TerminalReward> {
        let performance = best_performance.ok_or_else(|| {
            LossCtlError::PreconditionViolation(
                "terminal reward requested before any validation recorded a best performance"
                    .to_string(),
            )
        })?;

        let best_loss = (-performance).max(MIN_TERMINAL_LOSS);
        let reward = self.config.reward_c / best_loss;
        let baseline = reward_baseline.update(reward, self.config.reward_baseline_decay);

        let max = self.config.reward_max_value;
        let advantage = (reward - baseline).clamp(-max, max);

        Ok(TerminalReward { reward, advantage })
    }
}

impl Default for RewardShaper {
    fn default() -> Self {
        Self::with_config(RewardConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::memory::StepMetrics;

    fn history_from(valid_losses: &[f64]) -> MetricsHistory {
        let mut history = MetricsHistory::new(2);
        for &valid_loss in valid_losses {
            history.record(&StepMetrics {
                valid_loss,
                ..Default::default()
            });
        }
        history
    }

    #[test]
    fn test_decayed_baseline() {
        let mut baseline = DecayedBaseline::new();
        assert_eq!(baseline.value(), None);
        assert_eq!(baseline.update(2.0, 0.8), 2.0);
        let next = baseline.update(4.0, 0.8);
        assert!((next - 2.4).abs() < 1e-12);
        baseline.reset();
        assert!(!baseline.is_initialized());
    }

    #[test]
    fn test_first_step_uses_bootstrap_improvement() {
        let shaper = RewardShaper::default();
        let mut baseline = DecayedBaseline::new();
        // history content is ignored on the first step
        let step = shaper.step_reward(&history_from(&[3.0, 9.0]), &mut baseline);

        assert_eq!(step.improvement, 0.1);
        assert_eq!(baseline.value(), Some(0.1));
        assert!(step.reward > 0.0);
        let expected = (0.1f64 / (0.1 + 1e-5)).sqrt();
        assert!((step.reward - expected).abs() < 1e-12);
    }

    #[test]
    fn test_step_reward_uses_valid_trend_after_first_step() {
        let shaper = RewardShaper::default();
        let mut baseline = DecayedBaseline::new();
        shaper.step_reward(&history_from(&[5.0]), &mut baseline);

        let step = shaper.step_reward(&history_from(&[5.0, 4.0]), &mut baseline);
        assert_eq!(step.improvement, 1.0);
        // 0.8 * 0.1 + 0.2 * 1.0
        assert!((step.baseline - 0.28).abs() < 1e-12);
        assert!(step.reward > 0.0);

        let worse = shaper.step_reward(&history_from(&[4.0, 4.5]), &mut baseline);
        assert!(worse.reward < 0.0);
    }

    #[test]
    fn test_step_reward_is_clipped() {
        let shaper = RewardShaper::with_config(RewardConfig {
            reward_step_ctrl: 2.0,
            ..RewardConfig::default()
        });
        let mut baseline = DecayedBaseline::new();
        baseline.update(0.0, 0.8);

        let step = shaper.shape_improvement(-1e6, &mut baseline);
        // baseline moved to 0.2 * -1e6, ratio is about 5 before clipping
        assert!(step.reward < 0.0);

        // decay 1.0 freezes the baseline at its first observation
        let frozen = RewardShaper::with_config(RewardConfig {
            reward_baseline_decay: 1.0,
            reward_step_ctrl: 2.0,
            ..RewardConfig::default()
        });
        let mut tiny = DecayedBaseline::new();
        tiny.update(1e-9, 1.0);
        let step = frozen.shape_improvement(50.0, &mut tiny);
        assert_eq!(step.reward, 20.0 * 2.0);
    }

    #[test]
    fn test_step_reward_bound_and_sign() {
        let config = RewardConfig::default();
        let shaper = RewardShaper::with_config(config);
        let bound = config.reward_max_value * config.reward_step_ctrl;
        let mut baseline = DecayedBaseline::new();
        for improvement in [0.3, -2.0, 1e-8, -1e-8, 1e4, -1e4, 0.0, 5.5] {
            let step = shaper.shape_improvement(improvement, &mut baseline);
            assert!(step.reward.abs() <= bound);
            if improvement > 0.0 {
                assert!(step.reward >= 0.0);
            } else if improvement < 0.0 {
                assert!(step.reward <= 0.0);
            }
        }
    }

    #[test]
    fn test_zero_improvement_is_non_negative() {
        let shaper = RewardShaper::default();
        let mut baseline = DecayedBaseline::new();
        baseline.update(1.0, 0.8);
        let step = shaper.shape_improvement(-0.0, &mut baseline);
        assert_eq!(step.reward, 0.0);
        assert!(step.reward.is_sign_positive());
    }

    #[test]
    fn test_terminal_reward_requires_best_performance() {
        let shaper = RewardShaper::default();
        let mut baseline = DecayedBaseline::new();
        let err = shaper.terminal_reward(None, &mut baseline).unwrap_err();
        assert!(matches!(err, LossCtlError::PreconditionViolation(_)));
        assert!(!baseline.is_initialized());
    }

    #[test]
    fn test_terminal_reward_and_advantage() {
        let shaper = RewardShaper::default();
        let mut baseline = DecayedBaseline::new();

        let first = shaper.terminal_reward(Some(-4.0), &mut baseline).unwrap();
        assert_eq!(first.reward, 5_000.0);
        assert_eq!(first.advantage, 0.0);

        let second = shaper.terminal_reward(Some(-2.0), &mut baseline).unwrap();
        assert_eq!(second.reward, 10_000.0);
        // baseline 6000, raw advantage 4000 clipped to 20
        assert_eq!(second.advantage, 20.0);

        let third = shaper.terminal_reward(Some(-8.0), &mut baseline).unwrap();
        assert_eq!(third.advantage, -20.0);
    }

    #[test]
    fn test_advantage_within_bound() {
        let shaper = RewardShaper::with_config(RewardConfig {
            reward_c: 1.0,
            reward_max_value: 0.5,
            ..RewardConfig::default()
        });
        let mut baseline = DecayedBaseline::new();
        for loss in [1.0, 0.5, 3.0, 0.01, 0.0, 100.0] {
            let terminal = shaper.terminal_reward(Some(-loss), &mut baseline).unwrap();
            assert!(terminal.reward.is_finite());
            assert!(terminal.advantage.abs() <= 0.5);
        }
    }
}
