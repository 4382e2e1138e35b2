//! Training Loop
//!
//! Runs controller episodes against the regression environment, computes
//! the terminal reward of each, and stops when the terminal reward has not
//! improved for `max_endurance_ctrl` episodes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{LossCtlError, Result};
use crate::rl::config::ControllerConfig;
use crate::rl::core::{DecayedBaseline, NUM_ACTIONS};
use crate::rl::environment::{RegressionEnvironment, TerminationReason};
use crate::rl::policy::Policy;

/// Episode result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeResult {
    /// Episode index, in start order
    pub episode: usize,
    /// Inner training steps taken
    pub steps: usize,
    pub best_step: Option<usize>,
    pub best_loss: Option<f64>,
    /// MSE on the test split with the final weights
    pub test_loss: f64,
    /// Terminal reward
    pub reward: f64,
    pub advantage: f64,
    /// How often each action was chosen, indexed by action
    pub action_counts: [usize; NUM_ACTIONS],
    /// Sum of the shaped step rewards
    pub total_step_reward: f64,
    pub termination: Option<TerminationReason>,
}

/// Step-level totals of a finished rollout, before the terminal reward
#[derive(Debug, Clone, Copy, Default)]
struct Rollout {
    steps: usize,
    action_counts: [usize; NUM_ACTIONS],
    total_step_reward: f64,
}

fn rollout(env: &mut RegressionEnvironment, policy: &mut dyn Policy) -> Result<Rollout> {
    let mut state = env.reset();
    policy.reset();
    let mut totals = Rollout::default();

    loop {
        let action = policy.sample(&state);
        let result = env.response(action)?;

        totals.steps = result.info.step;
        totals.action_counts[action.to_index()] += 1;
        totals.total_step_reward += result.reward;
        state = result.observation;

        if result.done {
            return Ok(totals);
        }
    }
}

fn finish_episode(
    env: &RegressionEnvironment,
    episode: usize,
    totals: Rollout,
    reward_baseline: &mut DecayedBaseline,
) -> Result<EpisodeResult> {
    let terminal = env.final_reward(reward_baseline)?;
    let test_loss = env.evaluate_test()?.loss;

    Ok(EpisodeResult {
        episode,
        steps: totals.steps,
        best_step: env.episode().best_step(),
        best_loss: env.episode().best_loss(),
        test_loss,
        reward: terminal.reward,
        advantage: terminal.advantage,
        action_counts: totals.action_counts,
        total_step_reward: totals.total_step_reward,
        termination: env.episode().termination(),
    })
}

/// Play one episode to termination and score it
pub fn run_episode(
    env: &mut RegressionEnvironment,
    policy: &mut dyn Policy,
    reward_baseline: &mut DecayedBaseline,
    episode: usize,
) -> Result<EpisodeResult> {
    let totals = rollout(env, policy)?;
    let result = finish_episode(env, episode, totals, reward_baseline)?;
    policy.end_episode();
    Ok(result)
}

/// Training statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingStats {
    /// Total episodes completed
    pub episodes: usize,
    /// Total inner steps taken
    pub steps: usize,
    /// Best terminal reward so far
    pub best_reward: Option<f64>,
    /// Episode that produced `best_reward`
    pub best_episode: Option<usize>,
    /// Episodes since the terminal reward last improved
    pub endurance: usize,
    /// The loop stopped before `total_episodes`
    pub stopped_early: bool,
}

/// Outer loop over controller episodes
///
/// The reward baseline is owned here and persists across every episode the
/// loop runs, including episodes played concurrently.
pub struct TrainingLoop {
    config: ControllerConfig,
    reward_baseline: Arc<Mutex<DecayedBaseline>>,
    stats: TrainingStats,
}

impl TrainingLoop {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            reward_baseline: Arc::new(Mutex::new(DecayedBaseline::new())),
            stats: TrainingStats::default(),
        }
    }

    /// Get current stats
    pub fn stats(&self) -> &TrainingStats {
        &self.stats
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Current value of the controller-scope reward baseline
    pub async fn reward_baseline(&self) -> Option<f64> {
        self.reward_baseline.lock().await.value()
    }

    /// Record a finished episode; returns true when the loop should stop
    fn record(&mut self, result: &EpisodeResult) -> bool {
        self.stats.episodes += 1;
        self.stats.steps += result.steps;

        let improved = match self.stats.best_reward {
            None => true,
            Some(best) => result.reward > best,
        };
        if improved {
            self.stats.best_reward = Some(result.reward);
            self.stats.best_episode = Some(result.episode);
            self.stats.endurance = 0;
        } else {
            self.stats.endurance += 1;
        }

        info!(
            "Episode {}/{}: steps={}, best_loss={:?}, test_loss={:.4}, reward={:.2}, advantage={:.3}, mse/l1={}/{}",
            result.episode + 1,
            self.config.total_episodes,
            result.steps,
            result.best_loss,
            result.test_loss,
            result.reward,
            result.advantage,
            result.action_counts[0],
            result.action_counts[1],
        );

        if self.stats.endurance >= self.config.max_endurance_ctrl {
            info!(
                endurance = self.stats.endurance,
                best_episode = ?self.stats.best_episode,
                "Terminal reward stopped improving, ending training"
            );
            self.stats.stopped_early = true;
            return true;
        }
        false
    }

    /// Run episodes one after another on a single environment
    pub fn run(
        &mut self,
        env: &mut RegressionEnvironment,
        policy: &mut dyn Policy,
    ) -> Result<Vec<EpisodeResult>> {
        let mut results = Vec::with_capacity(self.config.total_episodes);
        info!(
            controller = policy.name(),
            mode = %env.mode(),
            episodes = self.config.total_episodes,
            "Starting controller episodes"
        );

        for episode in 0..self.config.total_episodes {
            let totals = rollout(env, policy)?;
            let result = {
                // Nothing else holds the baseline between parallel runs
                let mut baseline = self.reward_baseline.try_lock().map_err(|_| {
                    LossCtlError::Internal("reward baseline is held by a rollout".to_string())
                })?;
                finish_episode(env, episode, totals, &mut baseline)?
            };
            policy.end_episode();

            let stop = self.record(&result);
            results.push(result);
            if stop {
                break;
            }
        }

        Ok(results)
    }

    /// Run episodes in batches of `parallel_rollouts`, each worker owning its
    /// own environment and policy
    ///
    /// `build_worker` is called once per worker index. Terminal rewards update
    /// the shared baseline in completion order.
    pub async fn run_parallel<F>(&mut self, mut build_worker: F) -> Result<Vec<EpisodeResult>>
    where
        F: FnMut(usize) -> Result<(RegressionEnvironment, Box<dyn Policy>)>,
    {
        let num_workers = self.config.parallel_rollouts.max(1);
        let mut workers = (0..num_workers)
            .map(&mut build_worker)
            .collect::<Result<Vec<_>>>()?;
        info!(
            workers = num_workers,
            episodes = self.config.total_episodes,
            "Starting parallel controller episodes"
        );

        let mut results = Vec::with_capacity(self.config.total_episodes);
        let mut next_episode = 0;

        while next_episode < self.config.total_episodes {
            let batch = num_workers.min(self.config.total_episodes - next_episode);
            let mut handles = Vec::with_capacity(batch);

            for (offset, (mut env, mut policy)) in workers.drain(..batch).enumerate() {
                let episode = next_episode + offset;
                let baseline = Arc::clone(&self.reward_baseline);
                handles.push(tokio::task::spawn_blocking(move || {
                    let outcome = rollout(&mut env, policy.as_mut()).and_then(|totals| {
                        let mut baseline = baseline.blocking_lock();
                        finish_episode(&env, episode, totals, &mut baseline)
                    });
                    policy.end_episode();
                    (env, policy, outcome)
                }));
            }
            next_episode += batch;

            // Join every rollout before returning an error
            let mut first_error = None;
            let mut batch_results = Vec::with_capacity(batch);
            for handle in handles {
                match handle.await {
                    Ok((env, policy, outcome)) => {
                        workers.push((env, policy));
                        match outcome {
                            Ok(result) => batch_results.push(result),
                            Err(e) => {
                                first_error.get_or_insert(e);
                            }
                        }
                    }
                    Err(e) => {
                        first_error.get_or_insert(LossCtlError::Internal(format!(
                            "rollout worker failed: {e}"
                        )));
                    }
                }
            }
            if let Some(e) = first_error {
                warn!(error = %e, "Rollout batch failed");
                return Err(e);
            }

            // Every finished episode fed the baseline; record all of them
            batch_results.sort_by_key(|r| r.episode);
            let mut stop = false;
            for result in batch_results {
                stop |= self.record(&result);
                results.push(result);
            }
            if stop {
                break;
            }
            debug!(completed = results.len(), "Rollout batch complete");
        }

        Ok(results)
    }
}

/// Calculate training summary statistics
pub fn summarize_results(results: &[EpisodeResult]) -> TrainingSummary {
    if results.is_empty() {
        return TrainingSummary::default();
    }

    let n = results.len() as f64;

    let avg_reward = results.iter().map(|r| r.reward).sum::<f64>() / n;
    let avg_advantage = results.iter().map(|r| r.advantage).sum::<f64>() / n;
    let avg_steps = results.iter().map(|r| r.steps as f64).sum::<f64>() / n;
    let avg_test_loss = results.iter().map(|r| r.test_loss).sum::<f64>() / n;
    let best_test_loss = results
        .iter()
        .map(|r| r.test_loss)
        .fold(f64::INFINITY, f64::min);

    let best_losses: Vec<f64> = results.iter().filter_map(|r| r.best_loss).collect();
    let avg_best_loss = if best_losses.is_empty() {
        None
    } else {
        Some(best_losses.iter().sum::<f64>() / best_losses.len() as f64)
    };

    let mut action_counts = [0usize; NUM_ACTIONS];
    for r in results {
        for (total, count) in action_counts.iter_mut().zip(r.action_counts.iter()) {
            *total += count;
        }
    }
    let total_actions: usize = action_counts.iter().sum();
    let mse_fraction = if total_actions > 0 {
        action_counts[0] as f64 / total_actions as f64
    } else {
        0.0
    };

    if avg_test_loss.is_nan() {
        warn!("Test loss is NaN in at least one episode");
    }

    TrainingSummary {
        num_episodes: results.len(),
        total_steps: results.iter().map(|r| r.steps).sum(),
        avg_reward,
        avg_advantage,
        avg_episode_length: avg_steps,
        avg_best_loss,
        avg_test_loss,
        best_test_loss,
        mse_fraction,
    }
}

/// Training summary statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    /// Number of episodes
    pub num_episodes: usize,
    /// Inner steps over all episodes
    pub total_steps: usize,
    /// Average terminal reward per episode
    pub avg_reward: f64,
    pub avg_advantage: f64,
    /// Average episode length
    pub avg_episode_length: f64,
    /// Average best validation loss
    pub avg_best_loss: Option<f64>,
    pub avg_test_loss: f64,
    pub best_test_loss: f64,
    /// Share of steps that optimized the MSE objective
    pub mse_fraction: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataSplits;
    use crate::rl::config::{DataConfig, RewardConfig, TaskConfig};
    use crate::rl::core::LossAction;
    use crate::rl::policy::{DesignedPolicy, FixedPolicy};
    use crate::task::{MockTaskModel, QuadraticRegressor};

    fn task() -> TaskConfig {
        TaskConfig {
            dim_input_task: 3,
            batch_size: 8,
            lr_task: 0.01,
            valid_frequency_task: 5,
            max_endurance_task: 3,
            max_training_step: 40,
            ..TaskConfig::default()
        }
    }

    fn data() -> DataConfig {
        DataConfig {
            num_sample_train_ctrl: 32,
            num_sample_valid_ctrl: 16,
            num_sample_train_task: 32,
            num_sample_valid_task: 16,
            num_sample_test: 16,
            ..DataConfig::default()
        }
    }

    fn environment() -> RegressionEnvironment {
        let config = task();
        let splits = DataSplits::generate(&data(), config.dim_input_task).unwrap();
        let model = QuadraticRegressor::from_config(&config);
        RegressionEnvironment::new(&config, RewardConfig::default(), Box::new(model), splits)
            .unwrap()
    }

    fn result(episode: usize, reward: f64) -> EpisodeResult {
        EpisodeResult {
            episode,
            steps: 10,
            best_step: Some(5),
            best_loss: Some(2.0),
            test_loss: 3.0,
            reward,
            advantage: 0.0,
            action_counts: [6, 4],
            total_step_reward: 1.0,
            termination: Some(TerminationReason::StepBudget),
        }
    }

    #[test]
    fn test_run_episode_counts_actions() {
        let mut env = environment();
        let mut policy = DesignedPolicy::new();
        let mut baseline = DecayedBaseline::new();

        let result = run_episode(&mut env, &mut policy, &mut baseline, 0).unwrap();
        assert!(result.steps > 0 && result.steps <= 41);
        assert_eq!(result.action_counts.iter().sum::<usize>(), result.steps);
        assert!(result.best_loss.is_some());
        assert!(result.reward > 0.0);
        assert_eq!(baseline.value(), Some(result.reward));
    }

    #[test]
    fn test_episodes_are_reproducible() {
        let play = || {
            let mut baseline = DecayedBaseline::new();
            let mut policy = FixedPolicy::new(LossAction::OptimizeMse);
            run_episode(&mut environment(), &mut policy, &mut baseline, 0).unwrap()
        };
        assert_eq!(play(), play());
    }

    #[test]
    fn test_loop_stops_when_reward_stalls() {
        let config = ControllerConfig {
            total_episodes: 10,
            max_endurance_ctrl: 2,
            ..ControllerConfig::default()
        };
        let mut training = TrainingLoop::new(config);

        assert!(!training.record(&result(0, 5.0)));
        assert!(!training.record(&result(1, 4.0)));
        assert!(training.record(&result(2, 5.0)));
        assert!(training.stats().stopped_early);
        assert_eq!(training.stats().best_episode, Some(0));
    }

    #[test]
    fn test_improvement_resets_endurance() {
        let mut training = TrainingLoop::new(ControllerConfig::default());
        training.record(&result(0, 5.0));
        training.record(&result(1, 4.0));
        assert_eq!(training.stats().endurance, 1);
        training.record(&result(2, 6.0));
        assert_eq!(training.stats().endurance, 0);
        assert_eq!(training.stats().best_reward, Some(6.0));
    }

    #[test]
    fn test_sequential_run() {
        let config = ControllerConfig {
            total_episodes: 3,
            ..ControllerConfig::default()
        };
        let mut training = TrainingLoop::new(config);
        let mut env = environment();
        let mut policy = DesignedPolicy::new();

        let results = training.run(&mut env, &mut policy).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.best_loss.is_some()));
        assert_eq!(training.stats().episodes, 3);
        assert_eq!(
            training.stats().steps,
            results.iter().map(|r| r.steps).sum::<usize>()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parallel_run() {
        let config = ControllerConfig {
            total_episodes: 5,
            parallel_rollouts: 2,
            ..ControllerConfig::default()
        };
        let mut training = TrainingLoop::new(config);

        let results = training
            .run_parallel(|_| {
                let policy: Box<dyn Policy> = Box::new(DesignedPolicy::new());
                Ok((environment(), policy))
            })
            .await
            .unwrap();

        assert_eq!(results.len(), 5);
        let episodes: Vec<_> = results.iter().map(|r| r.episode).collect();
        assert_eq!(episodes, vec![0, 1, 2, 3, 4]);
        assert!(training.reward_baseline().await.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 3)]
    async fn test_parallel_stop_records_whole_batch() {
        let config = ControllerConfig {
            total_episodes: 6,
            parallel_rollouts: 3,
            max_endurance_ctrl: 1,
            ..ControllerConfig::default()
        };
        let mut training = TrainingLoop::new(config);

        // Identical workers earn identical rewards, so episode 1 triggers the stop
        let results = training
            .run_parallel(|_| {
                let policy: Box<dyn Policy> = Box::new(FixedPolicy::new(LossAction::OptimizeMse));
                Ok((environment(), policy))
            })
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(training.stats().episodes, 3);
        assert!(training.stats().stopped_early);
        assert_eq!(training.stats().best_episode, Some(0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parallel_error_waits_for_batch() {
        let config = ControllerConfig {
            total_episodes: 2,
            parallel_rollouts: 2,
            ..ControllerConfig::default()
        };
        let mut training = TrainingLoop::new(config);

        let err = training
            .run_parallel(|worker| {
                let policy: Box<dyn Policy> = Box::new(FixedPolicy::new(LossAction::OptimizeMse));
                if worker > 0 {
                    return Ok((environment(), policy));
                }
                let mut model = MockTaskModel::new();
                model.expect_reset().return_const(());
                model
                    .expect_train_step()
                    .returning(|_, _| Err(LossCtlError::Internal("diverged".to_string())));
                let splits = DataSplits::generate(&data(), task().dim_input_task)?;
                let env = RegressionEnvironment::new(
                    &task(),
                    RewardConfig::default(),
                    Box::new(model),
                    splits,
                )?;
                Ok((env, policy))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, LossCtlError::Internal(ref m) if m == "diverged"));
        // The healthy worker finished before the error was returned
        assert!(training.reward_baseline().await.is_some());
        assert_eq!(training.stats().episodes, 0);
    }

    #[test]
    fn test_summarize_results() {
        let mut second = result(1, 7.0);
        second.test_loss = 1.0;
        second.best_loss = None;
        let summary = summarize_results(&[result(0, 5.0), second]);

        assert_eq!(summary.num_episodes, 2);
        assert_eq!(summary.total_steps, 20);
        assert_eq!(summary.avg_reward, 6.0);
        assert_eq!(summary.avg_test_loss, 2.0);
        assert_eq!(summary.best_test_loss, 1.0);
        assert_eq!(summary.avg_best_loss, Some(2.0));
        assert!((summary.mse_fraction - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_summarize_empty() {
        assert_eq!(summarize_results(&[]), TrainingSummary::default());
    }
}
