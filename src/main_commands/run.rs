use std::path::Path;

use lossctl::config::AppConfig;
use lossctl::data::DataSplits;
use lossctl::error::Result;
use lossctl::rl::training::{
    summarize_results, Checkpointer, EpisodeResult, TrainingStats, TrainingSummary,
};
use lossctl::rl::{build_policy, RegressionEnvironment, TrainingLoop};
use lossctl::task::QuadraticRegressor;
use serde::Serialize;
use tracing::info;

#[derive(Serialize)]
struct RunReport<'a> {
    mode: &'a str,
    controller: &'a str,
    stats: &'a TrainingStats,
    summary: &'a TrainingSummary,
    episodes: &'a [EpisodeResult],
}

/// Run controller episodes as configured and print a summary
pub(crate) async fn run_episodes(config: &AppConfig, output: Option<&str>) -> Result<()> {
    let mode = config.task.task_mode()?;
    let task = config.task.clone();
    let reward = config.reward;
    let controller = config.controller.clone();
    let checkpoint = config.checkpoint.clone();
    let data_seed = config.data.seed;

    let splits = DataSplits::load_or_generate(&config.data, task.dim_input_task)?;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Loss Controller Episodes                       ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Mode:           {:<10}", mode);
    println!("║  Controller:     {:<10}", controller.name);
    println!("║  Episodes:       {:>6}", controller.total_episodes);
    println!("║  Parallel:       {:>6}", controller.parallel_rollouts);
    println!("║  Data:           {}", config.data.data_dir);
    if mode.saves_checkpoints() {
        println!("║  Checkpoints:    {}", checkpoint.checkpoint_dir);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");

    let mut training = TrainingLoop::new(controller.clone());
    let results = training
        .run_parallel(|worker| {
            let model = QuadraticRegressor::from_config(&task);
            let worker_splits = splits.for_worker(data_seed, worker);
            let mut env =
                RegressionEnvironment::new(&task, reward, Box::new(model), worker_splits)?;
            if mode.saves_checkpoints() {
                let checkpointer = Checkpointer::from_config(&checkpoint)
                    .with_prefix(format!("{}_w{}", mode, worker));
                env = env.with_checkpoints(Box::new(checkpointer));
            }
            let policy = build_policy(&controller, worker as u64)?;
            Ok((env, policy))
        })
        .await?;

    let summary = summarize_results(&results);
    let stats = training.stats();

    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║               Episodes Complete                              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Episodes:       {:>6}", summary.num_episodes);
    println!("║  Inner Steps:    {:>6}", summary.total_steps);
    println!("║  Avg Reward:     {:>10.2}", summary.avg_reward);
    println!("║  Avg Advantage:  {:>10.3}", summary.avg_advantage);
    if let Some(best_loss) = summary.avg_best_loss {
        println!("║  Avg Best Loss:  {:>10.4}", best_loss);
    }
    println!("║  Avg Test Loss:  {:>10.4}", summary.avg_test_loss);
    println!("║  Best Test Loss: {:>10.4}", summary.best_test_loss);
    println!("║  MSE Share:      {:>9.1}%", summary.mse_fraction * 100.0);
    if stats.stopped_early {
        println!("║  Stopped early after {} episodes without improvement", stats.endurance);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");

    if let Some(path) = output {
        let report = RunReport {
            mode: mode.as_str(),
            controller: &controller.name,
            stats,
            summary: &summary,
            episodes: &results,
        };
        let path = Path::new(path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        info!("Wrote run report to {:?}", path);
    }

    Ok(())
}
