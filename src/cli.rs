use clap::{Args, Parser, Subcommand};

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "lossctl")]
#[command(version)]
#[command(
    about = "Episodic loss controller for a toy quadratic regression task",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and <env>.toml
    #[arg(short, long, default_value = "config", env = "LOSSCTL_CONFIG_DIR", global = true)]
    pub config_dir: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run controller episodes
    Run(RunArgs),
    /// Generate the synthetic dataset splits
    GenerateData {
        /// Output directory (defaults to data.data_dir)
        #[arg(short, long)]
        output: Option<String>,
        /// Input dimension (defaults to task.dim_input_task)
        #[arg(long)]
        dim: Option<usize>,
        /// Overwrite existing split files
        #[arg(long)]
        force: bool,
    },
    /// Show the effective configuration
    Config {
        /// Only validate, print nothing on success
        #[arg(long)]
        check: bool,
    },
}

/// Overrides for `run`; unset flags keep the configured value
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// train, test or baseline
    #[arg(short, long)]
    pub mode: Option<String>,
    /// designed, mse, l1, random or epsilon_greedy
    #[arg(short = 'C', long)]
    pub controller: Option<String>,
    /// Number of episodes
    #[arg(short, long)]
    pub episodes: Option<usize>,
    /// Episodes run concurrently
    #[arg(short, long)]
    pub parallel: Option<usize>,
    /// Checkpoint directory
    #[arg(long)]
    pub checkpoint: Option<String>,
    /// Write per-episode results and the summary as JSON
    #[arg(short, long)]
    pub output: Option<String>,
}

impl RunArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(mode) = &self.mode {
            config.task.mode = mode.clone();
        }
        if let Some(controller) = &self.controller {
            config.controller.name = controller.clone();
        }
        if let Some(episodes) = self.episodes {
            config.controller.total_episodes = episodes;
        }
        if let Some(parallel) = self.parallel {
            config.controller.parallel_rollouts = parallel;
        }
        if let Some(dir) = &self.checkpoint {
            config.checkpoint.checkpoint_dir = dir.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_overrides() {
        let cli = Cli::try_parse_from([
            "lossctl", "run", "--mode", "test", "-C", "mse", "--episodes", "3", "--parallel", "2",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let mut config = AppConfig::default();
        args.apply(&mut config);
        assert_eq!(config.task.mode, "test");
        assert_eq!(config.controller.name, "mse");
        assert_eq!(config.controller.total_episodes, 3);
        assert_eq!(config.controller.parallel_rollouts, 2);
        assert_eq!(config.checkpoint.checkpoint_dir, "./ckpts");
    }

    #[test]
    fn test_parse_generate_data() {
        let cli =
            Cli::try_parse_from(["lossctl", "generate-data", "--dim", "4", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::GenerateData {
                dim: Some(4),
                force: true,
                ..
            }
        ));
    }

    #[test]
    fn test_run_without_flags_keeps_config() {
        let mut config = AppConfig::default();
        RunArgs::default().apply(&mut config);
        assert_eq!(config.task.mode, AppConfig::default().task.mode);
        assert_eq!(config.controller.total_episodes, 400);
    }
}
