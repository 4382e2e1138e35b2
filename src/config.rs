use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::Result;
use crate::rl::config::{CheckpointConfig, ControllerConfig, DataConfig, RewardConfig, TaskConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub task: TaskConfig,
    #[serde(default)]
    pub reward: RewardConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info,lossctl=debug".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> std::result::Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let defaults = Config::try_from(&AppConfig::default())?;

        let builder = Config::builder()
            // Start with default values
            .add_source(defaults)
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/test.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("LOSSCTL_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (LOSSCTL_TASK__BATCH_SIZE, etc.)
            .add_source(
                Environment::with_prefix("LOSSCTL")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let task = &self.task;
        let reward = &self.reward;

        if let Err(e) = task.task_mode() {
            errors.push(e.to_string());
        }
        if let Err(e) = task.stop_strategy() {
            errors.push(e.to_string());
        }

        // The step reward compares the two most recent validation losses
        if task.num_pre_loss < 2 {
            errors.push("num_pre_loss must be at least 2".to_string());
        }
        if task.valid_frequency_task == 0 {
            errors.push("valid_frequency_task must be positive".to_string());
        }
        if task.batch_size == 0 {
            errors.push("batch_size must be positive".to_string());
        }
        if task.dim_input_task == 0 {
            errors.push("dim_input_task must be positive".to_string());
        }
        if task.lr_task <= 0.0 {
            errors.push("lr_task must be positive".to_string());
        }

        if !(0.0..=1.0).contains(&reward.reward_baseline_decay) {
            errors.push("reward_baseline_decay must be between 0 and 1".to_string());
        }
        if reward.reward_max_value <= 0.0 {
            errors.push("reward_max_value must be positive".to_string());
        }
        if reward.reward_c <= 0.0 {
            errors.push("reward_c must be positive".to_string());
        }

        let ctrl = &self.controller;
        if ctrl.parallel_rollouts == 0 {
            errors.push("parallel_rollouts must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&ctrl.epsilon_start_ctrl)
            || !(0.0..=1.0).contains(&ctrl.epsilon_end_ctrl)
        {
            errors.push(
                "epsilon_start_ctrl and epsilon_end_ctrl must be between 0 and 1".to_string(),
            );
        }

        if self.data.var_noise < 0.0 {
            errors.push("var_noise must be non-negative".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Log every configuration key
    pub fn log_config(&self) {
        let task = &self.task;
        info!(
            mode = %task.mode,
            dim_input_task = task.dim_input_task,
            lambda_task = task.lambda_task,
            batch_size = task.batch_size,
            lr_task = task.lr_task,
            valid_frequency_task = task.valid_frequency_task,
            stop_strategy_task = %task.stop_strategy_task,
            max_endurance_task = task.max_endurance_task,
            max_training_step = task.max_training_step,
            num_pre_loss = task.num_pre_loss,
            "task config"
        );
        let reward = &self.reward;
        info!(
            reward_baseline_decay = reward.reward_baseline_decay,
            reward_c = reward.reward_c,
            reward_max_value = reward.reward_max_value,
            reward_step_ctrl = reward.reward_step_ctrl,
            "reward config"
        );
        let ctrl = &self.controller;
        info!(
            name = %ctrl.name,
            total_episodes = ctrl.total_episodes,
            max_endurance_ctrl = ctrl.max_endurance_ctrl,
            epsilon_start_ctrl = ctrl.epsilon_start_ctrl,
            epsilon_end_ctrl = ctrl.epsilon_end_ctrl,
            epsilon_decay_steps_ctrl = ctrl.epsilon_decay_steps_ctrl,
            parallel_rollouts = ctrl.parallel_rollouts,
            "controller config"
        );
        let data = &self.data;
        info!(
            data_dir = %data.data_dir,
            mean_noise = data.mean_noise,
            var_noise = data.var_noise,
            seed = data.seed,
            "data config"
        );
        info!(
            checkpoint_dir = %self.checkpoint.checkpoint_dir,
            max_checkpoints = self.checkpoint.max_checkpoints,
            "checkpoint config"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = AppConfig::default();
        config.task.mode = "eval".to_string();
        config.task.num_pre_loss = 1;
        config.reward.reward_baseline_decay = 1.5;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("eval"));
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let dir = std::env::temp_dir().join("lossctl_missing_config_dir");
        let config = AppConfig::load_from(&dir).unwrap();
        assert_eq!(config.task.num_pre_loss, 2);
        assert_eq!(config.reward.reward_c, 20_000.0);
        assert_eq!(config.controller.total_episodes, 400);
    }

    #[test]
    fn test_load_from_file_overrides() {
        let dir = std::env::temp_dir().join("lossctl_config_override");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("default.toml"),
            "[task]\nmode = \"test\"\nmax_training_step = 50\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&dir).unwrap();
        assert_eq!(config.task.mode, "test");
        assert_eq!(config.task.max_training_step, 50);
        // untouched keys keep their defaults
        assert_eq!(config.task.batch_size, 200);
    }

    #[test]
    fn test_to_toml_round_trips_section_names() {
        let rendered = AppConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[task]"));
        assert!(rendered.contains("reward_baseline_decay"));
    }
}
