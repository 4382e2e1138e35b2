pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod rl;
pub mod task;

pub use config::AppConfig;
pub use error::{LossCtlError, Result};
pub use rl::{
    LossAction, RegressionEnvironment, RewardShaper, StepResult, TrainingLoop, TrainingSummary,
};
pub use task::{QuadraticRegressor, TaskModel};
