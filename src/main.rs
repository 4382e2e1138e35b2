use clap::Parser;
use lossctl::cli::{Cli, Commands};
use lossctl::config::AppConfig;
use lossctl::error::{LossCtlError, Result};
use tracing::error;

mod main_commands;
mod main_runtime;

use main_runtime::{init_logging, init_logging_simple};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load_from(&cli.config_dir)?;

    match &cli.command {
        Commands::Run(args) => {
            args.apply(&mut config);
            let _guard = init_logging(&config.logging);
            check_config(&config)?;
            config.log_config();
            let output = args.output.as_deref();
            if let Err(e) = main_commands::run::run_episodes(&config, output).await {
                error!("Run failed: {}", e);
                return Err(e);
            }
        }
        Commands::GenerateData { output, dim, force } => {
            init_logging_simple();
            if let Some(dir) = output {
                config.data.data_dir = dir.clone();
            }
            let dim = dim.unwrap_or(config.task.dim_input_task);
            main_commands::data::generate_data(&config, dim, *force)?;
        }
        Commands::Config { check } => {
            init_logging_simple();
            check_config(&config)?;
            if !*check {
                println!("{}", config.to_toml()?);
            }
        }
    }

    Ok(())
}

fn check_config(config: &AppConfig) -> Result<()> {
    config.validate().map_err(|errors| {
        for e in &errors {
            error!("Invalid configuration: {}", e);
        }
        LossCtlError::Validation(errors.join("; "))
    })
}
