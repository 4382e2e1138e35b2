use std::path::Path;

use lossctl::config::AppConfig;
use lossctl::data::{DataSplits, SPLIT_NAMES};
use lossctl::error::Result;
use tracing::warn;

/// Generate and save the five dataset splits
pub(crate) fn generate_data(config: &AppConfig, dim: usize, force: bool) -> Result<()> {
    let dir = Path::new(&config.data.data_dir);
    let existing = SPLIT_NAMES
        .iter()
        .filter(|name| dir.join(format!("{name}.json")).exists())
        .count();

    if existing > 0 && !force {
        warn!(
            "{} split files already exist in {:?}, pass --force to overwrite",
            existing, dir
        );
        println!("Splits already present in {}, nothing generated", dir.display());
        return Ok(());
    }

    let splits = DataSplits::generate(&config.data, dim)?;
    splits.save(dir)?;

    println!("Generated dataset splits (dim {}) in {}", dim, dir.display());
    for (name, dataset) in SPLIT_NAMES.iter().zip([
        &splits.train_ctrl,
        &splits.valid_ctrl,
        &splits.train_task,
        &splits.valid_task,
        &splits.test,
    ]) {
        println!("  {:<12} {:>6} examples", name, dataset.num_examples());
    }
    Ok(())
}
