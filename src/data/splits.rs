//! Dataset splits and their selection by task mode.

use std::path::Path;

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, StandardNormal};
use tracing::{debug, info};

use super::dataset::Dataset;
use crate::error::{LossCtlError, Result};
use crate::rl::config::{DataConfig, TaskMode};

/// Split file names inside the data directory
pub const SPLIT_NAMES: [&str; 5] = [
    "train_ctrl",
    "valid_ctrl",
    "train_task",
    "valid_task",
    "test",
];

/// Seed distance between parallel workers; larger than the split offsets
const WORKER_SEED_STRIDE: u64 = 8;

/// Train/validation pair an episode runs on
#[derive(Debug, Clone)]
pub struct SplitPair {
    pub train: Dataset,
    pub valid: Dataset,
}

/// All five splits of the regression task
///
/// The `*_ctrl` splits are used while training the controller, the `*_task`
/// splits when evaluating it, and `test` only for final reporting.
#[derive(Debug, Clone)]
pub struct DataSplits {
    pub train_ctrl: Dataset,
    pub valid_ctrl: Dataset,
    pub train_task: Dataset,
    pub valid_task: Dataset,
    pub test: Dataset,
}

impl DataSplits {
    /// Train/validation pair for `mode`, plus the test split
    pub fn select(self, mode: TaskMode) -> (SplitPair, Dataset) {
        let pair = match mode {
            TaskMode::Train => SplitPair {
                train: self.train_ctrl,
                valid: self.valid_ctrl,
            },
            TaskMode::Test | TaskMode::Baseline => SplitPair {
                train: self.train_task,
                valid: self.valid_task,
            },
        };
        (pair, self.test)
    }

    pub fn dim(&self) -> usize {
        self.train_ctrl.dim()
    }

    fn datasets(&self) -> [&Dataset; 5] {
        [
            &self.train_ctrl,
            &self.valid_ctrl,
            &self.train_task,
            &self.valid_task,
            &self.test,
        ]
    }

    fn datasets_mut(&mut self) -> [&mut Dataset; 5] {
        [
            &mut self.train_ctrl,
            &mut self.valid_ctrl,
            &mut self.train_task,
            &mut self.valid_task,
            &mut self.test,
        ]
    }

    /// Restart every split's minibatch order from `seed`, offset per split
    pub fn reseed(&mut self, seed: u64) {
        for (offset, dataset) in (1u64..).zip(self.datasets_mut()) {
            dataset.reseed(seed.wrapping_add(offset));
        }
    }

    /// Copy of the splits for parallel worker `worker`
    ///
    /// The examples are shared; the batch order is seeded per worker. Worker 0
    /// keeps the order the splits were created with.
    pub fn for_worker(&self, seed: u64, worker: usize) -> Self {
        let mut splits = self.clone();
        splits.reseed(seed.wrapping_add(WORKER_SEED_STRIDE.wrapping_mul(worker as u64)));
        splits
    }

    /// Sample every split from one hidden quadratic function
    pub fn generate(config: &DataConfig, dim: usize) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let truth = HiddenQuadratic::sample(dim, &mut rng);
        let noise = Normal::new(config.mean_noise, config.var_noise.sqrt())
            .map_err(|e| LossCtlError::Dataset(format!("invalid noise distribution: {e}")))?;

        let mut split = |n: usize, offset: u64| -> Result<Dataset> {
            let input = Array2::from_shape_fn((n, dim), |_| rng.sample::<f64, _>(StandardNormal));
            let clean = truth.predict(&input);
            let target = clean.mapv(|y| y + noise.sample(&mut rng));
            Dataset::new(input, target, config.seed.wrapping_add(offset))
        };

        let splits = Self {
            train_ctrl: split(config.num_sample_train_ctrl, 1)?,
            valid_ctrl: split(config.num_sample_valid_ctrl, 2)?,
            train_task: split(config.num_sample_train_task, 3)?,
            valid_task: split(config.num_sample_valid_task, 4)?,
            test: split(config.num_sample_test, 5)?,
        };
        debug!(dim, seed = config.seed, "Generated synthetic regression splits");
        Ok(splits)
    }

    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        for (name, dataset) in SPLIT_NAMES.iter().zip(self.datasets()) {
            dataset.save_json(dir.join(format!("{name}.json")))?;
        }
        info!("Saved dataset splits to {:?}", dir);
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(dir: P, seed: u64) -> Result<Self> {
        let dir = dir.as_ref();
        let load = |name: &str, offset: u64| {
            Dataset::load_json(dir.join(format!("{name}.json")), seed.wrapping_add(offset))
        };
        let splits = Self {
            train_ctrl: load(SPLIT_NAMES[0], 1)?,
            valid_ctrl: load(SPLIT_NAMES[1], 2)?,
            train_task: load(SPLIT_NAMES[2], 3)?,
            valid_task: load(SPLIT_NAMES[3], 4)?,
            test: load(SPLIT_NAMES[4], 5)?,
        };

        let dim = splits.dim();
        if splits.datasets().iter().any(|d| d.dim() != dim) {
            return Err(LossCtlError::Dataset(format!(
                "splits in {:?} disagree on input dimension",
                dir
            )));
        }
        Ok(splits)
    }

    /// Load the splits from `config.data_dir`, generating and saving them first
    /// when any file is missing
    pub fn load_or_generate(config: &DataConfig, dim: usize) -> Result<Self> {
        let dir = Path::new(&config.data_dir);
        let complete = SPLIT_NAMES
            .iter()
            .all(|name| dir.join(format!("{name}.json")).exists());

        if complete {
            let splits = Self::load(dir, config.seed)?;
            if splits.dim() != dim {
                return Err(LossCtlError::ShapeMismatch {
                    expected: format!("input dimension {dim}"),
                    actual: format!("{}", splits.dim()),
                });
            }
            info!("Loaded dataset splits from {:?}", dir);
            return Ok(splits);
        }

        let splits = Self::generate(config, dim)?;
        splits.save(dir)?;
        Ok(splits)
    }
}

/// Sparse quadratic ground truth: y = x·w1 + xᵀ W2 x / 10
struct HiddenQuadratic {
    w1: Array1<f64>,
    w2: Array2<f64>,
}

impl HiddenQuadratic {
    fn sample(dim: usize, rng: &mut StdRng) -> Self {
        // Only half of the first-order and a quarter of the second-order
        // terms are active, so the L1 objective has something to prune
        let w1 = Array1::from_shape_fn(dim, |i| {
            if i % 2 == 0 {
                rng.sample::<f64, _>(StandardNormal)
            } else {
                0.0
            }
        });
        let w2 = Array2::from_shape_fn((dim, dim), |(i, j)| {
            if i % 2 == 0 && j % 2 == 0 {
                rng.sample::<f64, _>(StandardNormal)
            } else {
                0.0
            }
        });
        Self { w1, w2 }
    }

    fn predict(&self, input: &Array2<f64>) -> Array1<f64> {
        let first = input.dot(&self.w1);
        let second = (input.dot(&self.w2) * input).sum_axis(Axis(1));
        first + second / 10.0
    }
}
