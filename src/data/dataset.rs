//! Regression dataset with epoch-shuffled minibatches.

use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{LossCtlError, Result};

/// One batch of examples
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Shape [n, dim]
    pub input: Array2<f64>,
    /// Shape [n]
    pub target: Array1<f64>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }
}

#[derive(Serialize, Deserialize)]
struct DatasetFile {
    input: Array2<f64>,
    target: Array1<f64>,
}

/// Examples of one split
///
/// `next_batch(n)` walks a shuffled order and reshuffles at every epoch
/// boundary; asking for at least `num_examples` returns the full split in
/// stored order.
#[derive(Debug, Clone)]
pub struct Dataset {
    input: Array2<f64>,
    target: Array1<f64>,
    order: Vec<usize>,
    cursor: usize,
    rng: StdRng,
}

impl Dataset {
    pub fn new(input: Array2<f64>, target: Array1<f64>, seed: u64) -> Result<Self> {
        if input.nrows() != target.len() {
            return Err(LossCtlError::ShapeMismatch {
                expected: format!("{} targets", input.nrows()),
                actual: format!("{}", target.len()),
            });
        }
        if input.nrows() == 0 {
            return Err(LossCtlError::Dataset("dataset has no examples".to_string()));
        }

        let mut dataset = Self {
            order: (0..input.nrows()).collect(),
            input,
            target,
            cursor: 0,
            rng: StdRng::seed_from_u64(seed),
        };
        dataset.reseed(seed);
        Ok(dataset)
    }

    /// Restart the minibatch order as if the dataset was built with `seed`
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
        self.order = (0..self.num_examples()).collect();
        self.order.shuffle(&mut self.rng);
        self.cursor = 0;
    }

    pub fn num_examples(&self) -> usize {
        self.target.len()
    }

    /// Input dimension
    pub fn dim(&self) -> usize {
        self.input.ncols()
    }

    /// Next minibatch of `batch_size` examples
    pub fn next_batch(&mut self, batch_size: usize) -> Batch {
        if batch_size >= self.num_examples() {
            return self.full_batch();
        }

        let mut indices = Vec::with_capacity(batch_size);
        while indices.len() < batch_size {
            if self.cursor == self.order.len() {
                self.order.shuffle(&mut self.rng);
                self.cursor = 0;
            }
            let take = (batch_size - indices.len()).min(self.order.len() - self.cursor);
            indices.extend_from_slice(&self.order[self.cursor..self.cursor + take]);
            self.cursor += take;
        }

        Batch {
            input: self.input.select(Axis(0), &indices),
            target: self.target.select(Axis(0), &indices),
        }
    }

    /// All examples in stored order
    pub fn full_batch(&self) -> Batch {
        Batch {
            input: self.input.clone(),
            target: self.target.clone(),
        }
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = DatasetFile {
            input: self.input.clone(),
            target: self.target.clone(),
        };
        fs::write(path, serde_json::to_string(&file)?)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P, seed: u64) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let file: DatasetFile = serde_json::from_str(&raw)?;
        Self::new(file.input, file.target, seed)
    }
}
