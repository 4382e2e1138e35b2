//! Regression datasets
//!
//! Minibatch sampling, JSON persistence and synthetic generation of the
//! train/validation/test splits the task model runs on.

pub mod dataset;
pub mod splits;

pub use dataset::{Batch, Dataset};
pub use splits::{DataSplits, SplitPair, SPLIT_NAMES};
