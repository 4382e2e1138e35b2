//! Training Infrastructure
//!
//! Episode loops, checkpointing, and result summaries.

pub mod checkpointing;
pub mod trainer;

pub use checkpointing::{step_name, CheckpointStore, Checkpointer};
pub use trainer::{
    run_episode, summarize_results, EpisodeResult, TrainingLoop, TrainingStats, TrainingSummary,
};
