//! Model Checkpointing
//!
//! Save and load task model weights as JSON files.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::error::{LossCtlError, Result};
use crate::rl::config::CheckpointConfig;

const EXTENSION: &str = "json";

/// Destination for the weights of a new best model
#[cfg_attr(test, mockall::automock)]
pub trait CheckpointStore: Send {
    /// Persist `weights` recorded at inner training step `step`
    fn save(&mut self, step: usize, weights: &serde_json::Value) -> Result<PathBuf>;
}

/// Checkpointer for saving and loading model weights
#[derive(Debug, Clone)]
pub struct Checkpointer {
    /// Directory for checkpoints
    checkpoint_dir: PathBuf,
    /// Maximum checkpoints to keep
    max_checkpoints: usize,
    /// Name prefix of checkpoints written through [`CheckpointStore`]
    prefix: String,
    /// Names this checkpointer wrote, oldest first
    recent: VecDeque<String>,
}

impl Checkpointer {
    /// Create a new checkpointer
    pub fn new<P: AsRef<Path>>(checkpoint_dir: P, max_checkpoints: usize) -> Self {
        let checkpoint_dir = checkpoint_dir.as_ref().to_path_buf();

        if !checkpoint_dir.exists() {
            if let Err(e) = fs::create_dir_all(&checkpoint_dir) {
                warn!("Failed to create checkpoint directory: {}", e);
            }
        }

        Self {
            checkpoint_dir,
            max_checkpoints,
            prefix: "model".to_string(),
            recent: VecDeque::new(),
        }
    }

    pub fn from_config(config: &CheckpointConfig) -> Self {
        Self::new(&config.checkpoint_dir, config.max_checkpoints)
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    /// Get checkpoint path for a given name
    pub fn checkpoint_path(&self, name: &str) -> PathBuf {
        self.checkpoint_dir.join(format!("{}.{}", name, EXTENSION))
    }

    /// Save serializable weights under `name`
    ///
    /// Only checkpoints sharing this checkpointer's prefix are evicted, and
    /// never the one just written.
    pub fn save_named(&mut self, name: &str, weights: &serde_json::Value) -> Result<PathBuf> {
        let path = self.checkpoint_path(name);
        fs::create_dir_all(&self.checkpoint_dir)?;
        fs::write(&path, serde_json::to_string(weights)?).map_err(|e| {
            LossCtlError::Checkpoint(format!("Failed to save checkpoint {:?}: {}", path, e))
        })?;

        info!("Saved checkpoint to {:?}", path);

        self.recent.retain(|n| n != name);
        self.recent.push_back(name.to_string());
        self.cleanup_old_checkpoints(name);

        Ok(path)
    }

    /// Load the raw JSON of a checkpoint
    pub fn load(&self, name: &str) -> Result<serde_json::Value> {
        let path = self.checkpoint_path(name);

        if !path.exists() {
            return Err(LossCtlError::Checkpoint(format!(
                "Checkpoint not found: {:?}",
                path
            )));
        }

        let raw = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load a checkpoint into a typed weight record
    pub fn load_as<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        Ok(serde_json::from_value(self.load(name)?)?)
    }

    /// List available checkpoints
    pub fn list_checkpoints(&self) -> Vec<String> {
        let mut checkpoints = Vec::new();
        let suffix = format!(".{}", EXTENSION);

        if let Ok(entries) = fs::read_dir(&self.checkpoint_dir) {
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Some(stem) = name.strip_suffix(&suffix) {
                        checkpoints.push(stem.to_string());
                    }
                }
            }
        }

        checkpoints.sort();
        checkpoints
    }

    /// Get the most recently written checkpoint name
    pub fn latest_checkpoint(&self) -> Option<String> {
        let mut checkpoints = self.list_checkpoints();
        checkpoints.sort_by_key(|name| (self.modified(name), self.recency(name)));
        checkpoints.pop()
    }

    fn modified(&self, name: &str) -> Option<SystemTime> {
        fs::metadata(self.checkpoint_path(name))
            .and_then(|m| m.modified())
            .ok()
    }

    fn recency(&self, name: &str) -> Option<usize> {
        self.recent.iter().position(|n| n == name)
    }

    /// Remove the oldest checkpoints of this prefix beyond max_checkpoints
    ///
    /// Age is the save order of this checkpointer; files left by earlier
    /// runs count as older and are ordered by modification time.
    fn cleanup_old_checkpoints(&mut self, keep: &str) {
        let own = format!("{}_", self.prefix);
        let mut checkpoints: Vec<String> = self
            .list_checkpoints()
            .into_iter()
            .filter(|name| name.starts_with(&own) && name != keep)
            .collect();

        let limit = self.max_checkpoints.saturating_sub(1);
        if checkpoints.len() <= limit {
            return;
        }

        checkpoints.sort_by_key(|name| (self.recency(name), self.modified(name)));
        let to_remove = checkpoints.len() - limit;
        for name in checkpoints.into_iter().take(to_remove) {
            let path = self.checkpoint_path(&name);
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove old checkpoint {:?}: {}", path, e);
            } else {
                self.recent.retain(|n| n != &name);
                info!("Removed old checkpoint: {}", name);
            }
        }
    }

    /// Check if a checkpoint exists
    pub fn exists(&self, name: &str) -> bool {
        self.checkpoint_path(name).exists()
    }
}

impl CheckpointStore for Checkpointer {
    fn save(&mut self, step: usize, weights: &serde_json::Value) -> Result<PathBuf> {
        let name = step_name(&self.prefix, step);
        self.save_named(&name, weights)
    }
}

impl Default for Checkpointer {
    fn default() -> Self {
        Self::from_config(&CheckpointConfig::default())
    }
}

/// Generate a checkpoint name with inner training step
pub fn step_name(prefix: &str, step: usize) -> String {
    format!("{}_step{:08}", prefix, step)
}
