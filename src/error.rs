use thiserror::Error;

/// Main error type for the loss controller
#[derive(Error, Debug)]
pub enum LossCtlError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Unrecognized task mode: {0} (expected one of: train, test, baseline)")]
    UnknownMode(String),

    #[error(
        "Unrecognized stop strategy: {0} (expected one of: exceeding_endurance, exceeding_total_steps)"
    )]
    UnknownStopStrategy(String),

    #[error("Unrecognized controller: {0}")]
    UnknownController(String),

    // Episode state errors
    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    // Numeric / data errors
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for LossCtlError
pub type Result<T> = std::result::Result<T, LossCtlError>;
