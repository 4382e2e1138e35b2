//! Experience Memory
//!
//! Sliding histories of recent training statistics.

pub mod metrics_history;

pub use metrics_history::{GradientMagnitudes, MetricsHistory, MetricsWindow, StepMetrics};
