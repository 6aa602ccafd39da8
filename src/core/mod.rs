//! Core pipeline leaves for the SafeGuard agent.
//!
//! This module contains:
//! - Per-sample feature extraction (magnitudes, jerk)
//! - The fixed-capacity sliding window fed to the classifier
//! - The adaptive-threshold calibration state machine

pub mod calibration;
pub mod features;
pub mod window;

// Re-export commonly used types
pub use calibration::{
    ActivityProfile, CalibrationController, CalibrationResult, SystemState, CALIBRATION_SECS,
    DEFAULT_THRESHOLD, UNCALIBRATED_LABEL,
};
pub use features::{
    FeatureExtractor, FeatureVector, SensorSample, FEATURE_COUNT, SAMPLING_RATE_HZ,
};
pub use window::{SlidingWindow, WINDOW_SAMPLES};
