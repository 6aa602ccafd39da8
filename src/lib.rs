//! SafeGuard Agent - wearable fall detection with adaptive calibration.
//!
//! This library turns a 100 Hz stream of six-axis IMU samples (plus skin
//! temperature) into debounced emergency alerts, adapting its sensitivity to
//! the wearer through a short calibration pass.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       SafeGuard Agent                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌─────────┐  │
//! │  │  Sample  │──▶│ Features │──▶│  Sliding  │──▶│  Fall   │  │
//! │  │   Feed   │   │ (jerk,   │   │  Window   │   │Classifier│ │
//! │  └──────────┘   │  mags)   │   │ (200×12)  │   └────┬────┘  │
//! │                 └────┬─────┘   └───────────┘        │       │
//! │                      │                              ▼       │
//! │                 ┌────▼──────┐                 ┌──────────┐  │
//! │                 │Calibration│                 │  Alert   │──┼──▶ Twilio
//! │                 │Controller │                 │Coordinator│ │
//! │                 └───────────┘                 └────┬─────┘  │
//! │                                                    ▼        │
//! │                                          status / events    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything runs on one sample-driven thread; only alert delivery and the
//! HTTP surface live elsewhere. A missing or corrupt model degrades the
//! agent to plain monitoring instead of taking it down.
//!
//! # Example
//!
//! ```no_run
//! use safeguard_agent::alert::{AlertCoordinator, LogOnlyDispatch};
//! use safeguard_agent::classifier::FallClassifier;
//! use safeguard_agent::pipeline::Orchestrator;
//! use safeguard_agent::stats::shared_counters;
//! use safeguard_agent::telemetry::{shared_status, NullSink};
//! use std::path::Path;
//!
//! let mut orchestrator = Orchestrator::new(
//!     FallClassifier::load(Path::new("fall_model_int8.tflite")),
//!     AlertCoordinator::new(Box::new(LogOnlyDispatch)),
//!     Box::new(NullSink),
//!     shared_status(),
//!     shared_counters(),
//! );
//!
//! // orchestrator.process_sample(sample) for each decoded reading
//! ```

pub mod alert;
pub mod classifier;
pub mod config;
pub mod core;
pub mod notifier;
pub mod pipeline;
pub mod source;
pub mod stats;
pub mod telemetry;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use alert::{AlertCoordinator, AlertDispatch, AlertPayload, Decision, Posture};
pub use classifier::{ClassifierBackend, FallClassifier, QuantParams, TensorData, TensorSpec};
pub use config::Config;
pub use core::{
    ActivityProfile, CalibrationController, FeatureExtractor, FeatureVector, SensorSample,
    SlidingWindow, SystemState,
};
pub use notifier::{NotifierClient, NotifierConfig, NotifierError};
pub use pipeline::Orchestrator;
pub use stats::{SessionCounters, SharedCounters};
pub use telemetry::{Command, EventSink, SharedStatus, StatusReport, UiEvent};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
