//! Classifier capability interface and the inference adapter around it.
//!
//! The fall model itself is an opaque, pre-trained artifact. This module
//! defines the narrow backend contract the rest of the pipeline depends on
//! (tensor specs in, tensor data out) and the adapter that converts feature
//! windows to the model's numeric domain and back.
//!
//! # Feature Flag
//!
//! A TensorFlow Lite backend is available when the `tflite` feature is
//! enabled:
//!
//! ```toml
//! [dependencies]
//! safeguard-agent = { version = "0.1", features = ["tflite"] }
//! ```
//!
//! Without a compiled-in backend the adapter runs in degraded mode: it keeps
//! answering with neutral probabilities so monitoring and telemetry continue
//! with detection disabled.

mod adapter;

#[cfg(feature = "tflite")]
pub mod tflite;

pub use adapter::{dequantize, quantize, FallClassifier};

use std::path::Path;

/// Element type of a model tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorDtype {
    Float32,
    Int8,
}

/// Affine quantization parameters declared by the model.
///
/// Maps a real value `v` to its integer encoding
/// `round(v / scale + zero_point)` and back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantParams {
    pub scale: f32,
    pub zero_point: i32,
}

impl QuantParams {
    /// Identity mapping, used when a quantized tensor declares no parameters.
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            zero_point: 0,
        }
    }
}

/// Shape, dtype and quantization of one model tensor.
#[derive(Debug, Clone)]
pub struct TensorSpec {
    pub shape: Vec<usize>,
    pub dtype: TensorDtype,
    pub quantization: Option<QuantParams>,
}

/// Raw tensor payload crossing the backend boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    Float32(Vec<f32>),
    Int8(Vec<i8>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            TensorData::Float32(v) => v.len(),
            TensorData::Int8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Errors from a classifier backend.
#[derive(Debug)]
pub enum BackendError {
    /// The model could not be loaded or initialized. Permanent for the
    /// process lifetime; there is no hot-reload.
    Load(String),
    /// A single invocation failed.
    Invoke(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Load(msg) => write!(f, "Classifier load error: {msg}"),
            BackendError::Invoke(msg) => write!(f, "Classifier invoke error: {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}

/// The opaque classifier capability.
///
/// One conforming implementation exists per interpreter backend; the
/// pipeline only ever sees this trait, selected at construction time.
pub trait ClassifierBackend: Send {
    fn input_spec(&self) -> &TensorSpec;
    fn output_spec(&self) -> &TensorSpec;
    fn invoke(&mut self, input: TensorData) -> Result<TensorData, BackendError>;
}

/// Load whichever backend was compiled in.
pub fn load_backend(model_path: &Path) -> Result<Box<dyn ClassifierBackend>, BackendError> {
    #[cfg(feature = "tflite")]
    {
        let backend = tflite::TfliteBackend::load(model_path)?;
        Ok(Box::new(backend))
    }

    #[cfg(not(feature = "tflite"))]
    {
        Err(BackendError::Load(format!(
            "no classifier backend compiled in (enable the `tflite` feature); model {} not loaded",
            model_path.display()
        )))
    }
}
