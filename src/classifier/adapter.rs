//! Inference adapter between feature windows and the model backend.
//!
//! Flattens the sliding window into the model's input tensor, applying the
//! declared affine quantization when the model is int8, and converts the
//! class-probability pair back to floats on the way out.

use crate::classifier::{load_backend, ClassifierBackend, QuantParams, TensorData, TensorDtype};
use crate::core::window::SlidingWindow;
use std::path::Path;

/// Neutral prediction used whenever no usable model output exists.
const NO_PREDICTION: (f64, f64) = (0.0, 0.0);

/// Wraps the classifier capability, degrading to a permanent no-detection
/// mode when the model is missing or corrupt. The host keeps running
/// baseline monitoring either way.
pub struct FallClassifier {
    backend: Option<Box<dyn ClassifierBackend>>,
}

impl FallClassifier {
    /// Load the model at `path` through whichever backend is compiled in.
    ///
    /// Load failure is not an error at this level: the adapter logs it and
    /// runs disabled for the rest of the process lifetime.
    pub fn load(path: &Path) -> Self {
        match load_backend(path) {
            Ok(backend) => {
                tracing::info!(model = %path.display(), "fall model loaded");
                Self {
                    backend: Some(backend),
                }
            }
            Err(e) => {
                tracing::warn!(
                    model = %path.display(),
                    "fall detection disabled, monitoring continues: {e}"
                );
                Self { backend: None }
            }
        }
    }

    /// Wrap an already-constructed backend.
    pub fn with_backend(backend: Box<dyn ClassifierBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// An adapter with no model; `predict` always answers `(0.0, 0.0)`.
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn is_ready(&self) -> bool {
        self.backend.is_some()
    }

    /// Classify a full window, returning `(p_no_fall, p_fall)`.
    ///
    /// The pair sums to 1 by model construction; it is not re-normalized
    /// here. Any backend fault degrades this invocation to `(0.0, 0.0)`.
    pub fn predict(&mut self, window: &SlidingWindow) -> (f64, f64) {
        let Some(backend) = self.backend.as_mut() else {
            return NO_PREDICTION;
        };

        let flat: Vec<f32> = window
            .iter()
            .flat_map(|f| f.to_array())
            .map(|v| v as f32)
            .collect();

        let input_dtype = backend.input_spec().dtype;
        let input_quant = backend.input_spec().quantization;
        let output_quant = backend.output_spec().quantization;

        let input = match input_dtype {
            TensorDtype::Float32 => TensorData::Float32(flat),
            TensorDtype::Int8 => TensorData::Int8(quantize(
                &flat,
                input_quant.unwrap_or_else(QuantParams::identity),
            )),
        };

        let output = match backend.invoke(input) {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("classifier invocation failed, window skipped: {e}");
                return NO_PREDICTION;
            }
        };

        let probs: Vec<f32> = match output {
            TensorData::Float32(v) => v,
            TensorData::Int8(v) => {
                dequantize(&v, output_quant.unwrap_or_else(QuantParams::identity))
            }
        };

        if probs.len() < 2 {
            tracing::warn!(len = probs.len(), "model output too short, window skipped");
            return NO_PREDICTION;
        }

        (probs[0] as f64, probs[1] as f64)
    }
}

/// Encode real values with the model's affine parameters:
/// `round(v / scale + zero_point)`, saturating to the i8 range.
pub fn quantize(values: &[f32], q: QuantParams) -> Vec<i8> {
    values
        .iter()
        .map(|&v| {
            (v / q.scale + q.zero_point as f32)
                .round()
                .clamp(i8::MIN as f32, i8::MAX as f32) as i8
        })
        .collect()
}

/// Invert the affine encoding: `(raw - zero_point) * scale`.
pub fn dequantize(values: &[i8], q: QuantParams) -> Vec<f32> {
    values
        .iter()
        .map(|&v| (v as i32 - q.zero_point) as f32 * q.scale)
        .collect()
}
