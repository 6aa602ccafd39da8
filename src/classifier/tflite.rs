//! TensorFlow Lite backend for the fall model.
//!
//! Wraps `tflitec` behind the [`ClassifierBackend`] contract. Tensor shape,
//! dtype and quantization parameters are introspected once at load time so
//! the adapter never touches interpreter internals.

use crate::classifier::{
    BackendError, ClassifierBackend, QuantParams, TensorData, TensorDtype, TensorSpec,
};
use std::path::Path;
use tflitec::interpreter::{Interpreter, Options};
use tflitec::tensor;

pub struct TfliteBackend {
    interpreter: Interpreter,
    input_spec: TensorSpec,
    output_spec: TensorSpec,
}

// The interpreter is only ever driven from one thread at a time; the
// orchestrator owns it exclusively for the process lifetime.
unsafe impl Send for TfliteBackend {}

impl TfliteBackend {
    /// Load and allocate a `.tflite` model.
    pub fn load(model_path: &Path) -> Result<Self, BackendError> {
        let path = model_path
            .to_str()
            .ok_or_else(|| BackendError::Load("model path is not valid UTF-8".to_string()))?;

        let options = Options::default();
        let interpreter = Interpreter::with_model_path(path, Some(options))
            .map_err(|e| BackendError::Load(e.to_string()))?;
        interpreter
            .allocate_tensors()
            .map_err(|e| BackendError::Load(e.to_string()))?;

        let input_spec = spec_of(
            &interpreter
                .input(0)
                .map_err(|e| BackendError::Load(e.to_string()))?,
        )?;
        let output_spec = spec_of(
            &interpreter
                .output(0)
                .map_err(|e| BackendError::Load(e.to_string()))?,
        )?;

        Ok(Self {
            interpreter,
            input_spec,
            output_spec,
        })
    }
}

impl ClassifierBackend for TfliteBackend {
    fn input_spec(&self) -> &TensorSpec {
        &self.input_spec
    }

    fn output_spec(&self) -> &TensorSpec {
        &self.output_spec
    }

    fn invoke(&mut self, input: TensorData) -> Result<TensorData, BackendError> {
        match input {
            TensorData::Float32(values) => self
                .interpreter
                .copy(&values[..], 0)
                .map_err(|e| BackendError::Invoke(e.to_string()))?,
            TensorData::Int8(values) => self
                .interpreter
                .copy(&values[..], 0)
                .map_err(|e| BackendError::Invoke(e.to_string()))?,
        }

        self.interpreter
            .invoke()
            .map_err(|e| BackendError::Invoke(e.to_string()))?;

        let output = self
            .interpreter
            .output(0)
            .map_err(|e| BackendError::Invoke(e.to_string()))?;

        match self.output_spec.dtype {
            TensorDtype::Float32 => Ok(TensorData::Float32(output.data::<f32>().to_vec())),
            TensorDtype::Int8 => Ok(TensorData::Int8(output.data::<i8>().to_vec())),
        }
    }
}

fn spec_of(tensor: &tensor::Tensor) -> Result<TensorSpec, BackendError> {
    let dtype = match tensor.data_type() {
        tensor::DataType::Float32 => TensorDtype::Float32,
        tensor::DataType::Int8 => TensorDtype::Int8,
        other => {
            return Err(BackendError::Load(format!(
                "unsupported tensor dtype {other:?}"
            )))
        }
    };

    let quantization = tensor.quantization_parameters().map(|q| QuantParams {
        scale: q.scale,
        zero_point: q.zero_point,
    });

    Ok(TensorSpec {
        shape: tensor.shape().dimensions().clone(),
        dtype,
        quantization,
    })
}
