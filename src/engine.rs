// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Inference engine abstraction and the ONNX Runtime backend.
//!
//! The pipeline only needs something that accepts one named `[1, 3, H, W]`
//! tensor and hands back named float outputs. [`OrtEngine`] provides that on
//! top of an ONNX Runtime session; tests substitute a scripted engine.

use std::io::Read;
use std::path::Path;

use ndarray::ArrayView4;
use ort::session::Session;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::value::TensorRef;

use crate::error::{InferenceError, Result};

/// A raw model output: its name, shape and row-major data.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    /// Output name as declared by the model.
    pub name: String,
    /// Tensor dimensions.
    pub shape: Vec<usize>,
    /// Flattened values.
    pub data: Vec<f32>,
}

impl OutputTensor {
    /// Create a new output tensor.
    #[must_use]
    pub fn new(name: impl Into<String>, shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            shape,
            data,
        }
    }
}

/// Something that can execute the network.
///
/// Implementations need not be thread-safe for concurrent calls; the
/// detector serializes access behind a mutex.
pub trait InferenceEngine: Send {
    /// Run the network on `input` bound to `input_name`, returning the named
    /// outputs in the order requested.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::InferenceError`] if execution fails and
    /// [`InferenceError::ShapeError`] if a requested output is missing.
    fn run(
        &mut self,
        input_name: &str,
        input: ArrayView4<'_, f32>,
        output_names: &[String],
    ) -> Result<Vec<OutputTensor>>;
}

/// Options passed through to ONNX Runtime when building a session.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Number of intra-op threads. `0` lets ONNX Runtime decide.
    pub num_threads: usize,
    /// Enable all graph optimizations (`Level3`); otherwise only basic ones.
    pub optimize: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            num_threads: 0,
            optimize: true,
        }
    }
}

impl EngineOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of intra-op threads.
    #[must_use]
    pub const fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }

    /// Enable or disable full graph optimization.
    #[must_use]
    pub const fn with_optimization(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }
}

/// ONNX Runtime session wrapper.
pub struct OrtEngine {
    session: Session,
}

impl OrtEngine {
    /// Load a model from an ONNX file.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ModelLoadError`] if the file doesn't exist or
    /// can't be loaded.
    pub fn from_file<P: AsRef<Path>>(path: P, options: &EngineOptions) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(InferenceError::ModelLoadError(format!(
                "Model file not found: {}",
                path.display()
            )));
        }

        let session = Self::builder(options)?
            .commit_from_file(path)
            .map_err(|e| InferenceError::ModelLoadError(format!("Failed to load model: {e}")))?;

        Ok(Self { session })
    }

    /// Load a model from an in-memory ONNX buffer.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ModelLoadError`] if the bytes are not a valid model.
    pub fn from_bytes(bytes: &[u8], options: &EngineOptions) -> Result<Self> {
        if bytes.is_empty() {
            return Err(InferenceError::ModelLoadError("Model buffer is empty".to_string()));
        }

        let session = Self::builder(options)?
            .commit_from_memory(bytes)
            .map_err(|e| InferenceError::ModelLoadError(format!("Failed to load model: {e}")))?;

        Ok(Self { session })
    }

    /// Load a model by reading a stream to its end.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Io`] if reading fails, otherwise as [`Self::from_bytes`].
    pub fn from_reader<R: Read>(mut reader: R, options: &EngineOptions) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes, options)
    }

    /// Names of the model's inputs.
    #[must_use]
    pub fn input_names(&self) -> Vec<String> {
        self.session.inputs.iter().map(|i| i.name.clone()).collect()
    }

    /// Names of the model's outputs, in declaration order.
    #[must_use]
    pub fn output_names(&self) -> Vec<String> {
        self.session.outputs.iter().map(|o| o.name.clone()).collect()
    }

    fn builder(options: &EngineOptions) -> Result<SessionBuilder> {
        let level = if options.optimize {
            GraphOptimizationLevel::Level3
        } else {
            GraphOptimizationLevel::Level1
        };

        Session::builder()
            .map_err(|e| {
                InferenceError::ModelLoadError(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(level)
            .map_err(|e| {
                InferenceError::ModelLoadError(format!("Failed to set optimization level: {e}"))
            })?
            .with_intra_threads(options.num_threads)
            .map_err(|e| {
                InferenceError::ModelLoadError(format!("Failed to set intra-thread count: {e}"))
            })
    }
}

impl InferenceEngine for OrtEngine {
    fn run(
        &mut self,
        input_name: &str,
        input: ArrayView4<'_, f32>,
        output_names: &[String],
    ) -> Result<Vec<OutputTensor>> {
        // Ensure input is contiguous in memory (CowArray)
        let input_contiguous = input.as_standard_layout();

        let input_tensor = TensorRef::from_array_view(&input_contiguous).map_err(|e| {
            InferenceError::InferenceError(format!("Failed to create input tensor: {e}"))
        })?;

        let outputs = self
            .session
            .run(ort::inputs![input_name => input_tensor])
            .map_err(|e| InferenceError::InferenceError(format!("Inference failed: {e}")))?;

        output_names
            .iter()
            .map(|name| {
                let output = outputs.get(name.as_str()).ok_or_else(|| {
                    InferenceError::ShapeError(format!("Output '{name}' not found"))
                })?;

                let (shape, data) = output.try_extract_tensor::<f32>().map_err(|e| {
                    InferenceError::ShapeError(format!("Failed to extract output '{name}': {e}"))
                })?;

                #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                let shape: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();

                Ok(OutputTensor::new(name.clone(), shape, data.to_vec()))
            })
            .collect()
    }
}

impl std::fmt::Debug for OrtEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtEngine")
            .field("inputs", &self.input_names())
            .field("outputs", &self.output_names())
            .finish()
    }
}
