// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! YOLO model loading and inference.
//!
//! This module provides the [`Detector`] struct, which owns an inference
//! engine and runs the full pipeline: letterbox, tensor extraction, network
//! execution, decoding and suppression.

use std::io::Read;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use image::DynamicImage;
use ndarray::Array4;

use crate::config::{DecodeMode, ModelConfig};
use crate::engine::{EngineOptions, InferenceEngine, OrtEngine, OutputTensor};
use crate::error::{InferenceError, Result};
use crate::postprocessing::Postprocessor;
use crate::preprocessing::preprocess_image;
use crate::results::{Detection, Speed};
use crate::verbose;

/// YOLOv5 detector.
///
/// Wraps an inference engine behind a mutex so `predict` can be called from
/// several threads at once. Network execution is serialized and is the
/// throughput bottleneck; use one detector per thread (or a pool) when that
/// matters. Pre- and post-processing run outside the lock.
///
/// # Example
///
/// ```no_run
/// use yolov5_inference::{Detector, EngineOptions, ModelConfig};
///
/// let options = EngineOptions::default();
/// let detector = Detector::from_file("yolov5s.onnx", ModelConfig::coco_p5(), &options)?;
/// let image = image::open("bus.jpg")?;
/// for det in detector.predict(&image)? {
///     println!("{det}");
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Detector<E: InferenceEngine = OrtEngine> {
    engine: Mutex<E>,
    config: ModelConfig,
    postprocessor: Postprocessor,
}

impl Detector<OrtEngine> {
    /// Load a model from an ONNX file.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ModelLoadError`] if the file doesn't exist or
    /// can't be loaded, or [`InferenceError::ConfigError`] for an invalid config.
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        config: ModelConfig,
        options: &EngineOptions,
    ) -> Result<Self> {
        config.validate()?;
        Self::with_engine(OrtEngine::from_file(path, options)?, config)
    }

    /// Load a model from an in-memory ONNX buffer.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ModelLoadError`] if the bytes are not a valid model.
    pub fn from_bytes(bytes: &[u8], config: ModelConfig, options: &EngineOptions) -> Result<Self> {
        config.validate()?;
        Self::with_engine(OrtEngine::from_bytes(bytes, options)?, config)
    }

    /// Load a model by reading a stream to its end.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Io`] if reading fails, otherwise as [`Self::from_bytes`].
    pub fn from_reader<R: Read>(
        reader: R,
        config: ModelConfig,
        options: &EngineOptions,
    ) -> Result<Self> {
        config.validate()?;
        Self::with_engine(OrtEngine::from_reader(reader, options)?, config)
    }
}

impl<E: InferenceEngine> Detector<E> {
    /// Build a detector around an already-constructed engine.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ConfigError`] if the configuration is invalid.
    pub fn with_engine(engine: E, config: ModelConfig) -> Result<Self> {
        let postprocessor = Postprocessor::new(&config)?;

        verbose!(
            "Model summary: {} classes, imgsz=({}, {}), {} decoding over {} output(s)",
            config.num_classes(),
            config.height,
            config.width,
            match config.decode {
                DecodeMode::Detect => "detect-layer",
                DecodeMode::Anchors => "anchor",
            },
            config.outputs.len()
        );

        Ok(Self {
            engine: Mutex::new(engine),
            config,
            postprocessor,
        })
    }

    /// Warm up the engine by running inference on a zero tensor.
    ///
    /// This pre-allocates memory and lets the runtime finish graph
    /// optimization before the first real frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails.
    pub fn warmup(&self) -> Result<()> {
        let (width, height) = (self.config.width as usize, self.config.height as usize);
        let dummy_input = Array4::<f32>::zeros((1, 3, height, width));

        let start = Instant::now();
        let _ = self.run_inference(&dummy_input)?;
        verbose!("Warmup done in {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);

        Ok(())
    }

    /// Detect objects in an image.
    ///
    /// # Errors
    ///
    /// Returns an error if the image is empty, the engine fails, or the
    /// outputs don't match the configured layout.
    pub fn predict(&self, image: &DynamicImage) -> Result<Vec<Detection>> {
        self.predict_with_speed(image).map(|(detections, _)| detections)
    }

    /// Detect objects in an image, also reporting per-stage timings.
    ///
    /// # Errors
    ///
    /// As [`Self::predict`].
    pub fn predict_with_speed(&self, image: &DynamicImage) -> Result<(Vec<Detection>, Speed)> {
        let start_preprocess = Instant::now();
        let preprocessed = preprocess_image(image, self.config.input_size())?;
        let preprocess_time = start_preprocess.elapsed().as_secs_f64() * 1000.0;

        let start_inference = Instant::now();
        let outputs = self.run_inference(&preprocessed.tensor)?;
        let inference_time = start_inference.elapsed().as_secs_f64() * 1000.0;

        let start_postprocess = Instant::now();
        let detections = self
            .postprocessor
            .process(&outputs, &preprocessed.transform)?;
        let postprocess_time = start_postprocess.elapsed().as_secs_f64() * 1000.0;

        Ok((
            detections,
            Speed::new(preprocess_time, inference_time, postprocess_time),
        ))
    }

    /// Load an image file and detect objects in it.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ImageError`] if the image can't be loaded,
    /// otherwise as [`Self::predict`].
    pub fn predict_path<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Detection>> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|e| {
            InferenceError::ImageError(format!("Failed to load image {}: {e}", path.display()))
        })?;
        self.predict(&image)
    }

    /// Run the engine, holding the lock only for the call itself, and return
    /// outputs in configured order.
    fn run_inference(&self, input: &Array4<f32>) -> Result<Vec<OutputTensor>> {
        let outputs = {
            let mut engine = self.engine.lock().map_err(|_| {
                InferenceError::InferenceError("Inference engine lock poisoned".to_string())
            })?;
            engine.run(&self.config.input_name, input.view(), &self.config.outputs)?
        };

        order_outputs(outputs, &self.config.outputs)
    }

    /// The model configuration.
    #[must_use]
    pub const fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Model input size as `(width, height)`.
    #[must_use]
    pub const fn input_size(&self) -> (u32, u32) {
        self.config.input_size()
    }

    /// Release the engine.
    pub fn close(self) {
        drop(self);
    }

    /// Tear down the detector and hand back its engine.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::InferenceError`] if the engine lock was poisoned.
    pub fn into_engine(self) -> Result<E> {
        self.engine.into_inner().map_err(|_| {
            InferenceError::InferenceError("Inference engine lock poisoned".to_string())
        })
    }
}

/// Pick `names` out of `outputs`, in that order.
fn order_outputs(mut outputs: Vec<OutputTensor>, names: &[String]) -> Result<Vec<OutputTensor>> {
    names
        .iter()
        .map(|name| {
            let index = outputs
                .iter()
                .position(|o| &o.name == name)
                .ok_or_else(|| InferenceError::ShapeError(format!("Output '{name}' not found")))?;
            Ok(outputs.swap_remove(index))
        })
        .collect()
}

impl<E: InferenceEngine> std::fmt::Debug for Detector<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("num_classes", &self.config.num_classes())
            .field("imgsz", &(self.config.height, self.config.width))
            .field("decode", &self.config.decode)
            .field("outputs", &self.config.outputs)
            .finish_non_exhaustive()
    }
}
