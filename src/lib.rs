// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

#![allow(clippy::multiple_crate_versions)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # YOLOv5 Inference Library
//!
//! Object detection with `YOLOv5` models on ONNX Runtime. An image is
//! letterboxed to the network's input size, turned into a normalized
//! `[1, 3, H, W]` tensor, run through the model, decoded into scored
//! candidate boxes and pruned with non-maximum suppression. Boxes come back in
//! the original image's pixel coordinates.
//!
//! ## Quick Start (Library)
//!
//! ```no_run
//! use yolov5_inference::{Detector, EngineOptions, ModelConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ModelConfig::coco_p5().with_confidence(0.25);
//!     let detector = Detector::from_file("yolov5s.onnx", config, &EngineOptions::default())?;
//!
//!     let image = image::open("bus.jpg")?;
//!     for det in detector.predict(&image)? {
//!         let [x1, y1, x2, y2] = det.bbox.xyxy();
//!         println!("{} {:.2} [{x1:.0}, {y1:.0}, {x2:.0}, {y2:.0}]", det.label.name, det.score);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Decoding Modes
//!
//! Models exported with their detect layer produce a single `[1, N, 5 + C]`
//! output whose boxes are already in input pixels; that is the default
//! ([`DecodeMode::Detect`]). Models exported without it produce one raw
//! feature map per scale; select [`DecodeMode::Anchors`] and name the outputs
//! in stride order:
//!
//! ```rust
//! use yolov5_inference::ModelConfig;
//!
//! let config = ModelConfig::coco_p5().with_anchor_outputs(["p3", "p4", "p5"]);
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! yolov5-inference predict --model yolov5s.onnx --source bus.jpg
//! yolov5-inference predict -m yolov5s6.onnx -s images/ --preset p6 --verbose
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`model`] | [`Detector`], the end-to-end pipeline |
//! | [`config`] | [`ModelConfig`] presets and builders |
//! | [`engine`] | [`InferenceEngine`] trait and the ONNX Runtime backend |
//! | [`preprocessing`] | Letterboxing and tensor extraction |
//! | [`postprocessing`] | Output decoding and suppression |
//! | [`results`] | [`Detection`], [`BoundingBox`], [`Label`], [`Speed`] |
//! | [`utils`] | Sigmoid, `IoU` and NMS helpers |
//! | [`error`] | [`InferenceError`] and [`Result`] |

// Modules
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod postprocessing;
pub mod preprocessing;
pub mod results;
pub mod utils;

// Re-export main types for convenience
pub use config::{DecodeMode, ModelConfig, Suppression};
pub use engine::{EngineOptions, InferenceEngine, OrtEngine, OutputTensor};
pub use error::{InferenceError, Result};
pub use model::Detector;
pub use results::{BoundingBox, Detection, Label, Speed};

// Re-export preprocessing utilities
pub use preprocessing::{LetterboxTransform, PixelView, PreprocessResult, preprocess_image};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "yolov5-inference");
    }
}
