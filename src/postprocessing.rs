// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Post-processing for YOLO model outputs.
//!
//! This module turns raw output tensors into candidate detections and removes
//! overlapping duplicates. Two decoders exist:
//!
//! - [`DetectDecoder`] reads a single `[1, N, dimensions]` output whose boxes
//!   are already in letterboxed pixels and may emit one detection per class
//!   per candidate.
//! - [`AnchorDecoder`] reads one raw `[anchors, grid, grid, dimensions]`
//!   feature map per scale, applies a sigmoid and decodes boxes against the
//!   anchor table, emitting at most one detection per cell.
//!
//! Both decode candidates in parallel and collect them in discovery order, so
//! suppression sees the same sequence on every run.

#![allow(clippy::cast_precision_loss)]

use rayon::prelude::*;

use crate::config::{Anchor, DecodeMode, ModelConfig, Suppression};
use crate::engine::OutputTensor;
use crate::error::{InferenceError, Result};
use crate::preprocessing::LetterboxTransform;
use crate::results::{Detection, Label};
use crate::utils::{nms, sigmoid, suppress, xywh_to_xyxy};

/// Thresholds and labels shared by both decoders.
#[derive(Debug, Clone)]
struct Scoring {
    dimensions: usize,
    confidence: f32,
    mul_confidence: f32,
    labels: Vec<Label>,
}

impl Scoring {
    fn from_config(config: &ModelConfig) -> Self {
        Self {
            dimensions: config.dimensions,
            confidence: config.confidence,
            mul_confidence: config.mul_confidence,
            labels: config
                .labels
                .iter()
                .enumerate()
                .map(|(id, name)| Label::new(id, name.clone()))
                .collect(),
        }
    }
}

/// Check that `output` holds exactly `expected` values and that its declared
/// shape agrees.
fn check_output(output: &OutputTensor, expected: usize, layout: &str) -> Result<()> {
    let declared: usize = output.shape.iter().product();
    if output.data.len() != expected || (!output.shape.is_empty() && declared != expected) {
        return Err(InferenceError::ShapeError(format!(
            "output '{}' has shape {:?} ({} values), expected {layout} ({expected} values)",
            output.name,
            output.shape,
            output.data.len()
        )));
    }
    Ok(())
}

// ================================================================================================
// Detect-layer decoder
// ================================================================================================

/// Decoder for models exported with the detect layer.
#[derive(Debug, Clone)]
pub struct DetectDecoder {
    scoring: Scoring,
}

impl DetectDecoder {
    /// Build the decoder from a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ConfigError`] if the configuration is invalid.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            scoring: Scoring::from_config(config),
        })
    }

    /// Decode the single detect-layer output.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ShapeError`] if there is not exactly one
    /// output or it is not shaped `[1, N, dimensions]`.
    pub fn decode(
        &self,
        outputs: &[OutputTensor],
        transform: &LetterboxTransform,
    ) -> Result<Vec<Detection>> {
        let [output] = outputs else {
            return Err(InferenceError::ShapeError(format!(
                "detect decoding expects 1 output, got {}",
                outputs.len()
            )));
        };

        let dims = self.scoring.dimensions;
        let rank_ok = match output.shape.as_slice() {
            [1, _, d] | [_, d] => *d == dims,
            _ => false,
        };
        if !rank_ok || output.data.len() % dims != 0 {
            return Err(InferenceError::ShapeError(format!(
                "output '{}' has shape {:?}, expected [1, N, {dims}]",
                output.name, output.shape
            )));
        }
        check_output(output, output.data.len(), &format!("[1, N, {dims}]"))?;

        Ok(output
            .data
            .par_chunks_exact(dims)
            .flat_map_iter(|candidate| self.decode_candidate(candidate, transform))
            .collect())
    }

    fn decode_candidate(
        &self,
        candidate: &[f32],
        transform: &LetterboxTransform,
    ) -> Vec<Detection> {
        let objectness = candidate[4];
        if objectness <= self.scoring.confidence {
            return Vec::new();
        }

        let bbox = transform.unpad_box(xywh_to_xyxy([
            candidate[0],
            candidate[1],
            candidate[2],
            candidate[3],
        ]));

        candidate[5..]
            .iter()
            .zip(&self.scoring.labels)
            .filter_map(|(&score, label)| {
                let mul_confidence = score * objectness;
                (mul_confidence > self.scoring.mul_confidence)
                    .then(|| Detection::new(label.clone(), mul_confidence, bbox))
            })
            .collect()
    }
}

// ================================================================================================
// Anchor decoder
// ================================================================================================

/// One output scale of an anchor-based model.
#[derive(Debug, Clone)]
struct Scale {
    stride: f32,
    grid: usize,
    anchors: Vec<Anchor>,
}

/// Decoder for raw multi-scale feature maps.
#[derive(Debug, Clone)]
pub struct AnchorDecoder {
    scoring: Scoring,
    scales: Vec<Scale>,
}

impl AnchorDecoder {
    /// Build the decoder from a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ConfigError`] if the configuration is invalid,
    /// including scale tables that disagree in length.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        config.validate()?;

        let scales = config
            .strides
            .iter()
            .zip(&config.shapes)
            .zip(&config.anchors)
            .map(|((&stride, &grid), anchors)| Scale {
                stride: stride as f32,
                grid,
                anchors: anchors.clone(),
            })
            .collect();

        Ok(Self {
            scoring: Scoring::from_config(config),
            scales,
        })
    }

    /// Decode one output per scale, in scale order.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ShapeError`] if the output count differs from
    /// the scale count or an output does not hold
    /// `anchors × grid × grid × dimensions` values.
    pub fn decode(
        &self,
        outputs: &[OutputTensor],
        transform: &LetterboxTransform,
    ) -> Result<Vec<Detection>> {
        if outputs.len() != self.scales.len() {
            return Err(InferenceError::ShapeError(format!(
                "anchor decoding expects {} outputs, got {}",
                self.scales.len(),
                outputs.len()
            )));
        }

        let dims = self.scoring.dimensions;
        let mut detections = Vec::new();

        for (scale, output) in self.scales.iter().zip(outputs) {
            let cells = scale.anchors.len() * scale.grid * scale.grid;
            check_output(
                output,
                cells * dims,
                &format!("[{}, {}, {}, {dims}]", scale.anchors.len(), scale.grid, scale.grid),
            )?;

            let found: Vec<Detection> = output
                .data
                .par_chunks_exact(dims)
                .enumerate()
                .filter_map(|(cell, values)| self.decode_cell(scale, cell, values, transform))
                .collect();
            detections.extend(found);
        }

        Ok(detections)
    }

    /// Decode the `values` of flat cell index `cell = grid²·a + grid·y + x`.
    fn decode_cell(
        &self,
        scale: &Scale,
        cell: usize,
        values: &[f32],
        transform: &LetterboxTransform,
    ) -> Option<Detection> {
        let objectness = sigmoid(values[4]);
        if objectness <= self.scoring.confidence {
            return None;
        }

        let (best_class, mul_confidence) = values[5..]
            .iter()
            .map(|&raw| sigmoid(raw) * objectness)
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (class, score)| {
                if score > best.1 { (class, score) } else { best }
            });
        if mul_confidence <= self.scoring.mul_confidence {
            return None;
        }

        let area = scale.grid * scale.grid;
        let anchor = scale.anchors[cell / area];
        let (y, x) = ((cell % area) / scale.grid, cell % scale.grid);

        let center_x = (sigmoid(values[0]).mul_add(2.0, -0.5) + x as f32) * scale.stride;
        let center_y = (sigmoid(values[1]).mul_add(2.0, -0.5) + y as f32) * scale.stride;
        let width = (sigmoid(values[2]) * 2.0).powi(2) * anchor.0;
        let height = (sigmoid(values[3]) * 2.0).powi(2) * anchor.1;

        let bbox = transform.unpad_box(xywh_to_xyxy([center_x, center_y, width, height]));
        let label = self.scoring.labels.get(best_class)?.clone();

        Some(Detection::new(label, mul_confidence, bbox))
    }
}

// ================================================================================================
// Decoder selection
// ================================================================================================

/// The decoder a configuration selects, fixed at construction.
#[derive(Debug, Clone)]
pub enum Decoder {
    /// Detect-layer output.
    Detect(DetectDecoder),
    /// Raw anchor-based feature maps.
    Anchors(AnchorDecoder),
}

impl Decoder {
    /// Build the decoder selected by `config.decode`.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ConfigError`] if the configuration is invalid.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        Ok(match config.decode {
            DecodeMode::Detect => Self::Detect(DetectDecoder::new(config)?),
            DecodeMode::Anchors => Self::Anchors(AnchorDecoder::new(config)?),
        })
    }

    /// Decode raw outputs into candidate detections in discovery order.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ShapeError`] if the outputs don't match the model layout.
    pub fn decode(
        &self,
        outputs: &[OutputTensor],
        transform: &LetterboxTransform,
    ) -> Result<Vec<Detection>> {
        match self {
            Self::Detect(decoder) => decoder.decode(outputs, transform),
            Self::Anchors(decoder) => decoder.decode(outputs, transform),
        }
    }
}

/// Decode and suppress in one step.
#[derive(Debug, Clone)]
pub struct Postprocessor {
    decoder: Decoder,
    suppression: Suppression,
    overlap: f32,
}

impl Postprocessor {
    /// Build a post-processor from a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ConfigError`] if the configuration is invalid.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        Ok(Self {
            decoder: Decoder::from_config(config)?,
            suppression: config.suppression,
            overlap: config.overlap,
        })
    }

    /// Turn raw outputs into final detections.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ShapeError`] if the outputs don't match the model layout.
    pub fn process(
        &self,
        outputs: &[OutputTensor],
        transform: &LetterboxTransform,
    ) -> Result<Vec<Detection>> {
        let candidates = self.decoder.decode(outputs, transform)?;
        Ok(match self.suppression {
            Suppression::Ordered => suppress(candidates, self.overlap),
            Suppression::ScoreSorted => nms(candidates, self.overlap),
        })
    }
}
