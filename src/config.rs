// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Model configuration.
//!
//! A [`ModelConfig`] describes everything the pipeline needs to know about a
//! model family: input size, output layout, thresholds, labels and, for
//! models exported without the detect layer, the per-scale strides, grid
//! shapes and anchors used to decode raw feature maps.

use crate::error::{InferenceError, Result};

/// The 80 COCO class names, in model order.
pub const COCO_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// Anchor box template `(width, height)` in input pixels.
pub type Anchor = (f32, f32);

/// How raw model outputs are turned into candidate boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeMode {
    /// The model ends in a detect layer: one output `[1, N, dimensions]` with
    /// boxes already in letterboxed pixel space.
    #[default]
    Detect,
    /// The model emits one raw feature map per scale; values are passed
    /// through a sigmoid and decoded against the anchor table.
    Anchors,
}

/// Which suppression algorithm removes overlapping candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Suppression {
    /// Pairwise removal in discovery order; equal scores keep the earlier box.
    #[default]
    Ordered,
    /// Standard greedy NMS over score-sorted candidates.
    ScoreSorted,
}

/// Static configuration for a YOLOv5 model family.
///
/// # Example
///
/// ```rust
/// use yolov5_inference::ModelConfig;
///
/// let config = ModelConfig::coco_p5()
///     .with_confidence(0.3)
///     .with_mul_confidence(0.35)
///     .with_overlap(0.5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Model input width in pixels.
    pub width: u32,
    /// Model input height in pixels.
    pub height: u32,
    /// Values per candidate: 4 box coordinates, objectness, class scores.
    pub dimensions: usize,
    /// Objectness threshold; candidates at or below it are dropped.
    pub confidence: f32,
    /// Merged (objectness × class) confidence threshold.
    pub mul_confidence: f32,
    /// `IoU` at or above which overlapping detections are suppressed.
    pub overlap: f32,
    /// Ordered class names.
    pub labels: Vec<String>,
    /// Name of the model's image input.
    pub input_name: String,
    /// Output tensor names, in the order the decoder consumes them.
    pub outputs: Vec<String>,
    /// Decoder selection.
    pub decode: DecodeMode,
    /// Suppression algorithm.
    pub suppression: Suppression,
    /// Per-scale stride (anchor mode only).
    pub strides: Vec<u32>,
    /// Per-scale grid size (anchor mode only).
    pub shapes: Vec<usize>,
    /// Per-scale anchor templates (anchor mode only).
    pub anchors: Vec<Vec<Anchor>>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::coco_p5()
    }
}

impl ModelConfig {
    /// `YOLOv5` P5 (640×640, three scales) trained on COCO.
    #[must_use]
    pub fn coco_p5() -> Self {
        Self {
            width: 640,
            height: 640,
            dimensions: 85,
            confidence: 0.20,
            mul_confidence: 0.25,
            overlap: 0.45,
            labels: COCO_LABELS.iter().map(ToString::to_string).collect(),
            input_name: "images".to_string(),
            outputs: vec!["output".to_string()],
            decode: DecodeMode::Detect,
            suppression: Suppression::Ordered,
            strides: vec![8, 16, 32],
            shapes: vec![80, 40, 20],
            anchors: vec![
                vec![(10.0, 13.0), (16.0, 30.0), (33.0, 23.0)],
                vec![(30.0, 61.0), (62.0, 45.0), (59.0, 119.0)],
                vec![(116.0, 90.0), (156.0, 198.0), (373.0, 326.0)],
            ],
        }
    }

    /// `YOLOv5` P6 (1280×1280, four scales) trained on COCO.
    #[must_use]
    pub fn coco_p6() -> Self {
        Self {
            width: 1280,
            height: 1280,
            strides: vec![8, 16, 32, 64],
            shapes: vec![160, 80, 40, 20],
            anchors: vec![
                vec![(19.0, 27.0), (44.0, 40.0), (38.0, 94.0)],
                vec![(96.0, 68.0), (86.0, 152.0), (180.0, 137.0)],
                vec![(140.0, 301.0), (303.0, 264.0), (238.0, 542.0)],
                vec![(436.0, 615.0), (739.0, 380.0), (925.0, 792.0)],
            ],
            ..Self::coco_p5()
        }
    }

    /// Create a detect-layer configuration for a custom label set.
    ///
    /// `dimensions` is derived as `5 + labels.len()`.
    #[must_use]
    pub fn new<S: Into<String>>(
        width: u32,
        height: u32,
        labels: impl IntoIterator<Item = S>,
    ) -> Self {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        Self {
            width,
            height,
            dimensions: 5 + labels.len(),
            labels,
            ..Self::coco_p5()
        }
    }

    /// Set the objectness threshold.
    #[must_use]
    pub const fn with_confidence(mut self, threshold: f32) -> Self {
        self.confidence = threshold;
        self
    }

    /// Set the merged confidence threshold.
    #[must_use]
    pub const fn with_mul_confidence(mut self, threshold: f32) -> Self {
        self.mul_confidence = threshold;
        self
    }

    /// Set the `IoU` threshold for suppression.
    #[must_use]
    pub const fn with_overlap(mut self, threshold: f32) -> Self {
        self.overlap = threshold;
        self
    }

    /// Set the model input size.
    #[must_use]
    pub const fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the suppression algorithm.
    #[must_use]
    pub const fn with_suppression(mut self, suppression: Suppression) -> Self {
        self.suppression = suppression;
        self
    }

    /// Set the input tensor name.
    #[must_use]
    pub fn with_input_name(mut self, name: impl Into<String>) -> Self {
        self.input_name = name.into();
        self
    }

    /// Use the detect-layer decoder reading a single named output.
    #[must_use]
    pub fn with_detect_output(mut self, name: impl Into<String>) -> Self {
        self.decode = DecodeMode::Detect;
        self.outputs = vec![name.into()];
        self
    }

    /// Use the anchor decoder reading one named output per scale.
    ///
    /// Output names must be given in the same order as `strides`, `shapes`
    /// and `anchors`.
    #[must_use]
    pub fn with_anchor_outputs<S: Into<String>>(
        mut self,
        names: impl IntoIterator<Item = S>,
    ) -> Self {
        self.decode = DecodeMode::Anchors;
        self.outputs = names.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the per-scale anchor layout.
    #[must_use]
    pub fn with_scales(
        mut self,
        strides: Vec<u32>,
        shapes: Vec<usize>,
        anchors: Vec<Vec<Anchor>>,
    ) -> Self {
        self.strides = strides;
        self.shapes = shapes;
        self.anchors = anchors;
        self
    }

    /// Number of classes the model predicts.
    #[must_use]
    pub const fn num_classes(&self) -> usize {
        self.dimensions.saturating_sub(5)
    }

    /// Input size as `(width, height)`.
    #[must_use]
    pub const fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Check that the configuration is internally consistent.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ConfigError`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(InferenceError::ConfigError(format!(
                "input size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.dimensions < 6 {
            return Err(InferenceError::ConfigError(format!(
                "dimensions must cover 4 box values, objectness and at least one class, got {}",
                self.dimensions
            )));
        }
        if self.labels.len() != self.num_classes() {
            return Err(InferenceError::ConfigError(format!(
                "{} labels given for {} classes (dimensions {})",
                self.labels.len(),
                self.num_classes(),
                self.dimensions
            )));
        }
        if self.outputs.is_empty() {
            return Err(InferenceError::ConfigError("no output names configured".to_string()));
        }

        if self.decode == DecodeMode::Anchors {
            let scales = self.strides.len();
            if scales == 0 {
                return Err(InferenceError::ConfigError(
                    "anchor decoding needs at least one scale".to_string(),
                ));
            }
            if self.shapes.len() != scales || self.anchors.len() != scales {
                return Err(InferenceError::ConfigError(format!(
                    "scale tables disagree: {} strides, {} shapes, {} anchor sets",
                    scales,
                    self.shapes.len(),
                    self.anchors.len()
                )));
            }
            if self.outputs.len() != scales {
                return Err(InferenceError::ConfigError(format!(
                    "anchor decoding needs one output per scale: {} outputs for {} scales",
                    self.outputs.len(),
                    scales
                )));
            }
            let per_scale = self.anchors[0].len();
            if per_scale == 0 || self.anchors.iter().any(|a| a.len() != per_scale) {
                return Err(InferenceError::ConfigError(
                    "every scale needs the same non-zero number of anchors".to_string(),
                ));
            }
        }

        Ok(())
    }
}
