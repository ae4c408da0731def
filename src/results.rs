// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Result types for YOLO detection output.
//!
//! A prediction is a plain `Vec<Detection>`, each carrying its label, merged
//! confidence and an axis-aligned box in original-image pixel coordinates.

use std::fmt;

/// Timing information for inference operations (in milliseconds).
#[derive(Debug, Clone, Default)]
pub struct Speed {
    /// Time spent on preprocessing.
    pub preprocess: Option<f64>,
    /// Time spent on model inference.
    pub inference: Option<f64>,
    /// Time spent on postprocessing.
    pub postprocess: Option<f64>,
}

impl Speed {
    /// Create a new Speed instance with all timings.
    #[must_use]
    pub const fn new(preprocess: f64, inference: f64, postprocess: f64) -> Self {
        Self {
            preprocess: Some(preprocess),
            inference: Some(inference),
            postprocess: Some(postprocess),
        }
    }

    /// Get total inference time.
    ///
    /// # Returns
    ///
    /// * Sum of preprocess, inference, and postprocess times in milliseconds.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.preprocess.unwrap_or(0.0)
            + self.inference.unwrap_or(0.0)
            + self.postprocess.unwrap_or(0.0)
    }
}

/// A class label: its index in the model's label set and its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label {
    /// Index into the model's ordered label set.
    pub id: usize,
    /// Human-readable class name.
    pub name: String,
}

impl Label {
    /// Create a new label.
    #[must_use]
    pub fn new(id: usize, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Axis-aligned rectangle in pixel coordinates (`x_min <= x_max`, `y_min <= y_max`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    /// Left edge.
    pub x_min: f32,
    /// Top edge.
    pub y_min: f32,
    /// Right edge.
    pub x_max: f32,
    /// Bottom edge.
    pub y_max: f32,
}

impl BoundingBox {
    /// Create a box from corner coordinates.
    #[must_use]
    pub const fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Create a box from `[x1, y1, x2, y2]`.
    #[must_use]
    pub const fn from_xyxy(xyxy: [f32; 4]) -> Self {
        Self::new(xyxy[0], xyxy[1], xyxy[2], xyxy[3])
    }

    /// Corner coordinates as `[x1, y1, x2, y2]`.
    #[must_use]
    pub const fn xyxy(&self) -> [f32; 4] {
        [self.x_min, self.y_min, self.x_max, self.y_max]
    }

    /// Box width.
    #[must_use]
    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    /// Box height.
    #[must_use]
    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    /// Box area. Degenerate boxes have zero area.
    #[must_use]
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Box center `(cx, cy)`.
    #[must_use]
    pub fn center(&self) -> (f32, f32) {
        (
            (self.x_min + self.x_max) / 2.0,
            (self.y_min + self.y_max) / 2.0,
        )
    }
}

/// A single labeled detection on the original image.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Predicted class.
    pub label: Label,
    /// Merged confidence (objectness × class score).
    pub score: f32,
    /// Box in original-image pixel coordinates.
    pub bbox: BoundingBox,
}

impl Detection {
    /// Create a new detection.
    #[must_use]
    pub const fn new(label: Label, score: f32, bbox: BoundingBox) -> Self {
        Self { label, score, bbox }
    }
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.2} [{:.1}, {:.1}, {:.1}, {:.1}]",
            self.label,
            self.score,
            self.bbox.x_min,
            self.bbox.y_min,
            self.bbox.x_max,
            self.bbox.y_max
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_total() {
        let speed = Speed::new(1.5, 10.0, 2.5);
        assert!((speed.total() - 14.0).abs() < 1e-9);
        assert!(Speed::default().total().abs() < 1e-9);
    }

    #[test]
    fn test_bbox_geometry() {
        let bbox = BoundingBox::new(10.0, 20.0, 30.0, 60.0);
        assert!((bbox.width() - 20.0).abs() < 1e-6);
        assert!((bbox.height() - 40.0).abs() < 1e-6);
        assert!((bbox.area() - 800.0).abs() < 1e-6);
        assert_eq!(bbox.center(), (20.0, 40.0));
        assert_eq!(BoundingBox::from_xyxy(bbox.xyxy()), bbox);
    }

    #[test]
    fn test_degenerate_area() {
        let bbox = BoundingBox::new(10.0, 10.0, 5.0, 20.0);
        assert!(bbox.area().abs() < f32::EPSILON);
    }

    #[test]
    fn test_detection_display() {
        let det = Detection::new(
            Label::new(0, "person"),
            0.876,
            BoundingBox::new(1.0, 2.0, 3.0, 4.0),
        );
        assert_eq!(det.to_string(), "person 0.88 [1.0, 2.0, 3.0, 4.0]");
    }
}
