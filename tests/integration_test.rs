// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Integration tests for the detection pipeline.
//!
//! The network is replaced by scripted engines so every stage around it runs
//! for real: letterbox, tensor extraction, decoding and suppression.

use std::collections::VecDeque;
use std::sync::Arc;

use image::{DynamicImage, Rgb, RgbImage};
use ndarray::ArrayView4;

use yolov5_inference::utils::suppress;
use yolov5_inference::{
    Detector, InferenceEngine, InferenceError, ModelConfig, OutputTensor, Result, Suppression,
};

/// Returns queued responses in order, then fails.
struct ScriptedEngine {
    responses: VecDeque<Vec<OutputTensor>>,
    seen_shapes: Vec<Vec<usize>>,
    first_pixel: Vec<f32>,
}

impl ScriptedEngine {
    fn new(responses: impl IntoIterator<Item = Vec<OutputTensor>>) -> Self {
        Self {
            responses: responses.into_iter().collect(),
            seen_shapes: Vec::new(),
            first_pixel: Vec::new(),
        }
    }
}

impl InferenceEngine for ScriptedEngine {
    fn run(
        &mut self,
        input_name: &str,
        input: ArrayView4<'_, f32>,
        _output_names: &[String],
    ) -> Result<Vec<OutputTensor>> {
        assert_eq!(input_name, "images");
        assert!(input.iter().all(|v| (0.0..=1.0).contains(v)));
        self.seen_shapes.push(input.shape().to_vec());
        self.first_pixel.push(input[[0, 0, 0, 0]]);
        self.responses
            .pop_front()
            .ok_or_else(|| InferenceError::InferenceError("script exhausted".to_string()))
    }
}

/// Returns the same outputs on every call.
struct FixedEngine(Vec<OutputTensor>);

impl InferenceEngine for FixedEngine {
    fn run(
        &mut self,
        _input_name: &str,
        _input: ArrayView4<'_, f32>,
        _output_names: &[String],
    ) -> Result<Vec<OutputTensor>> {
        Ok(self.0.clone())
    }
}

fn logit(p: f32) -> f32 {
    (p / (1.0 - p)).ln()
}

/// One COCO detect-layer row: box, objectness and a single hot class.
fn coco_row(xywh: [f32; 4], objectness: f32, class: usize, score: f32) -> Vec<f32> {
    let mut row = vec![0.0; 85];
    row[..4].copy_from_slice(&xywh);
    row[4] = objectness;
    row[5 + class] = score;
    row
}

fn coco_output(rows: &[Vec<f32>]) -> OutputTensor {
    OutputTensor::new("output", vec![1, rows.len(), 85], rows.concat())
}

fn coco_detector<E: InferenceEngine>(engine: E) -> Detector<E> {
    Detector::with_engine(engine, ModelConfig::coco_p5()).unwrap()
}

fn assert_box(actual: [f32; 4], expected: [f32; 4]) {
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-3, "{actual:?} != {expected:?}");
    }
}

#[test]
fn test_detect_end_to_end() {
    let output = coco_output(&[coco_row([320.0, 320.0, 100.0, 50.0], 0.9, 3, 0.95)]);
    let detector = coco_detector(ScriptedEngine::new([vec![output]]));

    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(640, 640, Rgb([255, 0, 0])));
    let detections = detector.predict(&image).unwrap();

    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].label.id, 3);
    assert_eq!(detections[0].label.name, "motorcycle");
    assert!((detections[0].score - 0.855).abs() < 1e-5);
    assert_box(detections[0].bbox.xyxy(), [270.0, 295.0, 370.0, 345.0]);

    let engine = detector.into_engine().unwrap();
    assert_eq!(engine.seen_shapes, vec![vec![1, 3, 640, 640]]);
    assert!((engine.first_pixel[0] - 1.0).abs() < 1e-6);
}

#[test]
fn test_detect_letterboxed_image() {
    let output = coco_output(&[coco_row([320.0, 320.0, 100.0, 50.0], 0.9, 0, 0.95)]);
    let detector = coco_detector(ScriptedEngine::new([vec![output]]));

    // 1280x720 scales by 0.5 to 640x360 with 140 rows of padding above and below
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(1280, 720, Rgb([0, 0, 0])));
    let detections = detector.predict(&image).unwrap();

    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].label.name, "person");
    assert_box(detections[0].bbox.xyxy(), [540.0, 310.0, 740.0, 410.0]);

    let engine = detector.into_engine().unwrap();
    assert_eq!(engine.seen_shapes, vec![vec![1, 3, 640, 640]]);
    assert!((engine.first_pixel[0] - 114.0 / 255.0).abs() < 1e-6);
}

#[test]
fn test_detections_clamped_to_image() {
    let output = coco_output(&[coco_row([20.0, 620.0, 100.0, 100.0], 0.9, 0, 0.9)]);
    let detector = coco_detector(FixedEngine(vec![output]));

    let image = DynamicImage::new_rgb8(640, 640);
    let detections = detector.predict(&image).unwrap();
    assert_box(detections[0].bbox.xyxy(), [0.0, 570.0, 70.0, 639.0]);
}

#[test]
fn test_anchor_end_to_end() {
    let config = ModelConfig::new(64, 64, ["a", "b"])
        .with_anchor_outputs(["p3"])
        .with_scales(vec![8], vec![8], vec![vec![(10.0, 13.0), (16.0, 30.0)]]);
    let dims = config.dimensions;

    // Everything off, except anchor 0 at row 2, column 3
    let mut data = vec![-10.0_f32; 2 * 8 * 8 * dims];
    let cell = 2 * 8 + 3;
    let values = &mut data[cell * dims..(cell + 1) * dims];
    values[..4].copy_from_slice(&[0.0, 0.0, 0.0, 0.0]);
    values[4] = logit(0.9);
    values[5] = logit(0.95);

    let output = OutputTensor::new("p3", vec![1, 2, 8, 8, dims], data);
    let detector = Detector::with_engine(ScriptedEngine::new([vec![output]]), config).unwrap();

    let detections = detector.predict(&DynamicImage::new_rgb8(64, 64)).unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].label.name, "a");
    assert!((detections[0].score - 0.855).abs() < 1e-4);
    // center (28, 20), size 10x13
    assert_box(detections[0].bbox.xyxy(), [23.0, 13.5, 33.0, 26.5]);
}

#[test]
fn test_anchor_letterboxed_image() {
    let config = ModelConfig::new(64, 64, ["a", "b"])
        .with_anchor_outputs(["p3"])
        .with_scales(vec![8], vec![8], vec![vec![(10.0, 13.0), (16.0, 30.0)]]);
    let dims = config.dimensions;

    // Anchor 0 at row 3, column 3: center (28, 28), size 10x13 in model pixels
    let mut data = vec![-10.0_f32; 2 * 8 * 8 * dims];
    let cell = 3 * 8 + 3;
    let values = &mut data[cell * dims..(cell + 1) * dims];
    values[..4].copy_from_slice(&[0.0, 0.0, 0.0, 0.0]);
    values[4] = logit(0.9);
    values[6] = logit(0.95);

    let output = OutputTensor::new("p3", vec![1, 2, 8, 8, dims], data);
    let detector = Detector::with_engine(FixedEngine(vec![output]), config).unwrap();

    // 128x64 scales by 0.5 with 16 rows of margin above
    let detections = detector.predict(&DynamicImage::new_rgb8(128, 64)).unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].label.name, "b");
    assert_box(detections[0].bbox.xyxy(), [46.0, 11.0, 66.0, 37.0]);
}

#[test]
fn test_missing_output_leaves_detector_usable() {
    let wrong = OutputTensor::new("something_else", vec![1, 0, 85], vec![]);
    let right = coco_output(&[coco_row([320.0, 320.0, 100.0, 50.0], 0.9, 3, 0.95)]);
    let detector = coco_detector(ScriptedEngine::new([vec![wrong], vec![right]]));

    let image = DynamicImage::new_rgb8(640, 640);
    assert!(matches!(detector.predict(&image), Err(InferenceError::ShapeError(_))));
    assert_eq!(detector.predict(&image).unwrap().len(), 1);
    assert!(matches!(detector.predict(&image), Err(InferenceError::InferenceError(_))));
}

#[test]
fn test_wrong_output_width_rejected() {
    let output = OutputTensor::new("output", vec![1, 1, 84], vec![0.0; 84]);
    let detector = coco_detector(FixedEngine(vec![output]));
    assert!(matches!(
        detector.predict(&DynamicImage::new_rgb8(640, 640)),
        Err(InferenceError::ShapeError(_))
    ));
}

#[test]
fn test_invalid_config_rejected() {
    let config = ModelConfig::coco_p5().with_anchor_outputs(["only_one"]);
    let result = Detector::with_engine(FixedEngine(vec![]), config);
    assert!(matches!(result, Err(InferenceError::ConfigError(_))));
}

#[test]
fn test_tie_keeps_first_across_labels() {
    let first = coco_row([100.0, 100.0, 50.0, 50.0], 0.9, 0, 0.9);
    let second = coco_row([102.0, 100.0, 50.0, 50.0], 0.9, 1, 0.9);
    let apart = coco_row([400.0, 400.0, 50.0, 50.0], 0.9, 2, 0.9);
    let output = coco_output(&[first, second, apart]);
    let detector = coco_detector(FixedEngine(vec![output]));

    let detections = detector.predict(&DynamicImage::new_rgb8(640, 640)).unwrap();
    let names: Vec<&str> = detections.iter().map(|d| d.label.name.as_str()).collect();
    assert_eq!(names, ["person", "car"]);
    assert_box(detections[0].bbox.xyxy(), [75.0, 75.0, 125.0, 125.0]);

    let again = suppress(detections.clone(), ModelConfig::coco_p5().overlap);
    assert_eq!(again, detections);
}

#[test]
fn test_score_sorted_suppression() {
    let weak = coco_row([100.0, 100.0, 50.0, 50.0], 0.9, 0, 0.5);
    let strong = coco_row([104.0, 100.0, 50.0, 50.0], 0.9, 0, 0.9);
    let output = coco_output(&[weak, strong]);
    let config = ModelConfig::coco_p5().with_suppression(Suppression::ScoreSorted);
    let detector = Detector::with_engine(FixedEngine(vec![output]), config).unwrap();

    let detections = detector.predict(&DynamicImage::new_rgb8(640, 640)).unwrap();
    assert_eq!(detections.len(), 1);
    assert!((detections[0].score - 0.81).abs() < 1e-5);
}

#[test]
fn test_concurrent_predict() {
    let output = coco_output(&[
        coco_row([320.0, 320.0, 100.0, 50.0], 0.9, 3, 0.95),
        coco_row([100.0, 100.0, 40.0, 40.0], 0.8, 16, 0.9),
    ]);
    let detector = Arc::new(coco_detector(FixedEngine(vec![output])));
    let expected = detector.predict(&DynamicImage::new_rgb8(640, 640)).unwrap();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let detector = Arc::clone(&detector);
                scope.spawn(move || detector.predict(&DynamicImage::new_rgb8(640, 640)).unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}

#[test]
fn test_empty_image_is_image_error() {
    let detector = coco_detector(FixedEngine(vec![]));
    assert!(matches!(
        detector.predict(&DynamicImage::new_rgb8(0, 10)),
        Err(InferenceError::ImageError(_))
    ));
}
