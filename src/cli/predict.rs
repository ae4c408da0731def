// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cli::args::PredictArgs;
use crate::cli::logging::{format_speed, set_verbose};
use crate::config::{DecodeMode, ModelConfig};
use crate::engine::{EngineOptions, OrtEngine};
use crate::error::{InferenceError, Result};
use crate::results::{Detection, Speed};
use crate::utils::pluralize;
use crate::{Detector, VERSION, info, section, success, verbose, warn};

/// Image extensions picked up when the source is a directory.
const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "webp", "tiff"];

/// Run detection for the `predict` command.
///
/// # Errors
///
/// Returns an error if the model can't be loaded, the source has no images,
/// or inference fails on any image.
pub fn run_prediction(args: &PredictArgs) -> Result<()> {
    set_verbose(args.verbose);

    let options = EngineOptions::new().with_threads(args.threads);
    let engine = OrtEngine::from_file(&args.model, &options)?;

    let mut config = args.model_config();
    bind_model_names(&mut config, &engine, !args.outputs.is_empty());

    let detector = Detector::with_engine(engine, config)?;
    let sources = collect_sources(Path::new(&args.source))?;

    info!("YOLOv5 Inference {VERSION} 🚀 Rust ONNX Runtime CPU");
    section!(
        "Predict: {} ({} image(s), {} classes)",
        args.model,
        sources.len(),
        detector.config().num_classes()
    );

    detector.warmup()?;

    let mut total = Speed::new(0.0, 0.0, 0.0);
    for (index, path) in sources.iter().enumerate() {
        let image = image::open(path).map_err(|e| {
            InferenceError::ImageError(format!("Failed to load image {}: {e}", path.display()))
        })?;
        let (detections, speed) = detector.predict_with_speed(&image)?;

        let summary = format_class_counts(&detections);
        info!(
            "image {}/{} {}: {}x{} {}, {:.1}ms",
            index + 1,
            sources.len(),
            path.display(),
            image.width(),
            image.height(),
            if summary.is_empty() { "(no detections)" } else { summary.as_str() },
            speed.inference.unwrap_or_default()
        );
        for detection in &detections {
            verbose!("  {detection}");
        }

        total = accumulate(&total, &speed);
    }

    #[allow(clippy::cast_precision_loss)]
    let count = sources.len() as f64;
    let mean = Speed::new(
        total.preprocess.unwrap_or_default() / count,
        total.inference.unwrap_or_default() / count,
        total.postprocess.unwrap_or_default() / count,
    );
    info!("{}", format_speed(&mean, detector.input_size()));
    success!("Done");

    detector.close();
    Ok(())
}

/// Fill input/output names from the loaded model where the preset's defaults
/// don't match what the model declares.
fn bind_model_names(config: &mut ModelConfig, engine: &OrtEngine, explicit_outputs: bool) {
    if let Some(input) = engine.input_names().into_iter().next() {
        config.input_name = input;
    }

    if explicit_outputs {
        return;
    }

    let declared = engine.output_names();
    match config.decode {
        DecodeMode::Detect => {
            if !declared.iter().any(|name| config.outputs.contains(name)) {
                if let Some(first) = declared.first() {
                    warn!(
                        "Model has no output named '{}', using '{first}'",
                        config.outputs.join(", ")
                    );
                    config.outputs = vec![first.clone()];
                }
            }
        }
        DecodeMode::Anchors => {
            // Exports with raw heads list the fused detect output first and
            // the per-scale maps after it.
            let scales = config.strides.len();
            if declared.len() >= scales {
                config.outputs = declared[declared.len() - scales..].to_vec();
            }
        }
    }
}

/// Resolve a source path to a sorted list of image files.
fn collect_sources(source: &Path) -> Result<Vec<PathBuf>> {
    if source.is_file() {
        return Ok(vec![source.to_path_buf()]);
    }

    if !source.is_dir() {
        return Err(InferenceError::ImageError(format!(
            "Source not found: {}",
            source.display()
        )));
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(source)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_image(path))
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(InferenceError::ImageError(format!(
            "No images found in {}",
            source.display()
        )));
    }

    Ok(paths)
}

fn is_image(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn accumulate(total: &Speed, speed: &Speed) -> Speed {
    Speed::new(
        total.preprocess.unwrap_or_default() + speed.preprocess.unwrap_or_default(),
        total.inference.unwrap_or_default() + speed.inference.unwrap_or_default(),
        total.postprocess.unwrap_or_default() + speed.postprocess.unwrap_or_default(),
    )
}

/// Format detections like "4 persons, 1 bus", ordered by class id.
fn format_class_counts(detections: &[Detection]) -> String {
    let mut counts: BTreeMap<usize, (&str, usize)> = BTreeMap::new();
    for detection in detections {
        counts
            .entry(detection.label.id)
            .or_insert((detection.label.name.as_str(), 0))
            .1 += 1;
    }

    counts
        .values()
        .map(|&(name, count)| {
            let name = if count > 1 {
                pluralize(name)
            } else {
                name.to_string()
            };
            format!("{count} {name}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}
