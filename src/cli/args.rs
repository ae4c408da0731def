// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{DecodeMode, ModelConfig};

/// CLI arguments parser.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = r"Examples:
    yolov5-inference predict --model yolov5s.onnx --source bus.jpg
    yolov5-inference predict -m yolov5s.onnx -s images/ --conf 0.3 --iou 0.5
    yolov5-inference predict -m yolov5s6.onnx -s bus.jpg --preset p6
    yolov5-inference predict -m yolov5s-raw.onnx -s bus.jpg --decode anchors \
        --output 345 --output 403 --output 461")]
pub struct Cli {
    #[command(subcommand)]
    /// Subcommand to execute.
    pub command: Commands,
}

/// Commands for the CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run detection on an image or a directory of images
    Predict(PredictArgs),
}

/// Model layout preset.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    /// Three scales (strides 8/16/32), 640 input
    #[default]
    P5,
    /// Four scales (strides 8/16/32/64), 1280 input
    P6,
}

/// How raw outputs are decoded.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Decode {
    /// Single fused output with boxes already in input pixels
    #[default]
    Detect,
    /// One raw logit output per scale, decoded with grid and anchors
    Anchors,
}

impl From<Decode> for DecodeMode {
    fn from(decode: Decode) -> Self {
        match decode {
            Decode::Detect => Self::Detect,
            Decode::Anchors => Self::Anchors,
        }
    }
}

/// Arguments for the predict command.
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Path to ONNX model file
    #[arg(short, long)]
    pub model: String,

    /// Image file or directory of images
    #[arg(short, long)]
    pub source: String,

    /// Objectness threshold
    #[arg(long, default_value_t = 0.20)]
    pub conf: f32,

    /// Threshold on objectness times class score
    #[arg(long, default_value_t = 0.25)]
    pub mul_conf: f32,

    /// `IoU` threshold for NMS
    #[arg(long, default_value_t = 0.45)]
    pub iou: f32,

    /// Inference image size (square), overrides the preset
    #[arg(long)]
    pub imgsz: Option<u32>,

    /// Model layout preset
    #[arg(long, value_enum, default_value_t = Preset::P5)]
    pub preset: Preset,

    /// Output decoding
    #[arg(long, value_enum, default_value_t = Decode::Detect)]
    pub decode: Decode,

    /// Output tensor name; repeat once per scale for anchor decoding
    #[arg(long = "output")]
    pub outputs: Vec<String>,

    /// Intra-op threads for ONNX Runtime (0 = runtime default)
    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    /// Show verbose output
    #[arg(long, default_value_t = false)]
    pub verbose: bool,
}

impl PredictArgs {
    /// Model configuration described by these arguments.
    ///
    /// Output names are left at the preset's defaults when none were given.
    /// An explicit `imgsz` also resizes every scale's grid to `imgsz / stride`.
    #[must_use]
    pub fn model_config(&self) -> ModelConfig {
        let mut config = match self.preset {
            Preset::P5 => ModelConfig::coco_p5(),
            Preset::P6 => ModelConfig::coco_p6(),
        }
        .with_confidence(self.conf)
        .with_mul_confidence(self.mul_conf)
        .with_overlap(self.iou);

        if let Some(size) = self.imgsz {
            config = config.with_size(size, size);
            config.shapes = config.strides.iter().map(|&s| (size / s) as usize).collect();
        }

        config.decode = self.decode.into();
        if !self.outputs.is_empty() {
            config.outputs.clone_from(&self.outputs);
        }

        config
    }
}
