// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::process;

use clap::Parser;

use yolov5_inference::cli::args::{Cli, Commands};
use yolov5_inference::cli::predict::run_prediction;
use yolov5_inference::error;

fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Predict(args) => {
            if let Err(e) = run_prediction(args) {
                error!("{e}");
                process::exit(1);
            }
        }
    }
}
