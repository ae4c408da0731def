// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Console logging macros.
//!
//! Library code only emits through [`verbose!`](crate::verbose), which is
//! silent unless verbosity was switched on with [`set_verbose`].

use std::sync::atomic::{AtomicBool, Ordering};

use crate::results::Speed;

/// Global verbosity flag. Off by default so library users get a quiet pipeline.
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Set the global verbosity flag.
pub fn set_verbose(verbose: bool) {
    VERBOSE.store(verbose, Ordering::Relaxed);
}

/// Check if verbose output is enabled.
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// Format per-stage timings the way the predict command reports them.
#[must_use]
pub fn format_speed(speed: &Speed, imgsz: (u32, u32)) -> String {
    format!(
        "Speed: {:.1}ms preprocess, {:.1}ms inference, {:.1}ms postprocess \
         per image at shape (1, 3, {}, {})",
        speed.preprocess.unwrap_or_default(),
        speed.inference.unwrap_or_default(),
        speed.postprocess.unwrap_or_default(),
        imgsz.1,
        imgsz.0
    )
}

/// Macro for standard info messages.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {{
        println!("{}", format!($($arg)*));
    }}
}

/// Macro for warning messages.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        eprintln!("{} {}", "WARNING ⚠️".yellow().bold(), format!($($arg)*));
    }}
}

/// Macro for error messages.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        eprintln!("{} {}", "Error:".red().bold(), format!($($arg)*));
    }}
}

/// Macro for success messages.
#[macro_export]
macro_rules! success {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        println!("{} {}", "✅".green(), format!($($arg)*));
    }}
}

/// Macro for verbose messages, dimmed so they stand apart from results.
#[macro_export]
macro_rules! verbose {
    ($($arg:tt)*) => {{
        if $crate::cli::logging::is_verbose() {
            use colored::Colorize;
            println!("{}", format!($($arg)*).dimmed());
        }
    }}
}

/// Macro for section headers.
#[macro_export]
macro_rules! section {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        if $crate::cli::logging::is_verbose() {
            println!();
            println!("{}", format!($($arg)*).cyan().bold());
        }
    }}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_toggle() {
        set_verbose(true);
        assert!(is_verbose());

        set_verbose(false);
        assert!(!is_verbose());
    }

    #[test]
    fn test_macros_repeat_in_one_scope() {
        let name = "bus";
        info!("info {name}");
        info!("info again");
        warn!("warn {name}");
        warn!("warn again");
        error!("error {name}");
        error!("error again");
        success!("success {name}");
        success!("success again");
        verbose!("verbose {name}");
        verbose!("verbose again");
        section!("section {name}");
        section!("section again");
    }

    #[test]
    fn test_format_speed() {
        let line = format_speed(&Speed::new(1.24, 10.0, 0.5), (640, 480));
        assert_eq!(
            line,
            "Speed: 1.2ms preprocess, 10.0ms inference, 0.5ms postprocess \
             per image at shape (1, 3, 480, 640)"
        );
    }
}
