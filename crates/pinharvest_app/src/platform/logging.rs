//! Logger setup for the `pinharvest` binary.
//!
//! Everything at Info (or Debug with `--debug`) goes to the terminal. Errors
//! are also written to `./pinharvest-error-<stamp>.log`.

use std::fs::File;
use std::path::PathBuf;

use chrono::Local;
use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

/// Installs the global logger. Returns the error log path if the file could
/// be created.
pub fn initialize(debug: bool) -> Option<PathBuf> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let config = build_config();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    let log_path = error_log_path();
    let created = match create_error_logger(&log_path, config) {
        Some(file_logger) => {
            loggers.push(file_logger);
            Some(log_path)
        }
        None => None,
    };

    let _ = CombinedLogger::init(loggers);
    created
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        // Keep HTTP client internals out of debug output.
        .add_filter_allow_str("pinharvest")
        .build()
}

fn error_log_path() -> PathBuf {
    PathBuf::from(format!(
        "./pinharvest-error-{}.log",
        Local::now().format("%Y%m%d-%H%M%S")
    ))
}

fn create_error_logger(log_path: &PathBuf, config: Config) -> Option<Box<WriteLogger<File>>> {
    match File::create(log_path) {
        Ok(file) => Some(WriteLogger::new(LevelFilter::Error, config, file)),
        Err(err) => {
            eprintln!("Warning: Could not create log file at {:?}: {}", log_path, err);
            None
        }
    }
}
