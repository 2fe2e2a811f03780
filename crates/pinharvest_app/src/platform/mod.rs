//! Command-line front end: argument parsing, config file, logger setup and
//! the run itself.
mod app;
mod cli;
mod config;
mod logging;

pub(crate) use app::run_app;
