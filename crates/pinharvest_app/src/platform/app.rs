use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use engine_logging::{engine_debug, engine_error, engine_info, engine_warn, FacadeLogSink};
use pinharvest_engine::{HarvestOutcome, Harvester};

use super::cli::Args;
use super::config::RunConfig;
use super::logging;

/// Exit code used when the run is cut short by Ctrl-C.
const INTERRUPTED: u8 = 130;
const BAD_INPUT: u8 = 2;

enum RunEnd {
    Finished(HarvestOutcome),
    Interrupted,
}

pub fn run_app() -> ExitCode {
    let args = Args::parse();
    let config = match RunConfig::from_args(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("pinharvest: {err}");
            return ExitCode::from(BAD_INPUT);
        }
    };
    let error_log = logging::initialize(config.debug);
    engine_debug!(
        "Prompts: {:?}, {} image(s) each",
        config.prompts,
        config.images_per_prompt
    );

    match execute(config) {
        Ok(RunEnd::Finished(outcome)) => {
            report(&outcome);
            ExitCode::SUCCESS
        }
        Ok(RunEnd::Interrupted) => {
            engine_info!("Keyboard interrupt detected; shutting down");
            ExitCode::from(INTERRUPTED)
        }
        Err(err) => {
            match &error_log {
                Some(path) => engine_info!("The run failed; details are in {}", path.display()),
                None => engine_info!("The run failed"),
            }
            engine_error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Drives one harvest on a single-threaded runtime, racing it against Ctrl-C.
fn execute(config: RunConfig) -> anyhow::Result<RunEnd> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;

    runtime.block_on(harvest(config))
}

async fn harvest(config: RunConfig) -> anyhow::Result<RunEnd> {
    let harvester = Harvester::new(config.engine, FacadeLogSink::shared("pinharvest"))
        .context("failed to set up the harvester")?;

    tokio::select! {
        outcome = harvester.run(&config.prompts, config.images_per_prompt) => {
            let outcome = outcome.context("harvest failed")?;
            Ok(RunEnd::Finished(outcome))
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            Ok(RunEnd::Interrupted)
        }
    }
}

fn report(outcome: &HarvestOutcome) {
    engine_info!("{}", outcome.summary);
    if let Some(root) = &outcome.run_root {
        engine_info!("Images saved under {}", root.display());
    }
    for (group, paths) in outcome.images.iter() {
        engine_debug!("'{}': {} file(s)", group, paths.len());
    }
    if !outcome.summary.is_complete() {
        engine_warn!("Some pins or images were skipped; rerun with --debug for details");
    }
}
