use std::path::PathBuf;
use std::sync::Arc;

use engine_logging::{sink_info, sink_warn, LogSink};
use pinharvest_core::{RunSummary, WorkGroups};

use crate::config::EngineConfig;
use crate::discover::{discover_pins, HttpSearchDiscovery, PinDiscovery};
use crate::download::Downloader;
use crate::fetch::{Fetcher, ReqwestFetcher};
use crate::parser::LinkParser;
use crate::persist::{ensure_output_dir, ImageWriter};
use crate::HarvestError;

/// What a finished run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestOutcome {
    pub summary: RunSummary,
    /// Dated directory the images went to; `None` if nothing was downloaded.
    pub run_root: Option<PathBuf>,
    pub images: WorkGroups<PathBuf>,
}

/// Runs discovery, link parsing and downloading for a list of prompts.
pub struct Harvester {
    config: EngineConfig,
    discovery: Arc<dyn PinDiscovery>,
    page_fetcher: Arc<dyn Fetcher>,
    image_fetcher: Arc<dyn Fetcher>,
    log: Arc<dyn LogSink>,
}

impl Harvester {
    /// Harvester talking to the live site over HTTP.
    pub fn new(config: EngineConfig, log: Arc<dyn LogSink>) -> Result<Self, HarvestError> {
        let page_fetcher: Arc<dyn Fetcher> =
            Arc::new(ReqwestFetcher::new(config.page_fetch.clone()));
        let image_fetcher: Arc<dyn Fetcher> =
            Arc::new(ReqwestFetcher::new(config.image_fetch.clone()));
        let discovery = HttpSearchDiscovery::new(
            page_fetcher.clone(),
            config.discovery.clone(),
            log.clone(),
        )?;
        Ok(Self::with_parts(
            config,
            Arc::new(discovery),
            page_fetcher,
            image_fetcher,
            log,
        ))
    }

    pub fn with_parts(
        config: EngineConfig,
        discovery: Arc<dyn PinDiscovery>,
        page_fetcher: Arc<dyn Fetcher>,
        image_fetcher: Arc<dyn Fetcher>,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            config,
            discovery,
            page_fetcher,
            image_fetcher,
            log,
        }
    }

    pub async fn run(
        &self,
        prompts: &[String],
        images_per_prompt: usize,
    ) -> Result<HarvestOutcome, HarvestError> {
        let started_at = self.config.now();
        let mut outcome = HarvestOutcome {
            summary: RunSummary {
                prompts: prompts.len(),
                ..RunSummary::default()
            },
            ..HarvestOutcome::default()
        };

        let pins = discover_pins(&*self.discovery, prompts, images_per_prompt, &*self.log).await?;
        outcome.summary.pins_found = pins.total_units();
        if pins.total_units() == 0 {
            sink_warn!(self.log, "No pins found for any prompt; nothing to download");
            return Ok(outcome);
        }

        let parser = LinkParser::new(pins, self.page_fetcher.clone(), &self.config, self.log.clone())?;
        let parsed = parser.parse().await?;
        outcome.summary.parsing = parsed.report.counts();
        if parsed.groups.total_units() == 0 {
            sink_warn!(self.log, "No image links could be extracted; nothing to download");
            return Ok(outcome);
        }

        ensure_output_dir(&self.config.output_root)?;
        let writer = ImageWriter::new(&self.config.output_root, started_at);
        let run_root = writer.run_root().to_path_buf();
        let downloader = Downloader::new(
            parsed.groups.clone(),
            self.image_fetcher.clone(),
            writer,
            &self.config,
            self.log.clone(),
        )?;
        let saved = downloader.download().await?;
        outcome.summary.downloading = saved.report.counts();
        outcome.images = saved.groups.clone();
        outcome.run_root = Some(run_root);

        sink_info!(self.log, "Run finished: {}", outcome.summary);
        Ok(outcome)
    }
}
