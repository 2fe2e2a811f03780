//! Pin page stage: fetches every pin page of every group and extracts the
//! full-resolution image link from each.

use std::sync::Arc;

use engine_logging::{sink_debug, sink_info, LogSink};
use pinharvest_core::{GroupKey, WorkGroups};
use tokio::sync::OnceCell;

use crate::config::EngineConfig;
use crate::decode::decode_page;
use crate::extract::{ImageLinkExtractor, LinkExtractor};
use crate::fetch::Fetcher;
use crate::pipeline::{run_pipeline, validate_input, PipelineOutput, PipelineSettings, UnitWorker};
use crate::worker::FetchWorker;
use crate::{FetchOutput, PipelineError, StageError};

/// Decodes one fetched pin page and extracts its image link.
pub struct PageLinkWorker {
    extractor: Arc<dyn LinkExtractor>,
}

impl PageLinkWorker {
    pub fn new(extractor: Arc<dyn LinkExtractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait::async_trait]
impl UnitWorker for PageLinkWorker {
    type Input = FetchOutput;
    type Output = String;

    async fn process(
        &self,
        _group: &GroupKey,
        _position: usize,
        page: FetchOutput,
    ) -> Result<String, StageError> {
        let text = decode_page(&page)?;
        let link = self
            .extractor
            .extract(&text.html, Some(&page.metadata.final_url))?;
        Ok(link)
    }
}

/// Turns pin URLs grouped by prompt into image URLs grouped the same way.
///
/// The pipeline runs at most once per parser. Later calls to [`parse`] hand
/// back the first result without touching the network, for as long as the
/// parser lives.
///
/// [`parse`]: LinkParser::parse
pub struct LinkParser {
    pins: WorkGroups<String>,
    fetch: Arc<FetchWorker>,
    pages: Arc<PageLinkWorker>,
    settings: PipelineSettings,
    log: Arc<dyn LogSink>,
    parsed: OnceCell<PipelineOutput<String>>,
}

impl LinkParser {
    /// Checks the input up front; nothing is fetched until [`parse`].
    ///
    /// [`parse`]: LinkParser::parse
    pub fn new(
        pins: WorkGroups<String>,
        fetcher: Arc<dyn Fetcher>,
        config: &EngineConfig,
        log: Arc<dyn LogSink>,
    ) -> Result<Self, PipelineError> {
        let extractor = ImageLinkExtractor::pin_closeup()
            .map_err(|err| PipelineError::InvalidSettings(err.to_string()))?;
        Self::with_extractor(pins, fetcher, Arc::new(extractor), config, log)
    }

    pub fn with_extractor(
        pins: WorkGroups<String>,
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn LinkExtractor>,
        config: &EngineConfig,
        log: Arc<dyn LogSink>,
    ) -> Result<Self, PipelineError> {
        validate_input(&pins, &config.pipeline)?;
        let fetch = FetchWorker::with_connection_limit(
            fetcher,
            config.pipeline.connection_limit,
            config.page_fetch.clone(),
            log.clone(),
        );
        Ok(Self {
            pins,
            fetch: Arc::new(fetch),
            pages: Arc::new(PageLinkWorker::new(extractor)),
            settings: config.pipeline.clone(),
            log,
            parsed: OnceCell::new(),
        })
    }

    pub async fn parse(&self) -> Result<&PipelineOutput<String>, PipelineError> {
        if self.parsed.initialized() {
            sink_debug!(self.log, "Image links already extracted; reusing them");
        }
        self.parsed
            .get_or_try_init(|| async {
                sink_info!(
                    self.log,
                    "Extracting image links from {} pin(s) in {} group(s)",
                    self.pins.total_units(),
                    self.pins.len()
                );
                run_pipeline(
                    self.pins.clone(),
                    self.fetch.clone(),
                    self.pages.clone(),
                    &self.settings,
                    self.log.clone(),
                )
                .await
            })
            .await
    }

    /// The result of an earlier [`parse`], if one has completed.
    ///
    /// [`parse`]: LinkParser::parse
    pub fn cached(&self) -> Option<&PipelineOutput<String>> {
        self.parsed.get()
    }
}
