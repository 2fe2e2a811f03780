//! Pin discovery: turns search prompts into ordered lists of pin page URLs.

use std::sync::Arc;
use std::time::Duration;

use engine_logging::{sink_debug, sink_info, LogSink};
use pinharvest_core::{merge_unique_links, resolve_link, GroupKey, WorkGroups};
use scraper::{Html, Selector};
use url::Url;

use crate::decode::decode_page;
use crate::fetch::Fetcher;
use crate::{DiscoveryError, FetchOutput};

/// Anchors inside the result cards of a search page.
pub const PIN_WRAPPER_LINKS: &str = r#"div[data-test-id="pinWrapper"] a[href]"#;

const EMPTY_RESULT_MARKERS: &[&str] = &[
    "Não foi possível encontrar Pins para esta pesquisa",
    "We couldn't find any Pins for this search",
];

const POLICY_BLOCK_MARKERS: &[&str] = &[
    "Pins sobre esse interesse costumam violar as",
    "Nudez é permitida no Pinterest, mas com ressalvas",
    "Pins about this topic often violate",
];

#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub search_url: String,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            search_url: "https://br.pinterest.com/search/pins/".to_string(),
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Result of searching for one prompt.
#[derive(Debug)]
pub enum DiscoveryOutcome {
    Success(Vec<String>),
    /// The site reported no pins for the prompt.
    EmptyResult,
    /// The site withheld results on content-policy grounds.
    PolicyBlocked,
    Unrecoverable(DiscoveryError),
}

#[async_trait::async_trait]
pub trait PinDiscovery: Send + Sync {
    /// Finds at most `max` distinct pin URLs for `prompt`, in result order.
    async fn discover(&self, prompt: &str, max: usize) -> DiscoveryOutcome;
}

/// Runs discovery for every term in order.
///
/// Prompts with no results or blocked results are left out of the returned
/// groups. An unrecoverable failure for any prompt aborts the whole call.
pub async fn discover_pins(
    discovery: &dyn PinDiscovery,
    terms: &[String],
    max_per_term: usize,
    log: &dyn LogSink,
) -> Result<WorkGroups<String>, DiscoveryError> {
    let mut groups = WorkGroups::new();
    for term in terms {
        let key = GroupKey::new(term.as_str())
            .map_err(|_| DiscoveryError::InvalidPrompt(term.clone()))?;
        sink_info!(log, "Searching pins for '{}'", term);

        match discovery.discover(term, max_per_term).await {
            DiscoveryOutcome::Success(links) => {
                if links.len() < max_per_term {
                    sink_info!(
                        log,
                        "Only {} of {} pin(s) found for '{}'",
                        links.len(),
                        max_per_term,
                        term
                    );
                }
                groups.insert(key, links);
            }
            DiscoveryOutcome::EmptyResult => {
                sink_info!(log, "No pins found for '{}'; skipping it", term);
            }
            DiscoveryOutcome::PolicyBlocked => {
                sink_info!(log, "Results for '{}' are blocked by the site; skipping it", term);
            }
            DiscoveryOutcome::Unrecoverable(error) => return Err(error),
        }
    }
    Ok(groups)
}

/// Reads pins from the statically served search results page.
pub struct HttpSearchDiscovery {
    fetcher: Arc<dyn Fetcher>,
    settings: DiscoverySettings,
    pin_links: Selector,
    log: Arc<dyn LogSink>,
}

impl HttpSearchDiscovery {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        settings: DiscoverySettings,
        log: Arc<dyn LogSink>,
    ) -> Result<Self, DiscoveryError> {
        Url::parse(&settings.search_url)
            .map_err(|err| DiscoveryError::InvalidSearchUrl(err.to_string()))?;
        let pin_links = Selector::parse(PIN_WRAPPER_LINKS)
            .map_err(|err| DiscoveryError::InvalidSelector(err.to_string()))?;
        Ok(Self {
            fetcher,
            settings,
            pin_links,
            log,
        })
    }

    fn search_url(&self, prompt: &str) -> Result<Url, DiscoveryError> {
        Url::parse_with_params(&self.settings.search_url, &[("q", prompt), ("rs", "typed")])
            .map_err(|err| DiscoveryError::InvalidSearchUrl(err.to_string()))
    }

    async fn fetch_results(&self, prompt: &str, url: &Url) -> Result<FetchOutput, DiscoveryError> {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.fetcher.fetch(url.as_str()).await {
                Ok(output) => return Ok(output),
                Err(err) if err.is_retryable() && attempts < max_attempts => {
                    sink_info!(
                        self.log,
                        "Attempt {} of {} to reach the search page failed ({}); trying again",
                        attempts,
                        max_attempts,
                        err
                    );
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
                Err(source) => {
                    return Err(DiscoveryError::ConnectionFailure {
                        prompt: prompt.to_string(),
                        attempts,
                        source,
                    })
                }
            }
        }
    }

    fn classify(&self, prompt: &str, html: &str, base: &str, max: usize) -> DiscoveryOutcome {
        let doc = Html::parse_document(html);
        let found = doc
            .select(&self.pin_links)
            .filter_map(|anchor| anchor.value().attr("href"))
            .filter_map(|href| resolve_link(base, href));
        let mut links = Vec::new();
        merge_unique_links(&mut links, found, max);

        if !links.is_empty() {
            return DiscoveryOutcome::Success(links);
        }
        if EMPTY_RESULT_MARKERS.iter().any(|marker| html.contains(marker)) {
            return DiscoveryOutcome::EmptyResult;
        }
        if POLICY_BLOCK_MARKERS.iter().any(|marker| html.contains(marker)) {
            return DiscoveryOutcome::PolicyBlocked;
        }
        DiscoveryOutcome::Unrecoverable(DiscoveryError::StructuralMismatch {
            prompt: prompt.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl PinDiscovery for HttpSearchDiscovery {
    async fn discover(&self, prompt: &str, max: usize) -> DiscoveryOutcome {
        if max == 0 {
            return DiscoveryOutcome::Success(Vec::new());
        }
        let url = match self.search_url(prompt) {
            Ok(url) => url,
            Err(err) => return DiscoveryOutcome::Unrecoverable(err),
        };
        sink_debug!(self.log, "Requesting {}", url);

        let output = match self.fetch_results(prompt, &url).await {
            Ok(output) => output,
            Err(err) => return DiscoveryOutcome::Unrecoverable(err),
        };
        let page = match decode_page(&output) {
            Ok(page) => page,
            Err(source) => {
                return DiscoveryOutcome::Unrecoverable(DiscoveryError::Decode {
                    prompt: prompt.to_string(),
                    source,
                })
            }
        };
        self.classify(prompt, &page.html, &output.metadata.final_url, max)
    }
}
