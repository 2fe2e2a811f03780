use std::sync::Arc;

use engine_logging::{sink_debug, sink_info, LogSink};
use pinharvest_core::GroupKey;
use tokio::sync::Semaphore;

use crate::fetch::{DroppedUnitPolicy, FetchSettings, Fetcher, PermitScope};
use crate::pipeline::{Batch, Producer};
use crate::{DroppedUnit, FetchError, FetchOutput};

/// Fetch-with-retry producer.
///
/// Resolves a group's URLs one after another, retrying transient failures up
/// to `max_attempts` and dropping a URL once its attempts run out. Output
/// keeps input order minus the dropped URLs. Every worker built from the same
/// limiter shares its bound on simultaneous connections.
pub struct FetchWorker {
    fetcher: Arc<dyn Fetcher>,
    limiter: Arc<Semaphore>,
    settings: FetchSettings,
    log: Arc<dyn LogSink>,
}

struct Exhausted {
    attempts: u32,
    error: FetchError,
}

impl FetchWorker {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        limiter: Arc<Semaphore>,
        settings: FetchSettings,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            fetcher,
            limiter,
            settings,
            log,
        }
    }

    /// Builds a worker with its own limiter of `connection_limit` permits.
    pub fn with_connection_limit(
        fetcher: Arc<dyn Fetcher>,
        connection_limit: usize,
        settings: FetchSettings,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self::new(
            fetcher,
            Arc::new(Semaphore::new(connection_limit)),
            settings,
            log,
        )
    }

    pub async fn fetch_batch(&self, group: &GroupKey, urls: Vec<String>) -> Batch<FetchOutput> {
        sink_info!(self.log, "Fetching {} item(s) for '{}'", urls.len(), group);

        // Held until the batch ends; `None` in per-request mode.
        let _batch_permit = match self.settings.permit_scope {
            PermitScope::PerBatch => self.limiter.acquire().await.ok(),
            PermitScope::PerRequest => None,
        };

        let mut batch = Batch::with_capacity(urls.len());
        for (position, url) in urls.into_iter().enumerate() {
            match self.fetch_with_retry(group, &url).await {
                Ok(output) => batch.units.push(output),
                Err(Exhausted { attempts, error }) => {
                    sink_info!(
                        self.log,
                        "Giving up on {} for '{}' after {} attempt(s): {}",
                        url,
                        group,
                        attempts,
                        error
                    );
                    if self.settings.dropped_units == DroppedUnitPolicy::Report {
                        batch.dropped.push(DroppedUnit {
                            position,
                            url,
                            attempts,
                            error,
                        });
                    }
                }
            }
        }

        sink_info!(
            self.log,
            "Finished fetching for '{}': {} retrieved",
            group,
            batch.units.len()
        );
        batch
    }

    async fn fetch_with_retry(&self, group: &GroupKey, url: &str) -> Result<FetchOutput, Exhausted> {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempts = 0;
        loop {
            attempts += 1;
            sink_debug!(self.log, "[{}] attempt {} for {}", group, attempts, url);

            let result = {
                let _request_permit = match self.settings.permit_scope {
                    PermitScope::PerRequest => self.limiter.acquire().await.ok(),
                    PermitScope::PerBatch => None,
                };
                self.fetcher.fetch(url).await
            };

            match result {
                Ok(output) => return Ok(output),
                Err(error) if error.is_retryable() && attempts < max_attempts => {
                    sink_debug!(
                        self.log,
                        "[{}] attempt {} for {} failed: {}; retrying",
                        group,
                        attempts,
                        url,
                        error
                    );
                    if !self.settings.retry_delay.is_zero() {
                        tokio::time::sleep(self.settings.retry_delay).await;
                    }
                }
                Err(error) => return Err(Exhausted { attempts, error }),
            }
        }
    }
}

#[async_trait::async_trait]
impl Producer for FetchWorker {
    type Unit = String;
    type Output = FetchOutput;

    async fn produce(&self, group: &GroupKey, units: Vec<String>) -> Batch<FetchOutput> {
        self.fetch_batch(group, units).await
    }
}
