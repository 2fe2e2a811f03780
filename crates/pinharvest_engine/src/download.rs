//! Image stage: fetches every extracted image link and saves the bytes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use engine_logging::{sink_debug, sink_info, LogSink};
use pinharvest_core::{GroupKey, WorkGroups};
use tokio::sync::OnceCell;

use crate::config::EngineConfig;
use crate::fetch::Fetcher;
use crate::persist::ImageWriter;
use crate::pipeline::{run_pipeline, validate_input, PipelineOutput, PipelineSettings, UnitWorker};
use crate::worker::FetchWorker;
use crate::{FetchOutput, PipelineError, StageError};

/// Saves each downloaded image as the next numbered file of its group.
///
/// Numbers count successful saves, so a unit that fails leaves no gap.
pub struct SaveWorker {
    writer: ImageWriter,
    saved: Mutex<HashMap<GroupKey, usize>>,
    log: Arc<dyn LogSink>,
}

impl SaveWorker {
    pub fn new(writer: ImageWriter, log: Arc<dyn LogSink>) -> Self {
        Self {
            writer,
            saved: Mutex::new(HashMap::new()),
            log,
        }
    }

    fn saved_count(&self) -> std::sync::MutexGuard<'_, HashMap<GroupKey, usize>> {
        self.saved.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl UnitWorker for SaveWorker {
    type Input = FetchOutput;
    type Output = PathBuf;

    // One consumer handles a group's batch in order, so the count read here
    // cannot move before the write below finishes.
    async fn process(
        &self,
        group: &GroupKey,
        _position: usize,
        image: FetchOutput,
    ) -> Result<PathBuf, StageError> {
        let number = self.saved_count().get(group).copied().unwrap_or(0) + 1;
        let writer = self.writer.clone();
        let key = group.clone();
        let path = tokio::task::spawn_blocking(move || writer.write_image(&key, number, &image.bytes))
            .await
            .map_err(|err| StageError::Task(err.to_string()))??;
        self.saved_count().insert(group.clone(), number);
        sink_debug!(self.log, "Saved {}", path.display());
        Ok(path)
    }
}

/// Downloads image links grouped by prompt into the run's output tree.
///
/// Like [`LinkParser`](crate::LinkParser), the pipeline runs at most once per
/// downloader.
pub struct Downloader {
    links: WorkGroups<String>,
    fetch: Arc<FetchWorker>,
    save: Arc<SaveWorker>,
    settings: PipelineSettings,
    log: Arc<dyn LogSink>,
    saved: OnceCell<PipelineOutput<PathBuf>>,
}

impl Downloader {
    pub fn new(
        links: WorkGroups<String>,
        fetcher: Arc<dyn Fetcher>,
        writer: ImageWriter,
        config: &EngineConfig,
        log: Arc<dyn LogSink>,
    ) -> Result<Self, PipelineError> {
        validate_input(&links, &config.pipeline)?;
        let fetch = FetchWorker::with_connection_limit(
            fetcher,
            config.pipeline.connection_limit,
            config.image_fetch.clone(),
            log.clone(),
        );
        Ok(Self {
            links,
            fetch: Arc::new(fetch),
            save: Arc::new(SaveWorker::new(writer, log.clone())),
            settings: config.pipeline.clone(),
            log,
            saved: OnceCell::new(),
        })
    }

    pub async fn download(&self) -> Result<&PipelineOutput<PathBuf>, PipelineError> {
        self.saved
            .get_or_try_init(|| async {
                sink_info!(
                    self.log,
                    "Downloading {} image(s) in {} group(s)",
                    self.links.total_units(),
                    self.links.len()
                );
                run_pipeline(
                    self.links.clone(),
                    self.fetch.clone(),
                    self.save.clone(),
                    &self.settings,
                    self.log.clone(),
                )
                .await
            })
            .await
    }
}
