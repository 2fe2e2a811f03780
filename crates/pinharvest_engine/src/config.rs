use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};

use crate::discover::DiscoverySettings;
use crate::fetch::FetchSettings;
use crate::pipeline::PipelineSettings;

/// Source of the local wall-clock time a run is stamped with.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Everything a harvest run needs besides its prompts.
#[derive(Clone)]
pub struct EngineConfig {
    pub page_fetch: FetchSettings,
    pub image_fetch: FetchSettings,
    pub pipeline: PipelineSettings,
    pub discovery: DiscoverySettings,
    /// Directory the dated run root is created in.
    pub output_root: PathBuf,
    pub clock: Clock,
}

impl EngineConfig {
    pub fn default_with_output(output_root: PathBuf) -> Self {
        Self {
            page_fetch: FetchSettings::for_pages(),
            image_fetch: FetchSettings::for_images(),
            pipeline: PipelineSettings::default(),
            discovery: DiscoverySettings::default(),
            output_root,
            clock: Arc::new(|| Local::now().naive_local()),
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("page_fetch", &self.page_fetch)
            .field("image_fetch", &self.image_fetch)
            .field("pipeline", &self.pipeline)
            .field("discovery", &self.discovery)
            .field("output_root", &self.output_root)
            .finish_non_exhaustive()
    }
}
