//! Pinharvest engine: discovery, the producer/consumer pipeline and the
//! parsing and download stages built on it.
mod config;
mod decode;
mod dirname;
mod discover;
mod download;
mod extract;
mod fetch;
mod harvest;
mod parser;
mod persist;
mod pipeline;
mod types;
mod worker;

pub use config::{Clock, EngineConfig};
pub use decode::{decode_html, decode_page, DecodeError, PageText};
pub use dirname::{dated_root_name, fallback_dir_name, image_file_name, is_legal_segment};
pub use discover::{
    discover_pins, DiscoveryOutcome, DiscoverySettings, HttpSearchDiscovery, PinDiscovery,
    PIN_WRAPPER_LINKS,
};
pub use download::{Downloader, SaveWorker};
pub use extract::{extract_link, ExtractError, ImageLinkExtractor, LinkExtractor, PIN_CLOSEUP_CONTAINER};
pub use fetch::{DroppedUnitPolicy, FetchSettings, Fetcher, PermitScope, ReqwestFetcher};
pub use harvest::{HarvestOutcome, Harvester};
pub use parser::{LinkParser, PageLinkWorker};
pub use persist::{ensure_output_dir, ImageWriter, PersistError};
pub use pipeline::{
    run_pipeline, validate_input, Batch, GroupReport, PipelineOutput, PipelineSettings, Producer,
    RunReport, UnitFailurePolicy, UnitWorker,
};
pub use types::{
    DiscoveryError, DroppedUnit, FailureKind, FetchError, FetchMetadata, FetchOutput,
    HarvestError, PipelineError, StageError, UnitFailure,
};
pub use worker::FetchWorker;
