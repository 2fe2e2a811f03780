//! Pinharvest core: pure, IO-free domain types shared by the engine and the app.
mod group;
mod links;
mod prompts;
mod summary;

pub use group::{GroupKey, InvalidGroupKey, WorkGroups};
pub use links::{merge_unique_links, resolve_link};
pub use prompts::parse_prompts;
pub use summary::{RunSummary, StageCounts};
