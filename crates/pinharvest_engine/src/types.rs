use std::fmt;

use bytes::Bytes;
use pinharvest_core::GroupKey;

use crate::decode::DecodeError;
use crate::extract::ExtractError;
use crate::persist::PersistError;

/// Body and metadata of one successful retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub bytes: Bytes,
    pub metadata: FetchMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchMetadata {
    pub original_url: String,
    pub final_url: String,
    pub redirect_count: usize,
    pub content_type: Option<String>,
    pub byte_len: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether another attempt at the same URL could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            FailureKind::HttpStatus(_) | FailureKind::Timeout | FailureKind::Network
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    UnsupportedContentType { content_type: String },
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            FailureKind::Network => write!(f, "network error"),
        }
    }
}

/// A unit the fetch stage gave up on after exhausting its attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedUnit {
    /// Index of the unit in the group's input list.
    pub position: usize,
    pub url: String,
    pub attempts: u32,
    pub error: FetchError,
}

/// A unit whose per-unit work failed inside a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    /// Index of the unit in the batch the consumer received.
    pub position: usize,
    pub message: String,
}

/// Failure of the per-unit work a consumer performs.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("persist failed: {0}")]
    Persist(#[from] PersistError),
    #[error("background task failed: {0}")]
    Task(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("pipeline input must contain at least one group")]
    EmptyInput,
    #[error("invalid pipeline settings: {0}")]
    InvalidSettings(String),
    #[error("group '{group}' failed at unit {position}: {source}")]
    Stage {
        group: GroupKey,
        position: usize,
        #[source]
        source: StageError,
    },
    #[error("pipeline task did not finish cleanly: {0}")]
    Join(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("prompt '{0}' is blank")]
    InvalidPrompt(String),
    #[error("search url is invalid: {0}")]
    InvalidSearchUrl(String),
    #[error("pin selector is invalid: {0}")]
    InvalidSelector(String),
    #[error("could not reach the search page for '{prompt}' after {attempts} attempt(s): {source}")]
    ConnectionFailure {
        prompt: String,
        attempts: u32,
        #[source]
        source: FetchError,
    },
    #[error("search page for '{prompt}' no longer matches the expected layout")]
    StructuralMismatch { prompt: String },
    #[error("search page for '{prompt}' could not be decoded: {source}")]
    Decode {
        prompt: String,
        #[source]
        source: DecodeError,
    },
}

/// Fatal failure of a whole harvest run.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}
