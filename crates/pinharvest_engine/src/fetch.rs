use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use bytes::BytesMut;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};

use crate::{FailureKind, FetchError, FetchMetadata, FetchOutput};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) pinharvest/0.1";

/// Which slice of work holds a connection-limiter permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermitScope {
    /// A permit is held for each request, released between URLs.
    PerRequest,
    /// A permit is held for a worker's whole batch.
    PerBatch,
}

/// What happens to a URL whose attempts are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DroppedUnitPolicy {
    /// Drop it and list it in the group report.
    Report,
    /// Drop it and only log it.
    Absorb,
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    /// Accepted media types. An entry ending in `/` accepts the whole family.
    pub allowed_content_types: Vec<String>,
    pub user_agent: String,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub permit_scope: PermitScope,
    pub dropped_units: DroppedUnitPolicy,
}

impl FetchSettings {
    /// Settings for pin pages: HTML only, a few megabytes at most.
    pub fn for_pages() -> Self {
        Self::default()
    }

    /// Settings for image downloads.
    pub fn for_images() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            max_bytes: 40 * 1024 * 1024,
            allowed_content_types: vec!["image/".to_string()],
            ..Self::default()
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            allowed_content_types: vec![
                "text/html".to_string(),
                "application/xhtml+xml".to_string(),
            ],
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_attempts: 3,
            retry_delay: Duration::from_millis(500),
            permit_scope: PermitScope::PerRequest,
            dropped_units: DroppedUnitPolicy::Report,
        }
    }
}

/// Retrieves a single remote resource. One call is one attempt.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    settings: FetchSettings,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        Self { settings }
    }

    fn build_client(&self, redirect_counter: Arc<AtomicUsize>) -> Result<reqwest::Client, FetchError> {
        let redirect_limit = self.settings.redirect_limit;
        let policy = reqwest::redirect::Policy::custom(move |attempt| {
            let count = attempt.previous().len();
            redirect_counter.store(count, Ordering::Relaxed);
            if count >= redirect_limit {
                attempt.error("redirect limit exceeded")
            } else {
                attempt.follow()
            }
        });

        reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .redirect(policy)
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))
    }

    fn is_content_type_allowed(&self, content_type: &str) -> bool {
        let ct = content_type.split(';').next().unwrap_or(content_type).trim();
        self.settings.allowed_content_types.iter().any(|allowed| {
            if allowed.ends_with('/') {
                ct.get(..allowed.len())
                    .is_some_and(|family| family.eq_ignore_ascii_case(allowed))
            } else {
                allowed.eq_ignore_ascii_case(ct)
            }
        })
    }

    fn too_large(&self, actual: u64) -> FetchError {
        FetchError::new(
            FailureKind::TooLarge {
                max_bytes: self.settings.max_bytes,
                actual: Some(actual),
            },
            "response too large",
        )
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        let redirect_counter = Arc::new(AtomicUsize::new(0));
        let client = self.build_client(redirect_counter.clone())?;

        let response = client
            .get(parsed)
            .header(USER_AGENT, self.settings.user_agent.as_str())
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        if let Some(content_len) = response.content_length() {
            if content_len > self.settings.max_bytes {
                return Err(self.too_large(content_len));
            }
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        if let Some(ct) = content_type.as_deref() {
            if !self.is_content_type_allowed(ct) {
                return Err(FetchError::new(
                    FailureKind::UnsupportedContentType {
                        content_type: ct.to_string(),
                    },
                    "unsupported content type",
                ));
            }
        }

        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = body.len() as u64 + chunk.len() as u64;
            if next_len > self.settings.max_bytes {
                return Err(self.too_large(next_len));
            }
            body.extend_from_slice(&chunk);
        }

        let metadata = FetchMetadata {
            original_url: url.to_string(),
            final_url,
            redirect_count: redirect_counter.load(Ordering::Relaxed),
            content_type,
            byte_len: body.len() as u64,
        };

        Ok(FetchOutput {
            bytes: body.freeze(),
            metadata,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FailureKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_family_prefix_matches() {
        let fetcher = ReqwestFetcher::new(FetchSettings::for_images());
        assert!(fetcher.is_content_type_allowed("image/jpeg"));
        assert!(fetcher.is_content_type_allowed("IMAGE/webp; q=1"));
        assert!(!fetcher.is_content_type_allowed("text/html"));
        assert!(!fetcher.is_content_type_allowed("imag"));
    }

    #[test]
    fn page_settings_accept_html_only() {
        let fetcher = ReqwestFetcher::new(FetchSettings::for_pages());
        assert!(fetcher.is_content_type_allowed("text/html; charset=utf-8"));
        assert!(!fetcher.is_content_type_allowed("image/png"));
    }

    #[test]
    fn only_transient_failures_are_retried() {
        assert!(FetchError::new(FailureKind::HttpStatus(503), "").is_retryable());
        assert!(FetchError::new(FailureKind::Timeout, "").is_retryable());
        assert!(!FetchError::new(FailureKind::InvalidUrl, "").is_retryable());
        assert!(!FetchError::new(FailureKind::TooLarge { max_bytes: 1, actual: None }, "")
            .is_retryable());
    }
}
