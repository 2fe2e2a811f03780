use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use engine_logging::MemoryLogSink;
use pinharvest_core::{GroupKey, WorkGroups};
use pinharvest_engine::{
    EngineConfig, FailureKind, FetchError, FetchMetadata, FetchOutput, Fetcher, LinkParser,
    PipelineError, UnitFailurePolicy,
};
use pretty_assertions::assert_eq;

/// Serves canned pages from memory and counts every request.
struct StubFetcher {
    calls: AtomicUsize,
}

impl StubFetcher {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if url.contains("gone") {
            return Err(FetchError {
                kind: FailureKind::HttpStatus(404),
                message: "404 Not Found".into(),
            });
        }
        let html = if url.contains("broken") {
            "<html><body><p>layout changed</p></body></html>".to_string()
        } else {
            let id = url.trim_end_matches('/').rsplit('/').next().unwrap_or("0");
            format!(
                r#"<div data-test-id="pin-closeup-image"><img src="https://i.pinimg.com/originals/{id}.jpg"></div>"#
            )
        };
        Ok(FetchOutput {
            metadata: FetchMetadata {
                original_url: url.to_string(),
                final_url: url.to_string(),
                redirect_count: 0,
                content_type: Some("text/html; charset=utf-8".into()),
                byte_len: html.len() as u64,
            },
            bytes: Bytes::from(html),
        })
    }
}

fn config() -> EngineConfig {
    let mut config = EngineConfig::default_with_output(PathBuf::from("unused"));
    config.page_fetch.retry_delay = Duration::ZERO;
    config.pipeline.drain_timeout = Duration::from_millis(50);
    config
}

fn pins(layout: &[(&str, &[&str])]) -> WorkGroups<String> {
    layout.iter()
        .map(|(key, urls)| {
            (
                GroupKey::new(*key).unwrap(),
                urls.iter().map(|url| url.to_string()).collect(),
            )
        })
        .collect()
}

#[tokio::test]
async fn second_parse_reuses_the_first_result() {
    let fetcher = Arc::new(StubFetcher::new());
    let parser = LinkParser::new(
        pins(&[
            ("cats", &["https://pin.test/pin/1/", "https://pin.test/pin/2/"]),
            ("dogs", &["https://pin.test/pin/3/"]),
        ]),
        fetcher.clone(),
        &config(),
        Arc::new(MemoryLogSink::new()),
    )
    .unwrap();
    assert!(parser.cached().is_none());

    let first = parser.parse().await.unwrap().clone();
    let calls_after_first = fetcher.calls();
    let second = parser.parse().await.unwrap();

    assert_eq!(calls_after_first, 3);
    assert_eq!(fetcher.calls(), calls_after_first);
    assert_eq!(&first, second);
    assert_eq!(
        second.groups.get("cats").unwrap(),
        &[
            "https://i.pinimg.com/originals/1.jpg".to_string(),
            "https://i.pinimg.com/originals/2.jpg".to_string(),
        ]
    );
    assert!(parser.cached().is_some());
}

#[tokio::test]
async fn unreachable_and_unparseable_pins_are_reported() {
    let fetcher = Arc::new(StubFetcher::new());
    let parser = LinkParser::new(
        pins(&[(
            "cats",
            &[
                "https://pin.test/pin/1/",
                "https://pin.test/gone/",
                "https://pin.test/broken/",
                "https://pin.test/pin/4/",
            ],
        )]),
        fetcher.clone(),
        &config(),
        Arc::new(MemoryLogSink::new()),
    )
    .unwrap();

    let output = parser.parse().await.unwrap();

    assert_eq!(
        output.groups.get("cats").unwrap(),
        &[
            "https://i.pinimg.com/originals/1.jpg".to_string(),
            "https://i.pinimg.com/originals/4.jpg".to_string(),
        ]
    );
    let report = output.report.group("cats").unwrap();
    assert_eq!(report.dropped.len(), 1);
    assert_eq!(report.dropped[0].url, "https://pin.test/gone/");
    assert_eq!(report.failures.len(), 1);
    // 1 + 3 attempts for the missing pin + 1 + 1
    assert_eq!(fetcher.calls(), 6);
}

#[tokio::test]
async fn abort_policy_fails_the_parse() {
    let mut config = config();
    config.pipeline.unit_failures = UnitFailurePolicy::Abort;
    let parser = LinkParser::new(
        pins(&[("cats", &["https://pin.test/broken/"])]),
        Arc::new(StubFetcher::new()),
        &config,
        Arc::new(MemoryLogSink::new()),
    )
    .unwrap();

    let err = parser.parse().await.unwrap_err();
    assert!(matches!(err, PipelineError::Stage { .. }));
    assert!(parser.cached().is_none());
}

#[test]
fn empty_pin_map_is_rejected_synchronously() {
    let fetcher = Arc::new(StubFetcher::new());
    let result = LinkParser::new(
        WorkGroups::new(),
        fetcher.clone(),
        &config(),
        Arc::new(MemoryLogSink::new()),
    );
    assert!(matches!(result, Err(PipelineError::EmptyInput)));
    assert_eq!(fetcher.calls(), 0);
}
