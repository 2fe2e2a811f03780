use std::fs;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use engine_logging::MemoryLogSink;
use pinharvest_engine::{EngineConfig, Harvester};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer, output: &TempDir) -> EngineConfig {
    let mut config = EngineConfig::default_with_output(output.path().to_path_buf());
    config.discovery.search_url = format!("{}/search/pins/", server.uri());
    config.discovery.retry_delay = Duration::ZERO;
    config.page_fetch.retry_delay = Duration::ZERO;
    config.image_fetch.retry_delay = Duration::ZERO;
    config.pipeline.drain_timeout = Duration::from_millis(50);
    config.clock = Arc::new(|| {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    });
    config
}

async fn html(server: &MockServer, at: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8"))
        .mount(server)
        .await;
}

async fn pin(server: &MockServer, id: u32) {
    html(
        server,
        &format!("/pin/{id}/"),
        format!(
            r#"<div data-test-id="pin-closeup-image"><img src="/img/{id}.jpg"></div>"#
        ),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(format!("/img/{id}.jpg")))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![id as u8; 4], "image/jpeg"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn prompts_end_up_as_numbered_images() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/pins/"))
        .and(query_param("q", "cats"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<div data-test-id="pinWrapper"><a href="/pin/1/"></a></div>
               <div data-test-id="pinWrapper"><a href="/pin/2/"></a></div>
               <div data-test-id="pinWrapper"><a href="/pin/3/"></a></div>"#,
            "text/html",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/pins/"))
        .and(query_param("q", "a/b"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<div data-test-id="pinWrapper"><a href="/pin/4/"></a></div>"#,
            "text/html",
        ))
        .mount(&server)
        .await;
    for id in [1, 3, 4] {
        pin(&server, id).await;
    }
    // Pin 2 has lost its image container.
    html(&server, "/pin/2/", "<p>removed</p>".to_string()).await;

    let output = TempDir::new().unwrap();
    let sink = MemoryLogSink::new();
    let harvester = Harvester::new(config(&server, &output), Arc::new(sink)).unwrap();
    let prompts = vec!["cats".to_string(), "a/b".to_string()];

    let outcome = harvester.run(&prompts, 5).await.unwrap();

    let run_root = output.path().join("pinharvest-2024-05-01");
    assert_eq!(outcome.run_root.as_deref(), Some(run_root.as_path()));
    assert_eq!(outcome.summary.prompts, 2);
    assert_eq!(outcome.summary.pins_found, 4);
    assert_eq!(outcome.summary.parsing.delivered, 3);
    assert_eq!(outcome.summary.parsing.failed, 1);
    assert_eq!(outcome.summary.images_saved(), 3);

    assert_eq!(fs::read(run_root.join("cats").join("img1.jpg")).unwrap(), vec![1u8; 4]);
    assert_eq!(fs::read(run_root.join("cats").join("img2.jpg")).unwrap(), vec![3u8; 4]);
    assert!(!run_root.join("cats").join("img3.jpg").exists());
    let fallback = run_root.join("capture-09-30-00").join("img1.jpg");
    assert_eq!(fs::read(fallback).unwrap(), vec![4u8; 4]);
}

#[tokio::test]
async fn no_pins_means_no_output_tree() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/pins/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<h2>We couldn't find any Pins for this search</h2>",
            "text/html",
        ))
        .mount(&server)
        .await;

    let output = TempDir::new().unwrap();
    let harvester =
        Harvester::new(config(&server, &output), Arc::new(MemoryLogSink::new())).unwrap();

    let outcome = harvester.run(&["zzzz".to_string()], 5).await.unwrap();

    assert_eq!(outcome.summary.pins_found, 0);
    assert_eq!(outcome.run_root, None);
    assert!(!output.path().join("pinharvest-2024-05-01").exists());
}
