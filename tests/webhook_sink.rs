#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use teams_sink::{HttpTransport, Level, LogRecord, SinkOptions, TeamsSink};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOOK_PATH: &str = "/webhookb2/abc";

fn options(server: &MockServer) -> SinkOptions {
    SinkOptions::new(format!("{}{HOOK_PATH}", server.uri()))
        .with_period(Duration::from_secs(60))
        .with_shutdown_timeout(Duration::from_secs(5))
}

async fn bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .expect("request recording enabled")
        .iter()
        .map(|request| serde_json::from_slice(&request.body).expect("json body"))
        .collect()
}

#[tokio::test]
async fn posts_one_card_per_record_with_json_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(HOOK_PATH))
        .and(header("content-type", "application/json; charset=utf-8"))
        .respond_with(ResponseTemplate::new(200).set_body_string("1"))
        .expect(2)
        .mount(&server)
        .await;

    let sink = TeamsSink::start(options(&server).with_title("prod").with_batch_size_limit(2))
        .expect("sink");
    sink.emit(
        LogRecord::new(Level::Warning, "Disk {Mount} at {Pct}%")
            .with_property("Mount", "/var")
            .with_property("Pct", 93),
    );
    sink.emit(LogRecord::new(Level::Information, "Recovered"));
    sink.close().await;

    let bodies = bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["@type"], "MessageCard");
    assert_eq!(bodies[0]["title"], "prod");
    assert_eq!(bodies[0]["text"], "Disk /var at 93%");
    assert_eq!(bodies[0]["themeColor"], "f0ad4e");
    assert_eq!(bodies[1]["text"], "Recovered");
    assert_eq!(bodies[1]["themeColor"], "5bc0de");
}

#[tokio::test]
async fn failed_post_does_not_stop_the_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("\"text\":\"second\""))
        .respond_with(ResponseTemplate::new(400).set_body_string("Summary or Text is required."))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let failures = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&failures);
    let sink = TeamsSink::start(
        options(&server)
            .with_batch_size_limit(3)
            .on_batch_failure(move |failure| {
                seen.lock()
                    .unwrap()
                    .push((failure.positions(), failure.to_string()));
            }),
    )
    .expect("sink");

    for text in ["first", "second", "third"] {
        sink.emit(LogRecord::new(Level::Error, text));
    }
    sink.close().await;

    assert_eq!(bodies(&server).await.len(), 3);
    let failures = failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, vec![1]);
    assert!(failures[0].1.contains("400"), "{}", failures[0].1);
    assert!(failures[0].1.contains("Summary or Text is required."));
}

#[tokio::test]
async fn timer_flushes_partial_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let sink = TeamsSink::start(
        options(&server)
            .with_batch_size_limit(50)
            .with_period(Duration::from_millis(100)),
    )
    .expect("sink");
    sink.emit(LogRecord::new(Level::Information, "lonely"));

    tokio::time::timeout(Duration::from_secs(5), async {
        while bodies(&server).await.is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("timer flush");
    assert_eq!(sink.pending(), 0);
    sink.close().await;
}

#[tokio::test]
async fn close_drains_everything_queued() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(7)
        .mount(&server)
        .await;

    let sink = TeamsSink::start(options(&server).with_batch_size_limit(3)).expect("sink");
    for i in 0..7 {
        sink.emit(LogRecord::new(Level::Information, format!("queued {i}")));
    }
    sink.close().await;
    sink.close().await;

    let texts: Vec<String> = bodies(&server)
        .await
        .iter()
        .map(|body| body["text"].as_str().unwrap().to_string())
        .collect();
    let expected: Vec<String> = (0..7).map(|i| format!("queued {i}")).collect();
    assert_eq!(texts, expected);
}

#[tokio::test]
async fn supplied_client_stays_usable_after_close() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let transport = Arc::new(HttpTransport::from_client(reqwest::Client::new()));
    let sink = TeamsSink::start(
        options(&server)
            .with_batch_size_limit(1)
            .with_transport(transport.clone()),
    )
    .expect("sink");
    sink.emit(LogRecord::new(Level::Information, "shared"));
    sink.close().await;

    assert!(!transport.is_closed());
    let again = TeamsSink::start(
        options(&server)
            .with_batch_size_limit(1)
            .with_transport(transport.clone()),
    )
    .expect("second sink");
    again.emit(LogRecord::new(Level::Information, "reused"));
    again.close().await;

    assert_eq!(bodies(&server).await.len(), 2);
}

#[tokio::test]
async fn properties_section_can_be_disabled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let sink = TeamsSink::start(
        options(&server)
            .with_batch_size_limit(1)
            .with_render_properties(false),
    )
    .expect("sink");
    sink.emit(LogRecord::new(Level::Fatal, "no facts").with_property("k", "v"));
    sink.close().await;

    let bodies = bodies(&server).await;
    assert_eq!(bodies[0]["sections"], serde_json::json!([]));
    assert!(bodies[0].get("title").is_none());
    assert_eq!(bodies[0]["themeColor"], "d9534f");
}
