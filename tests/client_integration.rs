//! Integration tests for the client relay consumer
//!
//! A wiremock server plays the part of the relay endpoint; RelayClient is
//! exercised end to end and the callback contract is asserted: fragments
//! in order, completion exactly once, and errors funneled through
//! `on_error`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use prdgen::client::{RelayClient, StreamCallbacks};

fn client_for(server: &MockServer) -> RelayClient {
    let endpoint = Url::parse(&format!("{}/api/generate", server.uri())).unwrap();
    RelayClient::new(endpoint, HashMap::new()).unwrap()
}

/// Shared recording state for one call's callbacks.
#[derive(Default)]
struct Recorded {
    chunks: Mutex<Vec<String>>,
    completions: Mutex<Vec<(String, String)>>,
    errors: Mutex<Vec<String>>,
}

fn recording_callbacks(recorded: &Arc<Recorded>) -> StreamCallbacks {
    StreamCallbacks::new()
        .on_chunk({
            let recorded = Arc::clone(recorded);
            move |fragment| recorded.chunks.lock().unwrap().push(fragment.to_string())
        })
        .on_complete({
            let recorded = Arc::clone(recorded);
            move |message_id, conversation_id| {
                recorded
                    .completions
                    .lock()
                    .unwrap()
                    .push((message_id.to_string(), conversation_id.to_string()));
            }
        })
        .on_error({
            let recorded = Arc::clone(recorded);
            move |error| recorded.errors.lock().unwrap().push(error.to_string())
        })
}

/// A full generation turn: one fragment, then message_end, then the sentinel.
#[tokio::test]
async fn test_end_to_end_generation_scenario() {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"event\":\"message\",\"answer\":\"## PRD\\n\",\"message_id\":\"m1\",\"conversation_id\":\"c1\"}\n\n",
        "data: {\"event\":\"message_end\",\"message_id\":\"m1\",\"conversation_id\":\"c1\"}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let recorded = Arc::new(Recorded::default());
    client_for(&server)
        .send_message("设计一个登录系统", None, recording_callbacks(&recorded))
        .await
        .unwrap();

    assert_eq!(recorded.chunks.lock().unwrap().as_slice(), ["## PRD\n"]);
    assert_eq!(
        recorded.completions.lock().unwrap().as_slice(),
        [("m1".to_string(), "c1".to_string())]
    );
    assert!(recorded.errors.lock().unwrap().is_empty());
}

/// A second call made with the conversation id from the first
/// must include it in the outgoing request body.
#[tokio::test]
async fn test_conversation_id_propagation() {
    let server = MockServer::start().await;

    let second_body = concat!(
        "data: {\"event\":\"message\",\"answer\":\"more\",\"message_id\":\"m2\",\"conversation_id\":\"abc\"}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_string_contains(r#""conversationId":"abc""#))
        .respond_with(ResponseTemplate::new(200).set_body_raw(second_body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    // Disjoint matcher: only the first call carries the query "start".
    let first_body = concat!(
        "data: {\"event\":\"message\",\"answer\":\"hi\",\"message_id\":\"m1\",\"conversation_id\":\"abc\"}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_string_contains(r#""query":"start""#))
        .respond_with(ResponseTemplate::new(200).set_body_raw(first_body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);

    let first = Arc::new(Recorded::default());
    client
        .send_message("start", None, recording_callbacks(&first))
        .await
        .unwrap();
    let conversation_id = first.completions.lock().unwrap()[0].1.clone();
    assert_eq!(conversation_id, "abc");

    let second = Arc::new(Recorded::default());
    client
        .send_message("continue", Some(&conversation_id), recording_callbacks(&second))
        .await
        .unwrap();
    assert_eq!(
        second.completions.lock().unwrap().as_slice(),
        [("m2".to_string(), "abc".to_string())]
    );
}

/// Completion fires exactly once when the stream ends without
/// a sentinel, using the last-observed identifiers.
#[tokio::test]
async fn test_natural_end_completes_once() {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"event\":\"message\",\"answer\":\"a\",\"message_id\":\"m1\",\"conversation_id\":\"c1\"}\n\n",
        "data: {\"event\":\"message\",\"answer\":\"b\",\"message_id\":\"m2\"}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let recorded = Arc::new(Recorded::default());
    client_for(&server)
        .send_message("q", None, recording_callbacks(&recorded))
        .await
        .unwrap();

    assert_eq!(recorded.chunks.lock().unwrap().as_slice(), ["a", "b"]);
    assert_eq!(
        recorded.completions.lock().unwrap().as_slice(),
        [("m2".to_string(), "c1".to_string())]
    );
    assert!(recorded.errors.lock().unwrap().is_empty());
}

/// Empty-body edge: completion still fires exactly once, with
/// the caller's conversation id echoed back.
#[tokio::test]
async fn test_empty_body_completes_with_seed_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("", "text/event-stream"))
        .mount(&server)
        .await;

    let recorded = Arc::new(Recorded::default());
    client_for(&server)
        .send_message("q", Some("seed-id"), recording_callbacks(&recorded))
        .await
        .unwrap();

    assert!(recorded.chunks.lock().unwrap().is_empty());
    assert_eq!(
        recorded.completions.lock().unwrap().as_slice(),
        [(String::new(), "seed-id".to_string())]
    );
    assert!(recorded.errors.lock().unwrap().is_empty());
}

/// A malformed line is skipped without aborting the stream and
/// without touching `on_error`.
#[tokio::test]
async fn test_malformed_line_skipped_without_error() {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"event\":\"message\",\"answer\":\"a\"}\n\n",
        "data: {oops\n\n",
        "data: {\"event\":\"message\",\"answer\":\"b\"}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let recorded = Arc::new(Recorded::default());
    client_for(&server)
        .send_message("q", None, recording_callbacks(&recorded))
        .await
        .unwrap();

    assert_eq!(recorded.chunks.lock().unwrap().as_slice(), ["a", "b"]);
    assert_eq!(recorded.completions.lock().unwrap().len(), 1);
    assert!(recorded.errors.lock().unwrap().is_empty());
}

/// Agent-mode and workflow text events also deliver fragments.
#[tokio::test]
async fn test_agent_message_and_text_chunk_events() {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"event\":\"agent_message\",\"answer\":\"a\"}\n\n",
        "data: {\"event\":\"text_chunk\",\"answer\":\"b\"}\n\n",
        "data: {\"event\":\"workflow_finished\"}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let recorded = Arc::new(Recorded::default());
    client_for(&server)
        .send_message("q", None, recording_callbacks(&recorded))
        .await
        .unwrap();

    assert_eq!(recorded.chunks.lock().unwrap().as_slice(), ["a", "b"]);
    assert_eq!(recorded.completions.lock().unwrap().len(), 1);
}

/// A non-success relay response parses the envelope and reports error plus
/// solution through `on_error`; completion never fires.
#[tokio::test]
async fn test_error_envelope_delivered_via_on_error() {
    let server = MockServer::start().await;

    let envelope = r#"{"error":"Upstream workflow not published","solution":"Publish the workflow","timestamp":"2025-01-01T00:00:00Z"}"#;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(400).set_body_raw(envelope, "application/json"),
        )
        .mount(&server)
        .await;

    let recorded = Arc::new(Recorded::default());
    client_for(&server)
        .send_message("q", None, recording_callbacks(&recorded))
        .await
        .unwrap();

    let errors = recorded.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Upstream workflow not published"));
    assert!(errors[0].contains("Solution:"));
    assert!(errors[0].contains("Publish the workflow"));
    assert!(recorded.completions.lock().unwrap().is_empty());
}

/// Without an `on_error` callback, the failure comes back as an Err.
#[tokio::test]
async fn test_http_failure_without_on_error_returns_err() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let result = client_for(&server)
        .send_message("q", None, StreamCallbacks::new())
        .await;
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("HTTP 500"));
}

/// An upstream `error` event terminates the call through `on_error` with
/// no completion.
#[tokio::test]
async fn test_upstream_error_event_terminates_call() {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"event\":\"message\",\"answer\":\"partial\"}\n\n",
        "data: {\"event\":\"error\",\"message\":\"quota exceeded\"}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let recorded = Arc::new(Recorded::default());
    client_for(&server)
        .send_message("q", None, recording_callbacks(&recorded))
        .await
        .unwrap();

    assert_eq!(recorded.chunks.lock().unwrap().as_slice(), ["partial"]);
    let errors = recorded.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("quota exceeded"));
    assert!(recorded.completions.lock().unwrap().is_empty());
}

/// A pre-cancelled token stops the call before any callback fires.
#[tokio::test]
async fn test_cancelled_token_suppresses_callbacks() {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"event\":\"message\",\"answer\":\"a\"}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let recorded = Arc::new(Recorded::default());
    client_for(&server)
        .send_message_with_cancel("q", None, recording_callbacks(&recorded), cancel)
        .await
        .unwrap();

    assert!(recorded.chunks.lock().unwrap().is_empty());
    assert!(recorded.completions.lock().unwrap().is_empty());
    assert!(recorded.errors.lock().unwrap().is_empty());
}

/// Replaying the identical stream yields identical callback
/// sequences.
#[tokio::test]
async fn test_replay_produces_identical_callbacks() {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"event\":\"message\",\"answer\":\"one\",\"message_id\":\"m1\",\"conversation_id\":\"c1\"}\n\n",
        "data: {\"event\":\"message\",\"answer\":\"two\"}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut runs = Vec::new();
    for _ in 0..2 {
        let recorded = Arc::new(Recorded::default());
        client
            .send_message("q", None, recording_callbacks(&recorded))
            .await
            .unwrap();
        runs.push((
            recorded.chunks.lock().unwrap().clone(),
            recorded.completions.lock().unwrap().clone(),
        ));
    }

    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[0].0, vec!["one".to_string(), "two".to_string()]);
}

/// Concurrent calls do not share state: each gets its own buffer and
/// callbacks.
#[tokio::test]
async fn test_concurrent_calls_are_independent() {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"event\":\"message\",\"answer\":\"x\",\"conversation_id\":\"c\"}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let completions = Arc::new(AtomicUsize::new(0));

    let make_call = |client: RelayClient, completions: Arc<AtomicUsize>| async move {
        let callbacks = StreamCallbacks::new().on_complete(move |_, _| {
            completions.fetch_add(1, Ordering::SeqCst);
        });
        client.send_message("q", None, callbacks).await.unwrap();
    };

    tokio::join!(
        make_call(client.clone(), Arc::clone(&completions)),
        make_call(client, Arc::clone(&completions)),
    );

    assert_eq!(completions.load(Ordering::SeqCst), 2);
}
