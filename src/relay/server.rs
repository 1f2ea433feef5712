//! HTTP surface of the relay endpoint
//!
//! One route: `POST /api/generate` with JSON `{query, conversationId?}`.
//! CORS preflight is answered on the same route; any other method gets a
//! 405. A response-mapping layer stamps the permissive CORS headers onto
//! every response, including error envelopes and the 405, so no handler
//! can miss them.
//!
//! A successful upstream call streams back as `text/event-stream`: every
//! upstream `data:` line whose payload is valid JSON is re-emitted
//! verbatim, malformed payloads are logged and dropped, and the body
//! always ends with one synthetic `data: [DONE]` event. If the upstream
//! connection dies mid-stream the outgoing body is aborted with an error
//! so the caller sees a transport failure rather than a fake completion.

use std::io;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use chrono::Utc;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::config::{ServerConfig, UpstreamConfig};
use crate::error::{PrdgenError, Result};
use crate::relay::upstream::{self, UpstreamErrorKind};
use crate::sse::{SseLineParser, DONE_SENTINEL};

/// Shared, immutable state of the relay endpoint.
///
/// The relay is stateless across requests; this only carries the upstream
/// configuration and the shared HTTP client.
#[derive(Debug)]
pub struct RelayState {
    /// Upstream workflow API settings
    pub upstream: UpstreamConfig,
    /// Shared outbound HTTP client
    pub http: reqwest::Client,
}

impl RelayState {
    /// Build relay state from upstream configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the outbound HTTP client cannot be constructed.
    pub fn new(upstream: UpstreamConfig) -> Result<Self> {
        // No client-side timeout: generations stream for as long as the
        // upstream keeps talking.
        let http = reqwest::Client::builder()
            .user_agent("prdgen-relay/0.2.0")
            .build()
            .map_err(|e| PrdgenError::Relay(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { upstream, http })
    }
}

/// Incoming relay request body.
#[derive(Debug, Deserialize)]
struct GenerateRequest {
    query: String,
    #[serde(rename = "conversationId", default)]
    conversation_id: Option<String>,
}

/// Build the relay router.
pub fn router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/api/generate", post(generate).options(preflight))
        .layer(middleware::from_fn(set_cors_headers))
        .with_state(state)
}

/// Bind and run the relay endpoint until the process exits.
///
/// # Errors
///
/// Returns error if the bind address is invalid or the listener cannot be
/// created.
pub async fn serve(server: &ServerConfig, upstream: UpstreamConfig) -> Result<()> {
    let addr: std::net::SocketAddr = server
        .bind
        .parse()
        .map_err(|e| PrdgenError::Config(format!("Invalid bind address {}: {}", server.bind, e)))?;

    let state = Arc::new(RelayState::new(upstream)?);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Relay endpoint listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Stamp permissive CORS headers onto every outgoing response.
async fn set_cors_headers(request: axum::extract::Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("authorization, x-client-info, apikey, content-type"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    response
}

/// Answer a CORS preflight request.
async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// Handle one generation request.
async fn generate(State(state): State<Arc<RelayState>>, body: Bytes) -> Response {
    let request: GenerateRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid request body: {}", e),
                "Send JSON of the form {\"query\": \"...\", \"conversationId\": \"...\"}",
            )
        }
    };

    if request.query.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "query must not be empty",
            "Provide the text to generate a PRD from in the query field",
        );
    }

    tracing::info!(
        "Generation request: query_len={} conversation_id={:?}",
        request.query.chars().count(),
        request.conversation_id
    );

    match upstream::send_to_upstream(
        &state.http,
        &state.upstream,
        &request.query,
        request.conversation_id.as_deref(),
    )
    .await
    {
        Ok(response) => stream_response(response),
        Err(failures) => {
            let kind = UpstreamErrorKind::classify_failures(&failures);
            let combined = upstream::combine_failures(&failures);
            tracing::error!("{}", combined);
            let error = match kind {
                UpstreamErrorKind::WorkflowUnpublished => {
                    "Upstream workflow not published".to_string()
                }
                UpstreamErrorKind::Unauthorized => "Upstream API key rejected".to_string(),
                UpstreamErrorKind::Other => combined,
            };
            let status = StatusCode::from_u16(kind.status_code().as_u16())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            error_response(status, error, kind.solution())
        }
    }
}

/// Wrap the winning upstream response into an outgoing SSE response.
fn stream_response(upstream_response: reqwest::Response) -> Response {
    let (tx, rx) = mpsc::unbounded_channel::<std::result::Result<Bytes, io::Error>>();
    tokio::spawn(forward_upstream(upstream_response, tx));

    let body = Body::from_stream(UnboundedReceiverStream::new(rx));
    match Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
    {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Failed to build streaming response: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to build streaming response",
                UpstreamErrorKind::Other.solution(),
            )
        }
    }
}

/// What happened after forwarding one payload.
#[derive(Debug, PartialEq, Eq)]
enum Forwarded {
    /// Keep reading the upstream body.
    Continue,
    /// Terminal event sent or receiver gone; stop reading.
    Stop,
}

/// Pump the upstream body through the line parser into the response
/// channel, terminating with a single synthetic `[DONE]` event.
async fn forward_upstream(
    upstream_response: reqwest::Response,
    tx: UnboundedSender<std::result::Result<Bytes, io::Error>>,
) {
    let mut parser = SseLineParser::new();
    let stream = upstream_response.bytes_stream();
    tokio::pin!(stream);

    while let Some(next) = stream.next().await {
        let chunk = match next {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!("Upstream stream read failed: {}", e);
                let _ = tx.send(Err(io::Error::new(io::ErrorKind::Other, e.to_string())));
                return;
            }
        };

        for payload in parser.push(&chunk) {
            if forward_payload(&payload, &tx) == Forwarded::Stop {
                return;
            }
        }
    }

    if let Some(payload) = parser.finish() {
        if forward_payload(&payload, &tx) == Forwarded::Stop {
            return;
        }
    }

    // Upstream closed without its own sentinel.
    send_done(&tx);
}

/// Re-emit one upstream payload, validating that it is JSON.
///
/// The payload is forwarded verbatim, never reinterpreted; validation only
/// decides forward-or-drop.
fn forward_payload(
    payload: &str,
    tx: &UnboundedSender<std::result::Result<Bytes, io::Error>>,
) -> Forwarded {
    if payload == DONE_SENTINEL {
        send_done(tx);
        return Forwarded::Stop;
    }

    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(_) => {
            let frame = Bytes::from(format!("data: {}\n\n", payload));
            if tx.send(Ok(frame)).is_err() {
                // Caller went away; no point reading further upstream.
                return Forwarded::Stop;
            }
            Forwarded::Continue
        }
        Err(e) => {
            tracing::warn!("Dropping malformed upstream payload ({}): {:.100}", e, payload);
            Forwarded::Continue
        }
    }
}

/// Emit the terminal sentinel event.
fn send_done(tx: &UnboundedSender<std::result::Result<Bytes, io::Error>>) {
    let _ = tx.send(Ok(Bytes::from(format!("data: {}\n\n", DONE_SENTINEL))));
}

/// Build a JSON error envelope response.
///
/// Shape: `{error, solution, timestamp}` with an ISO-8601 timestamp. CORS
/// headers are added by the router layer.
fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    solution: impl Into<String>,
) -> Response {
    let body = serde_json::json!({
        "error": error.into(),
        "solution": solution.into(),
        "timestamp": Utc::now().to_rfc3339(),
    });

    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_router() -> Router {
        // Points at an unroutable upstream; only used for paths that never
        // reach the upstream call.
        let state = Arc::new(
            RelayState::new(UpstreamConfig {
                base_url: "http://127.0.0.1:1/v1".to_string(),
                api_key: "k".to_string(),
                workflow_id: "wf".to_string(),
                user_prefix: "user".to_string(),
            })
            .unwrap(),
        );
        router(state)
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_preflight_has_cors_headers() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/generate")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
            "POST, OPTIONS"
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "authorization, x-client-info, apikey, content-type"
        );
    }

    #[tokio::test]
    async fn test_get_method_not_allowed() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/generate")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        // The CORS layer covers error responses too.
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_400_envelope() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/generate")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_string(response).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("Invalid request body"));
        assert!(!json["solution"].as_str().unwrap().is_empty());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_empty_query_is_400_envelope() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/generate")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"query":"  "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_string(response).await;
        assert!(body.contains("query must not be empty"));
    }

    #[test]
    fn test_error_response_shape() {
        let response = error_response(StatusCode::UNAUTHORIZED, "bad key", "fix it");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
    }

    #[tokio::test]
    async fn test_forward_payload_validates_json() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert_eq!(
            forward_payload(r#"{"event":"message"}"#, &tx),
            Forwarded::Continue
        );
        assert_eq!(forward_payload("definitely not json", &tx), Forwarded::Continue);
        assert_eq!(forward_payload(DONE_SENTINEL, &tx), Forwarded::Stop);

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(&first[..], b"data: {\"event\":\"message\"}\n\n");
        let second = rx.recv().await.unwrap().unwrap();
        assert_eq!(&second[..], b"data: [DONE]\n\n");
        assert!(rx.try_recv().is_err(), "malformed payload must be dropped");
    }

    #[tokio::test]
    async fn test_forward_payload_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        assert_eq!(
            forward_payload(r#"{"event":"message"}"#, &tx),
            Forwarded::Stop
        );
    }
}
