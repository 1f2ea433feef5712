//! The relay consumer: one POST, one incrementally parsed SSE body
//!
//! [`RelayClient::send_message`] issues a single generation request and
//! drives the callbacks as the response streams in. Per call, exactly one
//! terminal outcome occurs: the completion callback, an error delivery
//! (callback or `Err` return), or a quiet stop on cancellation. Fragments
//! only ever arrive before that terminus.
//!
//! The client holds no internal locks; concurrent calls each own their
//! rolling buffer and callback set. No timeout is applied to the streaming
//! request, so a stalled upstream stalls the call until it is cancelled.

use std::collections::HashMap;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::client::callbacks::{ChunkCallback, ErrorCallback, StreamCallbacks};
use crate::config::RelayClientConfig;
use crate::error::{PrdgenError, Result};
use crate::sse::{EventKind, SseLineParser, StreamEvent, DONE_SENTINEL};

/// Outgoing relay request body.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    query: &'a str,
    #[serde(rename = "conversationId", skip_serializing_if = "Option::is_none")]
    conversation_id: Option<&'a str>,
}

/// Error envelope returned by the relay on failure.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    solution: Option<String>,
}

/// Terminal state of one stream consumption.
#[derive(Debug)]
enum StreamOutcome {
    /// Sentinel seen or stream ended naturally.
    Completed {
        message_id: String,
        conversation_id: String,
    },
    /// Upstream emitted an `error` event.
    UpstreamError(String),
    /// The caller's cancellation token fired.
    Cancelled,
}

/// What to do after applying one `data:` payload.
#[derive(Debug, PartialEq, Eq)]
enum PayloadAction {
    /// Keep reading.
    Continue,
    /// `[DONE]` sentinel: complete immediately.
    Done,
    /// Upstream error event with its message text.
    Fail(String),
}

/// Streaming relay consumer.
///
/// Constructed once from explicit endpoint and header configuration and
/// reused for every turn of every session.
///
/// # Examples
///
/// ```no_run
/// use prdgen::client::{RelayClient, StreamCallbacks};
/// use std::collections::HashMap;
/// use url::Url;
///
/// # async fn example() -> prdgen::error::Result<()> {
/// let client = RelayClient::new(
///     Url::parse("http://127.0.0.1:8787/api/generate").unwrap(),
///     HashMap::new(),
/// )?;
///
/// let callbacks = StreamCallbacks::new()
///     .on_chunk(|fragment| print!("{}", fragment))
///     .on_complete(|_, conversation_id| println!("\n[{}]", conversation_id));
///
/// client.send_message("Design a login system", None, callbacks).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    endpoint: Url,
    headers: HashMap<String, String>,
}

impl RelayClient {
    /// Create a client targeting `endpoint` with a fixed extra header set.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be constructed.
    pub fn new(endpoint: Url, headers: HashMap<String, String>) -> Result<Self> {
        // No request timeout: a generation may stream for minutes, and the
        // stall-forever contract is resolved by cancellation, not clocks.
        let http = reqwest::Client::builder()
            .user_agent("prdgen/0.2.0")
            .build()
            .map_err(|e| PrdgenError::Relay(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            headers,
        })
    }

    /// Create a client from the chat configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the configured endpoint is not a valid URL.
    pub fn from_config(config: &RelayClientConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            PrdgenError::Config(format!("Invalid relay endpoint {}: {}", config.endpoint, e))
        })?;
        Self::new(endpoint, config.headers.clone())
    }

    /// The endpoint this client targets.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Send one generation request and stream the response into callbacks.
    ///
    /// See [`RelayClient::send_message_with_cancel`]; this variant cannot
    /// be cancelled before natural completion.
    pub async fn send_message(
        &self,
        query: &str,
        conversation_id: Option<&str>,
        callbacks: StreamCallbacks,
    ) -> Result<()> {
        self.send_message_with_cancel(query, conversation_id, callbacks, CancellationToken::new())
            .await
    }

    /// Send one generation request with an explicit cancellation token.
    ///
    /// Behavior per call:
    ///
    /// - each received text fragment invokes `on_chunk` in order;
    /// - the `[DONE]` sentinel or natural end of stream invokes
    ///   `on_complete` exactly once with the last-observed message and
    ///   conversation identifiers (seeded from `conversation_id`, so an
    ///   answerless stream still echoes the caller's id back);
    /// - a non-success HTTP response, a transport failure mid-stream, or an
    ///   upstream `error` event is delivered through `on_error` when
    ///   installed;
    /// - cancellation between reads stops the call with no further
    ///   callback invocations.
    ///
    /// # Errors
    ///
    /// When no `on_error` callback is installed, failures are returned as
    /// `Err` instead of being delivered; with `on_error` installed this
    /// function only errs on programmer mistakes (none today).
    pub async fn send_message_with_cancel(
        &self,
        query: &str,
        conversation_id: Option<&str>,
        callbacks: StreamCallbacks,
        cancel: CancellationToken,
    ) -> Result<()> {
        let StreamCallbacks {
            mut on_chunk,
            on_error,
            on_complete,
        } = callbacks;

        let outcome = self
            .run(query, conversation_id, &mut on_chunk, &cancel)
            .await;

        match outcome {
            Ok(StreamOutcome::Completed {
                message_id,
                conversation_id,
            }) => {
                tracing::debug!(
                    "Generation complete: message_id={:?} conversation_id={:?}",
                    message_id,
                    conversation_id
                );
                if let Some(complete) = on_complete {
                    complete(&message_id, &conversation_id);
                }
                Ok(())
            }
            Ok(StreamOutcome::Cancelled) => {
                tracing::debug!("Generation cancelled by caller");
                Ok(())
            }
            Ok(StreamOutcome::UpstreamError(message)) => {
                deliver(on_error, PrdgenError::Upstream(message).into())
            }
            Err(error) => deliver(on_error, error),
        }
    }

    /// Issue the POST and consume the body. Never invokes `on_error` or
    /// `on_complete`; terminal handling belongs to the caller.
    async fn run(
        &self,
        query: &str,
        conversation_id: Option<&str>,
        on_chunk: &mut Option<ChunkCallback>,
        cancel: &CancellationToken,
    ) -> Result<StreamOutcome> {
        let body = GenerateRequest {
            query,
            conversation_id,
        };

        tracing::debug!(
            "Sending generation request to {}: conversation_id={:?}",
            self.endpoint,
            conversation_id
        );

        let mut request = self.http.post(self.endpoint.clone()).json(&body);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| PrdgenError::Stream(format!("relay request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PrdgenError::Relay(combine_error_message(status, &body)).into());
        }

        // Retained identifiers are last-write-wins; the conversation id is
        // seeded from the request so it survives an answerless stream.
        let mut message_id = String::new();
        let mut final_conversation_id = conversation_id.unwrap_or_default().to_string();
        let mut parser = SseLineParser::new();
        let stream = response.bytes_stream();
        tokio::pin!(stream);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(StreamOutcome::Cancelled),
                next = stream.next() => next,
            };

            let chunk = match next {
                None => break,
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    return Err(PrdgenError::Stream(format!(
                        "failed to read response body: {}",
                        e
                    ))
                    .into())
                }
            };

            for payload in parser.push(&chunk) {
                match apply_payload(&payload, &mut message_id, &mut final_conversation_id, on_chunk)
                {
                    PayloadAction::Continue => {}
                    PayloadAction::Done => {
                        return Ok(StreamOutcome::Completed {
                            message_id,
                            conversation_id: final_conversation_id,
                        })
                    }
                    PayloadAction::Fail(message) => {
                        return Ok(StreamOutcome::UpstreamError(message))
                    }
                }
            }
        }

        // Natural end of stream without a sentinel: flush the trailing
        // partial line, then complete with whatever was observed.
        if let Some(payload) = parser.finish() {
            match apply_payload(&payload, &mut message_id, &mut final_conversation_id, on_chunk) {
                PayloadAction::Fail(message) => return Ok(StreamOutcome::UpstreamError(message)),
                PayloadAction::Continue | PayloadAction::Done => {}
            }
        }

        Ok(StreamOutcome::Completed {
            message_id,
            conversation_id: final_conversation_id,
        })
    }
}

/// Apply one `data:` payload to the retained stream state.
///
/// Malformed JSON is logged and skipped. Content events deliver their
/// fragment and update the identifiers; a nonempty identifier in a later
/// event overwrites an earlier one.
fn apply_payload(
    payload: &str,
    message_id: &mut String,
    conversation_id: &mut String,
    on_chunk: &mut Option<ChunkCallback>,
) -> PayloadAction {
    if payload == DONE_SENTINEL {
        return PayloadAction::Done;
    }

    let event = match StreamEvent::parse(payload) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("Skipping malformed SSE payload ({}): {:.100}", e, payload);
            return PayloadAction::Continue;
        }
    };

    let kind = event.kind();
    if kind.is_content() {
        if let Some(answer) = event.answer.as_deref() {
            if let Some(chunk) = on_chunk.as_mut() {
                chunk(answer);
            }
        }
        if let Some(id) = event.message_id.as_deref() {
            if !id.is_empty() {
                *message_id = id.to_string();
            }
        }
        if let Some(id) = event.conversation_id.as_deref() {
            if !id.is_empty() {
                *conversation_id = id.to_string();
            }
        }
    } else if kind == EventKind::Error {
        let message = event
            .message
            .unwrap_or_else(|| "generation failed upstream".to_string());
        return PayloadAction::Fail(message);
    }

    PayloadAction::Continue
}

/// Build the user-facing message for a non-success relay response.
///
/// Understands the relay's `{error, solution}` envelope and appends the
/// solution when present; anything else falls back to the raw status and
/// body text.
fn combine_error_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let error = envelope
                .error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| format!("HTTP {}", status));
            match envelope.solution.filter(|s| !s.is_empty()) {
                Some(solution) => format!("{}\n\nSolution:\n{}", error, solution),
                None => error,
            }
        }
        Err(_) => {
            if body.is_empty() {
                format!("HTTP {}", status)
            } else {
                format!("HTTP {}: {}", status, body)
            }
        }
    }
}

/// Funnel a failure through `on_error` when installed, else return it.
fn deliver(on_error: Option<ErrorCallback>, error: anyhow::Error) -> Result<()> {
    match on_error {
        Some(callback) => {
            callback(error);
            Ok(())
        }
        None => Err(error),
    }
}
