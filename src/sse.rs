//! Incremental SSE parsing shared by the relay endpoint and the client
//!
//! Server-sent events arrive as a byte stream whose chunk boundaries are
//! arbitrary: a single `data:` line may be split across any number of
//! network reads, including in the middle of a multi-byte UTF-8 sequence.
//! [`SseLineParser`] buffers raw bytes between newlines so that feeding it
//! the same body in any chunking yields the same sequence of payloads.
//!
//! Both halves of the relay use this one parser:
//!
//! - the relay endpoint runs upstream bytes through it and re-frames each
//!   payload as an outgoing `data: <payload>\n\n` event;
//! - the client runs relay bytes through it and decodes each payload into a
//!   [`StreamEvent`].
//!
//! Lines that do not carry the `data:` field (blank event separators,
//! comments, `event:`/`id:` fields) are ignored. A payload equal to
//! [`DONE_SENTINEL`] marks the end of a stream.

use bytes::BytesMut;
use serde::Deserialize;

/// Field prefix of an SSE data line.
pub const DATA_PREFIX: &str = "data:";

/// Terminal sentinel payload appended by the relay endpoint.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Incremental line-oriented SSE parser.
///
/// Bytes are pushed in as they arrive; complete `data:` payloads come out.
/// The internal buffer holds at most one partial line between pushes.
///
/// # Examples
///
/// ```
/// use prdgen::sse::SseLineParser;
///
/// let mut parser = SseLineParser::new();
/// let mut payloads = parser.push(b"data: {\"event\":\"mess");
/// assert!(payloads.is_empty());
/// payloads.extend(parser.push(b"age\"}\n\n"));
/// assert_eq!(payloads, vec![r#"{"event":"message"}"#.to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct SseLineParser {
    buffer: BytesMut,
}

impl SseLineParser {
    /// Create an empty parser.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Feed one chunk of bytes, returning every `data:` payload whose line
    /// was completed by this chunk.
    ///
    /// Payloads are returned in stream order. Lines that are not valid
    /// UTF-8 are logged and skipped; this can only happen when the stream
    /// itself is corrupt, never from an unlucky chunk boundary, because
    /// splitting happens on raw bytes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            if let Some(payload) = Self::parse_line(&line[..pos]) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flush the trailing partial line at end of stream.
    ///
    /// SSE bodies normally end with a newline, but an upstream that closes
    /// mid-line still gets its final `data:` field honored.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = self.buffer.split();
        Self::parse_line(&line)
    }

    /// Extract the payload from one raw line, without its terminator.
    fn parse_line(raw: &[u8]) -> Option<String> {
        // Tolerate CRLF framing.
        let raw = match raw.last() {
            Some(b'\r') => &raw[..raw.len() - 1],
            _ => raw,
        };

        let line = match std::str::from_utf8(raw) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Skipping non-UTF-8 SSE line: {}", e);
                return None;
            }
        };

        line.strip_prefix(DATA_PREFIX)
            .map(|value| value.trim().to_string())
    }
}

/// One parsed wire event from the upstream chat workflow.
///
/// Unknown fields are ignored and every field except `event` is optional;
/// the upstream emits different shapes for different event kinds.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamEvent {
    /// Event discriminator (`message`, `agent_message`, `text_chunk`,
    /// `message_end`, `error`, ...).
    #[serde(default)]
    pub event: String,

    /// Text fragment carried by content events.
    #[serde(default)]
    pub answer: Option<String>,

    /// Upstream message identifier.
    #[serde(default)]
    pub message_id: Option<String>,

    /// Upstream conversation identifier, echoed back on later turns.
    #[serde(default)]
    pub conversation_id: Option<String>,

    /// Human-readable error text on `error` events.
    #[serde(default)]
    pub message: Option<String>,
}

/// Classified kind of a [`StreamEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Chat answer fragment
    Message,
    /// Agent-mode answer fragment
    AgentMessage,
    /// Workflow text chunk fragment
    TextChunk,
    /// End-of-message marker
    MessageEnd,
    /// Upstream-reported error
    Error,
    /// Anything else (ping, workflow bookkeeping, future kinds)
    Other,
}

impl EventKind {
    /// Whether this kind carries answer text for the transcript.
    pub fn is_content(&self) -> bool {
        matches!(
            self,
            EventKind::Message | EventKind::AgentMessage | EventKind::TextChunk
        )
    }
}

impl StreamEvent {
    /// Parse a `data:` payload into an event.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error when the payload is not a
    /// JSON object of the expected shape. Callers treat that as a malformed
    /// line: logged and skipped, never fatal.
    pub fn parse(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }

    /// Classify the `event` discriminator.
    pub fn kind(&self) -> EventKind {
        match self.event.as_str() {
            "message" => EventKind::Message,
            "agent_message" => EventKind::AgentMessage,
            "text_chunk" => EventKind::TextChunk,
            "message_end" => EventKind::MessageEnd,
            "error" => EventKind::Error,
            _ => EventKind::Other,
        }
    }
}
