//! Upstream candidate multiplexing and failure classification
//!
//! The upstream platform exposes several call shapes for the same
//! workflow, and which one is live depends on how the application was
//! published. Rather than hardcoding one, the relay tries an ordered
//! candidate list and commits to the first candidate that answers with
//! HTTP success. Order is priority: the workflow-by-id route, the generic
//! workflow route, then the chat-completion route.
//!
//! Failures are recorded per candidate and classified into
//! [`UpstreamErrorKind`], a structured enumeration that decides the HTTP
//! status and remediation hint of the error envelope. Classification is
//! status-code first; recognized phrases in the failure text are only a
//! fallback for upstreams that bury the real status in a 200-wrapped body.

use reqwest::StatusCode;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::config::UpstreamConfig;

/// Streaming response mode requested from the upstream.
const RESPONSE_MODE: &str = "streaming";

/// Empty `inputs` object for the chat-completion shape.
#[derive(Debug, Serialize)]
struct EmptyInputs {}

/// `inputs` object carrying the query for the workflow shapes.
#[derive(Debug, Serialize)]
struct QueryInputs<'a> {
    query: &'a str,
}

/// Body for `POST {base}/workflows/{id}/run` and `POST {base}/workflows/run`.
#[derive(Debug, Serialize)]
struct WorkflowRunBody<'a> {
    inputs: QueryInputs<'a>,
    response_mode: &'static str,
    user: &'a str,
}

/// Body for `POST {base}/chat-messages`.
///
/// `conversation_id` is omitted entirely when absent; the upstream rejects
/// explicit nulls.
#[derive(Debug, Serialize)]
struct ChatMessagesBody<'a> {
    inputs: EmptyInputs,
    query: &'a str,
    response_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<&'a str>,
    user: &'a str,
    auto_generate_name: bool,
}

/// One upstream call shape: a URL plus its serialized request body.
#[derive(Debug, Clone)]
pub struct UpstreamCandidate {
    /// Full upstream URL
    pub url: String,
    /// JSON request body
    pub body: serde_json::Value,
}

/// Record of one failed candidate attempt.
#[derive(Debug, Clone)]
pub struct CandidateFailure {
    /// Candidate URL that failed
    pub url: String,
    /// HTTP status when the upstream answered at all
    pub status: Option<StatusCode>,
    /// Status text plus body, or the transport error message
    pub detail: String,
}

impl fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.url, self.detail)
    }
}

/// Structured classification of an upstream failure.
///
/// Replaces the original substring matching against human-readable
/// upstream text as the primary mechanism; the phrase fallback remains
/// because some upstream deployments report configuration problems in a
/// body with a misleading status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// The workflow exists but has not been published
    WorkflowUnpublished,
    /// The configured credential was rejected
    Unauthorized,
    /// Anything else, including all-candidates-failed
    Other,
}

impl UpstreamErrorKind {
    /// Classify a set of recorded candidate failures.
    ///
    /// A definitive 401 from any candidate wins; otherwise the combined
    /// failure text is scanned for recognized phrases.
    pub fn classify_failures(failures: &[CandidateFailure]) -> Self {
        if failures
            .iter()
            .any(|f| f.status == Some(StatusCode::UNAUTHORIZED))
        {
            return Self::Unauthorized;
        }

        let combined = failures
            .iter()
            .map(|f| f.detail.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Self::classify_text(&combined)
    }

    /// Phrase-based fallback classification.
    pub fn classify_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("workflow not published") {
            Self::WorkflowUnpublished
        } else if lower.contains("unauthorized") || lower.contains("401") {
            Self::Unauthorized
        } else {
            Self::Other
        }
    }

    /// HTTP status the relay answers with for this kind.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::WorkflowUnpublished => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Other => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Remediation hint carried in the error envelope.
    pub fn solution(&self) -> &'static str {
        match self {
            Self::WorkflowUnpublished => {
                "Publish the workflow:\n\
                 1. Log in to the upstream platform\n\
                 2. Open your application\n\
                 3. Make sure the workflow is saved\n\
                 4. Press the Publish button in the top-right corner\n\
                 5. Retry after publishing"
            }
            Self::Unauthorized => "Check that the configured upstream API key is correct",
            Self::Other => "Check network connectivity and the upstream API configuration",
        }
    }
}

/// Build the ordered candidate list for one request.
///
/// The workflow-by-id candidate is skipped when no workflow id is
/// configured; the remaining order is unchanged.
pub fn candidates(
    config: &UpstreamConfig,
    query: &str,
    conversation_id: Option<&str>,
    user: &str,
) -> Vec<UpstreamCandidate> {
    let base = &config.base_url;
    let workflow_body = WorkflowRunBody {
        inputs: QueryInputs { query },
        response_mode: RESPONSE_MODE,
        user,
    };
    let chat_body = ChatMessagesBody {
        inputs: EmptyInputs {},
        query,
        response_mode: RESPONSE_MODE,
        conversation_id: conversation_id.filter(|id| !id.is_empty()),
        user,
        auto_generate_name: true,
    };

    // Serialization of these literal shapes cannot fail.
    let workflow_value = serde_json::to_value(&workflow_body).unwrap_or_default();
    let chat_value = serde_json::to_value(&chat_body).unwrap_or_default();

    let mut list = Vec::with_capacity(3);
    if !config.workflow_id.is_empty() {
        list.push(UpstreamCandidate {
            url: format!("{}/workflows/{}/run", base, config.workflow_id),
            body: workflow_value.clone(),
        });
    }
    list.push(UpstreamCandidate {
        url: format!("{}/workflows/run", base),
        body: workflow_value,
    });
    list.push(UpstreamCandidate {
        url: format!("{}/chat-messages", base),
        body: chat_value,
    });
    list
}

/// Generate the per-request upstream `user` field.
pub fn request_user(config: &UpstreamConfig) -> String {
    format!("{}-{}", config.user_prefix, Uuid::new_v4())
}

/// Try candidates in order; first HTTP success wins.
///
/// On success the winning response is returned with its body unread, ready
/// for streaming. On total failure every candidate's failure record is
/// returned for classification and reporting. No candidate after a success
/// is ever attempted.
pub async fn send_to_upstream(
    http: &reqwest::Client,
    config: &UpstreamConfig,
    query: &str,
    conversation_id: Option<&str>,
) -> std::result::Result<reqwest::Response, Vec<CandidateFailure>> {
    let user = request_user(config);
    let mut failures = Vec::new();

    for candidate in candidates(config, query, conversation_id, &user) {
        tracing::debug!("Trying upstream candidate: {}", candidate.url);

        let attempt = http
            .post(&candidate.url)
            .bearer_auth(&config.api_key)
            .json(&candidate.body)
            .send()
            .await;

        match attempt {
            Ok(response) if response.status().is_success() => {
                tracing::info!("Upstream candidate selected: {}", candidate.url);
                return Ok(response);
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let failure = CandidateFailure {
                    url: candidate.url,
                    status: Some(status),
                    detail: format!("{} {}", status, body),
                };
                tracing::warn!("Upstream candidate failed: {}", failure);
                failures.push(failure);
            }
            Err(e) => {
                let failure = CandidateFailure {
                    url: candidate.url,
                    status: None,
                    detail: e.to_string(),
                };
                tracing::warn!("Upstream candidate unreachable: {}", failure);
                failures.push(failure);
            }
        }
    }

    Err(failures)
}

/// Combine recorded failures into one diagnostic string.
pub fn combine_failures(failures: &[CandidateFailure]) -> String {
    let joined = failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    format!("All upstream endpoints failed: {}", joined)
}
