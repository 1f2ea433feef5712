//! Streaming relay endpoint
//!
//! The relay is the single point of egress to the upstream chat workflow
//! API. It holds the upstream credential, absorbs uncertainty about which
//! upstream URL and payload shape is currently valid, and re-frames the
//! upstream SSE stream for callers.
//!
//! - [`upstream`] builds the ordered candidate list, tries candidates in
//!   priority order (first HTTP success wins), and classifies failures into
//!   a structured error kind instead of matching human-readable phrases.
//! - [`server`] is the axum HTTP surface: `POST /api/generate` streams, all
//!   responses carry permissive CORS headers, failures become a JSON
//!   `{error, solution, timestamp}` envelope.
//!
//! The relay is stateless across requests; each invocation is independent.

pub mod server;
pub mod upstream;

pub use server::{router, serve, RelayState};
pub use upstream::{CandidateFailure, UpstreamCandidate, UpstreamErrorKind};
