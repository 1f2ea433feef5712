//! prdgen - PRD generation chat CLI and streaming relay library
//!
//! This library implements both halves of a streaming chat relay for a
//! hosted PRD-generation workflow: the server-side relay endpoint that
//! holds the upstream credential and re-frames the upstream SSE stream,
//! and the client-side consumer that turns that stream into callbacks.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `relay`: the relay endpoint (axum HTTP surface + upstream candidate
//!   multiplexing)
//! - `client`: the relay consumer (`RelayClient`, callback contracts)
//! - `sse`: the single incremental SSE parser shared by both sides
//! - `session`: in-memory chat sessions and messages
//! - `export`: markdown/HTML document export
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli`: command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use prdgen::client::{RelayClient, StreamCallbacks};
//! use std::collections::HashMap;
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = RelayClient::new(
//!         Url::parse("http://127.0.0.1:8787/api/generate")?,
//!         HashMap::new(),
//!     )?;
//!
//!     let callbacks = StreamCallbacks::new().on_chunk(|fragment| print!("{}", fragment));
//!     client.send_message("Design a login system", None, callbacks).await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod export;
pub mod relay;
pub mod session;
pub mod sse;

// Re-export commonly used types
pub use client::{RelayClient, StreamCallbacks};
pub use config::Config;
pub use error::{PrdgenError, Result};
pub use session::{ChatMessage, ChatSession, Role, SessionStatus, SessionStore};
pub use sse::{SseLineParser, StreamEvent};
