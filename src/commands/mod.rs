//! Command handlers for prdgen
//!
//! Each CLI subcommand has a handler module: `chat` runs the interactive
//! session loop, `serve` runs the relay endpoint, and `export` converts a
//! saved document.

pub mod chat;
pub mod export;
pub mod serve;
