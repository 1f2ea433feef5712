//! Client-side relay consumer
//!
//! This module is the only thing a front end needs to talk to for
//! generation. [`RelayClient`] posts a query to a relay endpoint, reads the
//! SSE response incrementally, and normalizes completion and error
//! signaling into the three callbacks of [`StreamCallbacks`].
//!
//! One parameterized implementation replaces the three near-identical
//! service copies of the original system: which relay to call and which
//! headers it needs are injected at construction time instead of being
//! re-derived from the runtime environment on every call.

pub mod callbacks;
pub mod relay;

pub use callbacks::{ChunkCallback, CompleteCallback, ErrorCallback, StreamCallbacks};
pub use relay::RelayClient;
