//! Callback set for one streaming generation call
//!
//! All three callbacks are optional. A missing `on_chunk` silently drops
//! fragments; a missing `on_complete` drops the completion notification; a
//! missing `on_error` changes error delivery into an `Err` return from
//! `send_message` (the caller opted out of callback-style errors).

/// Invoked once per received text fragment, in stream order.
pub type ChunkCallback = Box<dyn FnMut(&str) + Send>;

/// Invoked at most once with the terminal error of a call.
pub type ErrorCallback = Box<dyn FnOnce(anyhow::Error) + Send>;

/// Invoked at most once with the final message and conversation
/// identifiers (possibly empty strings).
pub type CompleteCallback = Box<dyn FnOnce(&str, &str) + Send>;

/// Optional callbacks threaded through one `send_message` call.
///
/// # Examples
///
/// ```
/// use prdgen::client::StreamCallbacks;
///
/// let callbacks = StreamCallbacks::new()
///     .on_chunk(|fragment| print!("{}", fragment))
///     .on_complete(|message_id, conversation_id| {
///         println!("done: {} {}", message_id, conversation_id);
///     });
/// # let _ = callbacks;
/// ```
#[derive(Default)]
pub struct StreamCallbacks {
    pub(crate) on_chunk: Option<ChunkCallback>,
    pub(crate) on_error: Option<ErrorCallback>,
    pub(crate) on_complete: Option<CompleteCallback>,
}

impl StreamCallbacks {
    /// Create an empty callback set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the fragment callback.
    pub fn on_chunk(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_chunk = Some(Box::new(f));
        self
    }

    /// Install the error callback.
    pub fn on_error(mut self, f: impl FnOnce(anyhow::Error) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Install the completion callback.
    pub fn on_complete(mut self, f: impl FnOnce(&str, &str) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }
}

impl std::fmt::Debug for StreamCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCallbacks")
            .field("on_chunk", &self.on_chunk.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}
