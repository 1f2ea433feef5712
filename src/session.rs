//! In-memory chat session bookkeeping
//!
//! Sessions exist only for the lifetime of the process; there is no
//! persistence layer. A [`SessionStore`] holds the ordered list of sessions
//! the chat loop has created, one of which is active at a time.
//!
//! Messages are immutable once appended. Assistant text streams into a
//! transient buffer owned by the chat loop and becomes a [`ChatMessage`]
//! only when the generation completes.

use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Message typed by the user
    User,
    /// Message produced by the upstream workflow
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// Cosmetic lifecycle tag for a session.
///
/// Nothing enforces transitions between these states; they exist for
/// display and export bookkeeping only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    /// Session has no completed generation yet
    #[default]
    Draft,
    /// At least one generation completed
    Completed,
    /// Session content has been exported to a file
    Exported,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Completed => write!(f, "completed"),
            Self::Exported => write!(f, "exported"),
        }
    }
}

/// One immutable chat message.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// Unique message identifier
    pub id: String,
    /// Author role
    pub role: Role,
    /// Message text
    pub content: String,
    /// Creation time
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a message with a fresh identifier and the current time.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a message carrying an upstream-issued identifier.
    ///
    /// Used for assistant messages whose id the upstream reported during
    /// streaming; falls back to a fresh identifier when the upstream never
    /// sent one.
    pub fn with_upstream_id(role: Role, content: impl Into<String>, id: &str) -> Self {
        let id = if id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            id.to_string()
        };
        Self {
            id,
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One chat session: ordered transcript plus upstream conversation state.
#[derive(Debug, Clone)]
pub struct ChatSession {
    /// Unique session identifier
    pub id: String,
    /// Display title, derived from the first user input
    pub title: String,
    /// Transcript in conversational order
    pub messages: Vec<ChatMessage>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time of the most recent append or state change
    pub updated_at: DateTime<Utc>,
    /// Opaque upstream conversation identifier, set after the first turn
    pub conversation_id: Option<String>,
    /// Cosmetic status tag
    pub status: SessionStatus,
}

impl ChatSession {
    /// Create an empty session with a placeholder title.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: "New PRD".to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            conversation_id: None,
            status: SessionStatus::Draft,
        }
    }

    /// Append a message to the transcript.
    ///
    /// The first user message also fixes the session title.
    pub fn push_message(&mut self, message: ChatMessage, title_max_chars: usize) {
        if self.messages.is_empty() && message.role == Role::User {
            self.title = derive_title(&message.content, title_max_chars);
        }
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// Record the upstream conversation identifier for this session.
    ///
    /// Once a non-empty identifier is held it is never dropped: an empty
    /// update is ignored, and later non-empty identifiers overwrite
    /// (last-write-wins, matching the stream contract).
    pub fn set_conversation_id(&mut self, conversation_id: &str) {
        if conversation_id.is_empty() {
            return;
        }
        self.conversation_id = Some(conversation_id.to_string());
        self.updated_at = Utc::now();
    }

    /// Update the cosmetic status tag.
    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Most recent assistant message, if any.
    pub fn last_assistant_message(&self) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive a session title from the first user input.
///
/// Titles longer than `max_chars` characters are truncated with a `...`
/// suffix. Truncation counts characters, not bytes, so CJK input is safe.
pub fn derive_title(input: &str, max_chars: usize) -> String {
    let trimmed = input.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        let mut title: String = trimmed.chars().take(max_chars).collect();
        title.push_str("...");
        title
    }
}

/// Ordered in-memory collection of sessions with one active selection.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Vec<ChatSession>,
    active: Option<usize>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new session, make it active, and return its id.
    pub fn create_session(&mut self) -> String {
        let session = ChatSession::new();
        let id = session.id.clone();
        self.sessions.push(session);
        self.active = Some(self.sessions.len() - 1);
        id
    }

    /// The active session, if any.
    pub fn active_session(&self) -> Option<&ChatSession> {
        self.active.and_then(|i| self.sessions.get(i))
    }

    /// Mutable access to the active session.
    pub fn active_session_mut(&mut self) -> Option<&mut ChatSession> {
        self.active.and_then(|i| self.sessions.get_mut(i))
    }

    /// Switch the active session by id.
    ///
    /// Returns false when no session has the given id.
    pub fn switch_to(&mut self, id: &str) -> bool {
        match self.sessions.iter().position(|s| s.id == id) {
            Some(index) => {
                self.active = Some(index);
                true
            }
            None => false,
        }
    }

    /// All sessions in creation order.
    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    /// Number of sessions in the store.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
