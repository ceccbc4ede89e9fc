//! In-memory conversation model.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Role name on the chat completions wire format.
    pub fn as_wire(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self::at(role, content, Utc::now())
    }

    /// Line endings in `content` are normalized to `\n`.
    pub fn at(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        let content: String = content.into();
        let content = if content.contains('\r') {
            content.replace("\r\n", "\n")
        } else {
            content
        };
        Self {
            role,
            content,
            timestamp,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A titled, timestamped, append-only sequence of messages.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    id: String,
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    messages: Vec<Message>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    /// Start a new, empty conversation with a fresh id.
    pub fn new() -> Self {
        let id = Uuid::new_v4().to_string();
        let title = format!("Conversation-{}", short_id(&id));
        let now = Utc::now();
        Self {
            id,
            title,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    /// Rebuild a conversation from persisted parts.
    pub fn restore(
        id: String,
        title: String,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            id,
            title,
            created_at,
            updated_at,
            messages,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    #[cfg(test)]
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Append a message. A timestamp earlier than the last update is raised to
    /// it so timestamps never go backwards.
    pub fn push(&mut self, mut message: Message) {
        if message.timestamp < self.updated_at {
            message.timestamp = self.updated_at;
        }
        self.updated_at = message.timestamp;
        self.messages.push(message);
    }
}

/// First eight characters of an id, for titles and file names.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}
