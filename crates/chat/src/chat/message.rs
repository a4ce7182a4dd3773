use chrono::{DateTime, Utc};
use medchat_llm::ExchangeId;

/// Stable identifier for one message, increasing in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Creates a typed message identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Lifecycle status for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageStatus {
    /// Placeholder still receiving text for the given exchange.
    Streaming(ExchangeId),
    Done,
    /// Text was replaced with the apology; the payload is the underlying diagnostic.
    Failed(String),
}

impl MessageStatus {
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming(_))
    }
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub status: MessageStatus,
}

impl Message {
    /// Creates a message with explicit status, stamped with the current time.
    pub fn new(id: MessageId, role: Role, text: impl Into<String>, status: MessageStatus) -> Self {
        Self {
            id,
            role,
            text: text.into(),
            created_at: Utc::now(),
            status,
        }
    }

    /// Creates an immutable user message.
    pub fn user(id: MessageId, text: impl Into<String>) -> Self {
        Self::new(id, Role::User, text, MessageStatus::Done)
    }

    /// Creates a system diagnostic message.
    pub fn system(id: MessageId, text: impl Into<String>) -> Self {
        Self::new(id, Role::System, text, MessageStatus::Done)
    }

    /// Creates an empty assistant placeholder while streaming.
    pub fn assistant_placeholder(id: MessageId, exchange: ExchangeId) -> Self {
        Self::new(
            id,
            Role::Assistant,
            String::new(),
            MessageStatus::Streaming(exchange),
        )
    }

    pub fn is_streaming(&self) -> bool {
        self.status.is_streaming()
    }
}
