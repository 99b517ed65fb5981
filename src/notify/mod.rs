//! Notification path
//!
//! The control loop never talks to the network. It hands `StatusMessage`
//! units to a bounded bridge; the `NotificationWorker` on the other side
//! owns the chat state (message ids, last status, alert counters) and
//! drives a `Notifier` backend.

mod bridge;
mod log_notifier;
mod status;
mod telegram;
mod worker;

pub use bridge::{
    notification_bridge, BridgeHandle, BridgeReceiver, Command, Payload, QueueError,
    StatusMessage, StatusMessageBuilder,
};
pub use log_notifier::{LogNotifier, NotifierEvent};
pub use status::{assess, AnomalyLevel};
pub use telegram::TelegramNotifier;
pub use worker::{MessageIds, NotificationWorker, WorkerSettings};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Chat message handle. `MessageId::NONE` means "no message"; edits and
/// deletes on it do nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl MessageId {
    pub const NONE: Self = Self(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operator command received through the chat inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundCommand {
    /// Re-post the three status messages
    Status,
    /// Reset the status messages to placeholders
    Clear,
    Unknown(String),
}

impl InboundCommand {
    /// Parse a chat message; `None` for plain text that is not a command.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        if !word.starts_with('/') {
            return None;
        }
        // "/status@SomeBot" addresses a specific bot in group chats
        let name = word.split('@').next().unwrap_or(word);
        Some(match name.to_ascii_lowercase().as_str() {
            "/status" => Self::Status,
            "/clear" => Self::Clear,
            _ => Self::Unknown(word.to_string()),
        })
    }
}

/// Notifier errors
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Chat API rejected request: {0}")]
    Api(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Chat backend.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Post a new message and return its id.
    async fn send(&self, text: &str) -> Result<MessageId, NotifyError>;

    async fn edit(&self, id: MessageId, text: &str) -> Result<(), NotifyError>;

    async fn delete(&self, id: MessageId) -> Result<(), NotifyError>;

    /// Commands received since the last poll.
    async fn poll_commands(&self) -> Result<Vec<InboundCommand>, NotifyError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}
