//! Notifier that writes chat traffic to the log.
//!
//! Used when no chat credentials are configured, and by tests, which read
//! back the event journal and inject inbox commands.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::info;

use super::{InboundCommand, MessageId, Notifier, NotifyError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierEvent {
    Sent { id: MessageId, text: String },
    Edited { id: MessageId, text: String },
    Deleted { id: MessageId },
}

/// Cheap to clone; clones share the journal and id counter.
#[derive(Clone, Default)]
pub struct LogNotifier {
    next_id: Arc<AtomicI64>,
    events: Arc<Mutex<Vec<NotifierEvent>>>,
    inbox: Arc<Mutex<VecDeque<InboundCommand>>>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command for the next `poll_commands`.
    pub fn push_command(&self, command: InboundCommand) {
        if let Ok(mut inbox) = self.inbox.lock() {
            inbox.push_back(command);
        }
    }

    /// Snapshot of everything sent, edited or deleted so far.
    pub fn events(&self) -> Vec<NotifierEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Latest text of a message, `None` if it was never sent or was deleted.
    pub fn current_text(&self, id: MessageId) -> Option<String> {
        let mut text = None;
        for event in self.events() {
            match event {
                NotifierEvent::Sent { id: i, text: t } | NotifierEvent::Edited { id: i, text: t }
                    if i == id =>
                {
                    text = Some(t);
                }
                NotifierEvent::Deleted { id: i } if i == id => text = None,
                _ => {}
            }
        }
        text
    }

    fn record(&self, event: NotifierEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<MessageId, NotifyError> {
        let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        info!(id = %id, "📨 {text}");
        self.record(NotifierEvent::Sent {
            id,
            text: text.to_string(),
        });
        Ok(id)
    }

    async fn edit(&self, id: MessageId, text: &str) -> Result<(), NotifyError> {
        info!(id = %id, "✏️  {text}");
        self.record(NotifierEvent::Edited {
            id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn delete(&self, id: MessageId) -> Result<(), NotifyError> {
        info!(id = %id, "🗑️  message deleted");
        self.record(NotifierEvent::Deleted { id });
        Ok(())
    }

    async fn poll_commands(&self) -> Result<Vec<InboundCommand>, NotifyError> {
        let mut inbox = self
            .inbox
            .lock()
            .map_err(|e| NotifyError::Api(e.to_string()))?;
        Ok(inbox.drain(..).collect())
    }

    fn backend_name(&self) -> &'static str {
        "log"
    }
}
