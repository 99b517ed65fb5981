//! Telegram Bot API notifier.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{InboundCommand, MessageId, Notifier, NotifyError};

const API_BASE: &str = "https://api.telegram.org";

/// Every Bot API response is wrapped in this envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<InboxMessage>,
}

#[derive(Debug, Deserialize)]
struct InboxMessage {
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

/// Posts to one chat with a bot token.
pub struct TelegramNotifier {
    http: reqwest::Client,
    base_url: String,
    chat_id: i64,
    /// Next `getUpdates` offset; acknowledges everything before it
    update_offset: AtomicI64,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat_id: i64, timeout: Duration) -> Result<Self, NotifyError> {
        Self::with_base_url(API_BASE, token, chat_id, timeout)
    }

    /// Point at a different API host (self-hosted Bot API server).
    pub fn with_base_url(
        base: &str,
        token: &str,
        chat_id: i64,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: format!("{}/bot{}", base.trim_end_matches('/'), token),
            chat_id,
            update_offset: AtomicI64::new(0),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, NotifyError> {
        let resp = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .json(&body)
            .send()
            .await?;
        let bytes = resp.bytes().await?;
        let envelope: Envelope<T> = serde_json::from_slice(&bytes)?;
        match (envelope.ok, envelope.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(NotifyError::Api(
                envelope
                    .description
                    .unwrap_or_else(|| format!("{method} failed")),
            )),
        }
    }
}

/// Telegram rejects edits that change nothing and deletes of messages that
/// are already gone; neither is a failure for the worker.
fn is_benign(err: &NotifyError) -> bool {
    match err {
        NotifyError::Api(description) => {
            description.contains("message is not modified")
                || description.contains("message to delete not found")
        }
        _ => false,
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<MessageId, NotifyError> {
        let sent: SentMessage = self
            .call("sendMessage", json!({ "chat_id": self.chat_id, "text": text }))
            .await?;
        Ok(MessageId(sent.message_id))
    }

    async fn edit(&self, id: MessageId, text: &str) -> Result<(), NotifyError> {
        if id.is_none() {
            return Ok(());
        }
        let result: Result<serde_json::Value, _> = self
            .call(
                "editMessageText",
                json!({ "chat_id": self.chat_id, "message_id": id.0, "text": text }),
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_benign(&e) => {
                debug!(id = %id, "Edit skipped: {e}");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, id: MessageId) -> Result<(), NotifyError> {
        if id.is_none() {
            return Ok(());
        }
        let result: Result<bool, _> = self
            .call(
                "deleteMessage",
                json!({ "chat_id": self.chat_id, "message_id": id.0 }),
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_benign(&e) => {
                debug!(id = %id, "Delete skipped: {e}");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn poll_commands(&self) -> Result<Vec<InboundCommand>, NotifyError> {
        let offset = self.update_offset.load(Ordering::SeqCst);
        let updates: Vec<Update> = self
            .call("getUpdates", json!({ "offset": offset, "timeout": 0 }))
            .await?;

        let mut commands = Vec::new();
        for update in updates {
            self.update_offset
                .fetch_max(update.update_id + 1, Ordering::SeqCst);
            let Some(message) = update.message else {
                continue;
            };
            if message.chat.id != self.chat_id {
                warn!(chat = message.chat.id, "Ignoring message from foreign chat");
                continue;
            }
            if let Some(command) = message.text.as_deref().and_then(InboundCommand::parse) {
                commands.push(command);
            }
        }
        Ok(commands)
    }

    fn backend_name(&self) -> &'static str {
        "telegram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_parsing() {
        let ok: Envelope<SentMessage> =
            serde_json::from_str(r#"{"ok":true,"result":{"message_id":321,"date":0}}"#)
                .expect("parse");
        assert!(ok.ok);
        assert_eq!(ok.result.map(|m| m.message_id), Some(321));

        let err: Envelope<SentMessage> = serde_json::from_str(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#,
        )
        .expect("parse");
        assert!(!err.ok);
        assert!(err.result.is_none());
        assert_eq!(err.description.as_deref(), Some("Bad Request: chat not found"));
    }

    #[test]
    fn test_updates_parse_with_missing_message() {
        let body = r#"[
            {"update_id": 10, "message": {"message_id": 1, "chat": {"id": 5}, "text": "/status"}},
            {"update_id": 11, "edited_message": {}}
        ]"#;
        let updates: Vec<Update> = serde_json::from_str(body).expect("parse");
        assert_eq!(updates.len(), 2);
        assert!(updates[1].message.is_none());
        assert_eq!(
            updates[0].message.as_ref().and_then(|m| m.text.as_deref()),
            Some("/status")
        );
    }

    #[test]
    fn test_benign_errors() {
        assert!(is_benign(&NotifyError::Api(
            "Bad Request: message is not modified: specified new message content".into()
        )));
        assert!(is_benign(&NotifyError::Api(
            "Bad Request: message to delete not found".into()
        )));
        assert!(!is_benign(&NotifyError::Api("Unauthorized".into())));
    }

    #[test]
    fn test_base_url_includes_token() {
        let n = TelegramNotifier::with_base_url("http://localhost:8081/", "123:abc", 5, Duration::from_secs(1))
            .expect("client");
        assert_eq!(n.base_url, "http://localhost:8081/bot123:abc");
        assert_eq!(n.backend_name(), "telegram");
    }
}
