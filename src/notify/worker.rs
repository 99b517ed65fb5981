//! Notification worker: consumes bridge units and keeps the chat in sync.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::bridge::{BridgeReceiver, Command, Payload, StatusMessage};
use super::status::{assess, AnomalyLevel};
use super::{InboundCommand, MessageId, Notifier};
use crate::config::AlertConfig;
use crate::storage::{keys, load_json, save_json, Store};

const TEMPERATURE_PREFIX: &str = "Temperature: ";
const VIBRATION_PREFIX: &str = "Vibration: ";
const TEMPERATURE_PLACEHOLDER: &str = "-- °F";
const VIBRATION_PLACEHOLDER: &str = "-- Hz";

/// Ids of the long-lived chat messages, persisted across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageIds {
    pub status: MessageId,
    pub temperature: MessageId,
    pub vibration: MessageId,
    pub alert: MessageId,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Shown in the status message and alerts
    pub device_name: String,
    pub alerts: AlertConfig,
    pub poll_inbox: bool,
}

/// Owns all chat state. Runs on its own task; the control loop only talks
/// to it through the bridge.
pub struct NotificationWorker {
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn Store>,
    settings: WorkerSettings,
    ids: MessageIds,
    /// `None` after `/clear`, so the next check always rewrites the status
    level: Option<AnomalyLevel>,
    last_temperature: String,
    last_vibration: String,
    warnings: u64,
    criticals: u64,
    handled: u64,
}

fn status_text(level: Option<AnomalyLevel>) -> &'static str {
    match level {
        Some(AnomalyLevel::Normal) => "✅ Normal operation.",
        Some(AnomalyLevel::Warning) => "⚠️ Warning: Elevated temperature or vibration.",
        Some(AnomalyLevel::Critical) => "❌ CRITICAL: Compressor overheating and vibrating too much.",
        None => "❌",
    }
}

impl NotificationWorker {
    pub fn new(notifier: Arc<dyn Notifier>, store: Arc<dyn Store>, settings: WorkerSettings) -> Self {
        Self {
            notifier,
            store,
            settings,
            ids: MessageIds::default(),
            level: Some(AnomalyLevel::Normal),
            last_temperature: String::new(),
            last_vibration: String::new(),
            warnings: 0,
            criticals: 0,
            handled: 0,
        }
    }

    pub fn ids(&self) -> MessageIds {
        self.ids
    }

    pub fn level(&self) -> Option<AnomalyLevel> {
        self.level
    }

    /// (warning, critical) checks seen so far.
    pub fn counters(&self) -> (u64, u64) {
        (self.warnings, self.criticals)
    }

    /// Restore persisted message ids, or post fresh placeholder messages
    /// when none exist.
    pub async fn bootstrap(&mut self) {
        match load_json::<MessageIds>(self.store.as_ref(), keys::MESSAGE_IDS) {
            Ok(Some(ids)) if !ids.status.is_none() => {
                info!(status = %ids.status, alert = %ids.alert, "Restored chat message ids");
                self.ids = ids;
                return;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to load chat message ids, reposting"),
        }

        info!(backend = self.notifier.backend_name(), "📋 Posting initial status messages");
        self.ids.status = self
            .post(&format!("{} Status: Program Setup", self.settings.device_name))
            .await;
        self.ids.temperature = self
            .post(&format!("{TEMPERATURE_PREFIX}{TEMPERATURE_PLACEHOLDER}"))
            .await;
        self.ids.vibration = self
            .post(&format!("{VIBRATION_PREFIX}{VIBRATION_PLACEHOLDER}"))
            .await;
        self.persist_ids();
    }

    /// Drain the bridge until every producer is gone or `cancel` fires.
    pub async fn run(mut self, mut receiver: BridgeReceiver, cancel: CancellationToken) {
        info!(backend = self.notifier.backend_name(), "Notification worker started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Notification worker cancelled");
                    break;
                }
                next = receiver.recv() => match next {
                    Some(message) => self.handle(message).await,
                    None => break,
                },
            }
        }
        info!(
            handled = self.handled,
            warnings = self.warnings,
            criticals = self.criticals,
            "Notification worker stopped"
        );
    }

    /// Apply one unit.
    pub async fn handle(&mut self, message: StatusMessage) {
        self.handled += 1;
        let (command, payloads) = message.into_parts();
        let mut payloads = payloads.into_iter();
        debug!(%command, "Handling status message");

        match command {
            Command::UpdateMessage => {
                let phase = next_text(&mut payloads);
                self.update_status_phase(&phase).await;
            }
            Command::UpdateDataMessages => {
                let temperature = next_text(&mut payloads);
                let vibration = next_text(&mut payloads);
                self.update_data(temperature, vibration).await;
            }
            Command::StatusCheck => {
                let temperature_z = next_score(&mut payloads);
                let vibration_z = next_score(&mut payloads);
                self.status_check(temperature_z, vibration_z).await;
            }
            Command::CheckInbox => {
                if self.settings.poll_inbox {
                    self.check_inbox().await;
                }
            }
        }

        if payloads.next().is_some() {
            warn!(%command, "Status message carried unexpected extra payloads");
        }
    }

    async fn update_status_phase(&self, phase: &str) {
        let text = format!(
            "{} Status: {} ({phase})",
            self.settings.device_name,
            status_text(self.level)
        );
        self.edit(self.ids.status, &text).await;
    }

    async fn update_data(&mut self, temperature: String, vibration: String) {
        if temperature != self.last_temperature {
            self.edit(self.ids.temperature, &format!("{TEMPERATURE_PREFIX}{temperature}"))
                .await;
            self.last_temperature = temperature;
        }
        if vibration != self.last_vibration {
            self.edit(self.ids.vibration, &format!("{VIBRATION_PREFIX}{vibration}"))
                .await;
            self.last_vibration = vibration;
        }
    }

    async fn status_check(&mut self, temperature_z: Option<f64>, vibration_z: Option<f64>) {
        let level = assess(temperature_z, vibration_z, &self.settings.alerts);
        match level {
            AnomalyLevel::Warning => self.warnings += 1,
            AnomalyLevel::Critical => self.criticals += 1,
            AnomalyLevel::Normal => {}
        }

        if self.level == Some(level) {
            return;
        }

        info!(
            from = ?self.level,
            to = %level,
            temperature_z = ?temperature_z,
            vibration_z = ?vibration_z,
            "Compressor status changed"
        );

        self.delete(self.ids.alert).await;
        self.ids.alert = match level {
            AnomalyLevel::Normal => MessageId::NONE,
            AnomalyLevel::Warning => {
                let text = format!(
                    "⚠️ WARNING: {} IS SHOWING SIGNS OF FAILURE ⚠️ Count: {}",
                    self.settings.device_name.to_uppercase(),
                    self.warnings
                );
                self.post(&text).await
            }
            AnomalyLevel::Critical => {
                let text = format!(
                    "❌ CRITICAL: {} IS IN CRITICAL CONDITION ❌ Count: {}",
                    self.settings.device_name.to_uppercase(),
                    self.criticals
                );
                self.post(&text).await
            }
        };
        self.persist_ids();

        self.level = Some(level);
        let text = format!("{} Status: {}", self.settings.device_name, status_text(self.level));
        self.edit(self.ids.status, &text).await;
    }

    async fn check_inbox(&mut self) {
        let commands = match self.notifier.poll_commands().await {
            Ok(commands) => commands,
            Err(e) => {
                warn!(error = %e, "Inbox poll failed");
                return;
            }
        };

        for command in commands {
            match command {
                InboundCommand::Status => self.repost(false).await,
                InboundCommand::Clear => self.repost(true).await,
                InboundCommand::Unknown(word) => debug!(command = %word, "Ignoring unknown chat command"),
            }
        }
    }

    /// Replace the three long-lived messages. With `clear`, they go back
    /// to placeholders and the remembered texts are forgotten.
    async fn repost(&mut self, clear: bool) {
        info!(clear, "Reposting status messages");
        self.delete(self.ids.status).await;
        self.delete(self.ids.temperature).await;
        self.delete(self.ids.vibration).await;

        if clear {
            self.level = None;
            self.last_temperature.clear();
            self.last_vibration.clear();
        }

        let or_placeholder = |s: &str, placeholder: &'static str| {
            if s.is_empty() {
                placeholder.to_string()
            } else {
                s.to_string()
            }
        };
        let status = format!("{} Status: {}", self.settings.device_name, status_text(self.level));
        let temperature = or_placeholder(&self.last_temperature, TEMPERATURE_PLACEHOLDER);
        let vibration = or_placeholder(&self.last_vibration, VIBRATION_PLACEHOLDER);

        self.ids.status = self.post(&status).await;
        self.ids.temperature = self.post(&format!("{TEMPERATURE_PREFIX}{temperature}")).await;
        self.ids.vibration = self.post(&format!("{VIBRATION_PREFIX}{vibration}")).await;
        self.persist_ids();
    }

    async fn post(&self, text: &str) -> MessageId {
        match self.notifier.send(text).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Failed to send chat message");
                MessageId::NONE
            }
        }
    }

    async fn edit(&self, id: MessageId, text: &str) {
        if id.is_none() {
            return;
        }
        if let Err(e) = self.notifier.edit(id, text).await {
            warn!(error = %e, id = %id, "Failed to edit chat message");
        }
    }

    async fn delete(&self, id: MessageId) {
        if id.is_none() {
            return;
        }
        if let Err(e) = self.notifier.delete(id).await {
            warn!(error = %e, id = %id, "Failed to delete chat message");
        }
    }

    fn persist_ids(&self) {
        if let Err(e) = save_json(self.store.as_ref(), keys::MESSAGE_IDS, &self.ids) {
            warn!(error = %e, "Failed to persist chat message ids");
        }
    }
}

fn next_text(payloads: &mut impl Iterator<Item = Payload>) -> String {
    match payloads.next() {
        Some(Payload::Text(text)) => text,
        other => {
            warn!(payload = ?other, "Expected text payload");
            String::new()
        }
    }
}

fn next_score(payloads: &mut impl Iterator<Item = Payload>) -> Option<f64> {
    match payloads.next() {
        Some(Payload::Score(score)) => score,
        other => {
            warn!(payload = ?other, "Expected score payload");
            None
        }
    }
}
