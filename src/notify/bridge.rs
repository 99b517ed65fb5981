//! Control loop → notification worker queue.
//!
//! A command tag and its payloads travel together as one `StatusMessage`,
//! so units from different producers can never interleave and the worker
//! always sees payloads in the order they were added.

use tokio::sync::mpsc;

/// What the worker should do with a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Phase text for the status message ("collecting", "resting")
    UpdateMessage,
    /// Temperature text then vibration text
    UpdateDataMessages,
    /// Temperature z-score then vibration score
    StatusCheck,
    /// Poll the chat inbox for operator commands
    CheckInbox,
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpdateMessage => write!(f, "UPDATE_MESSAGE"),
            Self::UpdateDataMessages => write!(f, "UPDATE_DATA_MESSAGES"),
            Self::StatusCheck => write!(f, "STATUS_CHECK"),
            Self::CheckInbox => write!(f, "CHECK_INBOX"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    /// Anomaly score; `None` while its reference population is incomplete
    Score(Option<f64>),
}

impl Payload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Score(_) => None,
        }
    }

    pub fn as_score(&self) -> Option<Option<f64>> {
        match self {
            Self::Score(z) => Some(*z),
            Self::Text(_) => None,
        }
    }
}

/// One atomic unit across the concurrency boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    command: Command,
    payloads: Vec<Payload>,
}

impl StatusMessage {
    pub fn builder() -> StatusMessageBuilder {
        StatusMessageBuilder::default()
    }

    pub fn update_message(phase: impl Into<String>) -> Self {
        Self::builder().text(phase).build(Command::UpdateMessage)
    }

    pub fn update_data(temperature: impl Into<String>, vibration: impl Into<String>) -> Self {
        Self::builder()
            .text(temperature)
            .text(vibration)
            .build(Command::UpdateDataMessages)
    }

    pub fn status_check(temperature_z: Option<f64>, vibration_z: Option<f64>) -> Self {
        Self::builder()
            .score(temperature_z)
            .score(vibration_z)
            .build(Command::StatusCheck)
    }

    pub fn check_inbox() -> Self {
        Self::builder().build(Command::CheckInbox)
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn payloads(&self) -> &[Payload] {
        &self.payloads
    }

    pub fn into_parts(self) -> (Command, Vec<Payload>) {
        (self.command, self.payloads)
    }
}

#[derive(Debug, Default)]
pub struct StatusMessageBuilder {
    payloads: Vec<Payload>,
}

impl StatusMessageBuilder {
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.payloads.push(Payload::Text(text.into()));
        self
    }

    #[must_use]
    pub fn score(mut self, score: Option<f64>) -> Self {
        self.payloads.push(Payload::Score(score));
        self
    }

    /// Seal the payloads under `command`.
    pub fn build(self, command: Command) -> StatusMessage {
        StatusMessage {
            command,
            payloads: self.payloads,
        }
    }
}

/// Queue errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("notification worker has shut down")]
    Closed,
    #[error("notification queue is full")]
    Full,
}

/// Producer side; cheap to clone.
#[derive(Clone)]
pub struct BridgeHandle {
    tx: mpsc::Sender<StatusMessage>,
}

impl BridgeHandle {
    /// Enqueue a unit, waiting while the queue is full.
    pub async fn send(&self, message: StatusMessage) -> Result<(), QueueError> {
        self.tx.send(message).await.map_err(|_| QueueError::Closed)
    }

    /// Enqueue without waiting.
    pub fn try_send(&self, message: StatusMessage) -> Result<(), QueueError> {
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}

/// Consumer side, owned by the worker.
pub struct BridgeReceiver {
    rx: mpsc::Receiver<StatusMessage>,
}

impl BridgeReceiver {
    /// Next unit in FIFO order; `None` once every handle is dropped and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<StatusMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StatusMessage> {
        self.rx.try_recv().ok()
    }
}

/// Create a bounded bridge holding at most `capacity` units.
pub fn notification_bridge(capacity: usize) -> (BridgeHandle, BridgeReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (BridgeHandle { tx }, BridgeReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_payload_order_preserved_within_unit() {
        let (tx, mut rx) = notification_bridge(4);
        tx.send(StatusMessage::update_data("72.4°F", "85.98Hz"))
            .await
            .expect("send");

        let (command, payloads) = rx.recv().await.expect("unit").into_parts();
        assert_eq!(command, Command::UpdateDataMessages);
        assert_eq!(payloads[0].as_text(), Some("72.4°F"));
        assert_eq!(payloads[1].as_text(), Some("85.98Hz"));
    }

    #[tokio::test]
    async fn test_fifo_across_units() {
        let (tx, mut rx) = notification_bridge(8);
        tx.send(StatusMessage::update_message("collecting")).await.expect("send");
        tx.send(StatusMessage::status_check(Some(0.4), None)).await.expect("send");
        tx.send(StatusMessage::check_inbox()).await.expect("send");
        drop(tx);

        let mut commands = Vec::new();
        while let Some(m) = rx.recv().await {
            commands.push(m.command());
        }
        assert_eq!(
            commands,
            vec![Command::UpdateMessage, Command::StatusCheck, Command::CheckInbox]
        );
    }

    #[test]
    fn test_try_send_reports_full_and_closed() {
        let (tx, rx) = notification_bridge(1);
        assert_eq!(tx.try_send(StatusMessage::check_inbox()), Ok(()));
        assert_eq!(tx.try_send(StatusMessage::check_inbox()), Err(QueueError::Full));
        drop(rx);
        assert_eq!(tx.try_send(StatusMessage::check_inbox()), Err(QueueError::Closed));
    }

    #[test]
    fn test_send_waits_for_free_slot() {
        let (tx, mut rx) = notification_bridge(1);
        assert_eq!(tx.try_send(StatusMessage::check_inbox()), Ok(()));

        let producer = tx.clone();
        let mut pending = tokio_test::task::spawn(async move {
            producer.send(StatusMessage::update_message("resting")).await
        });
        tokio_test::assert_pending!(pending.poll());

        assert_eq!(rx.try_recv().map(|m| m.command()), Some(Command::CheckInbox));
        assert!(pending.is_woken());
        tokio_test::assert_ready_ok!(pending.poll());
        assert_eq!(rx.try_recv().map(|m| m.command()), Some(Command::UpdateMessage));
    }

    #[test]
    fn test_score_payloads() {
        let m = StatusMessage::status_check(Some(2.5), None);
        assert_eq!(m.payloads()[0].as_score(), Some(Some(2.5)));
        assert_eq!(m.payloads()[1].as_score(), Some(None));
        assert_eq!(m.payloads()[0].as_text(), None);
    }
}
