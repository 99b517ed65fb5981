//! Everything a controller step touches outside its own state.

use std::sync::Arc;

use super::Clock;
use crate::acquisition::Sampler;
use crate::notify::StatusMessage;
use crate::storage::Store;

/// Passed to every `CycleController::step`.
///
/// Steps never block on the network; notifications are queued in `outbox`
/// and the driver forwards them to the bridge after the step returns.
pub struct ControlContext {
    pub sampler: Sampler,
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub outbox: Vec<StatusMessage>,
    /// Set once a finite source has run dry; the driver stops on it.
    pub exhausted: bool,
}

impl ControlContext {
    pub fn new(sampler: Sampler, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sampler,
            store,
            clock,
            outbox: Vec::new(),
            exhausted: false,
        }
    }

    pub fn enqueue(&mut self, message: StatusMessage) {
        self.outbox.push(message);
    }

    /// Take all queued messages in enqueue order.
    pub fn drain_outbox(&mut self) -> Vec<StatusMessage> {
        std::mem::take(&mut self.outbox)
    }
}
